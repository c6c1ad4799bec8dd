use super::*;
use std::sync::Arc;

use axum::{
    extract::{Multipart, RawQuery, State},
    http::{header::CONTENT_TYPE, StatusCode as AxumStatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::{net::TcpListener, sync::Mutex};

fn png_image() -> ImageFile {
    ImageFile {
        filename: "rooftops.png".to_string(),
        mime_type: "image/png".to_string(),
        bytes: vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedUpload {
    texts: Vec<(String, String)>,
    filename: Option<String>,
    content_type: Option<String>,
    file_len: usize,
}

#[derive(Clone, Default)]
struct MediaServerState {
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    /// Raw JSON the upload route answers with; `None` means the default
    /// success payload.
    upload_response: Arc<Mutex<Option<String>>>,
    upload_status: Arc<Mutex<u16>>,
    caption_requests: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    caption_response: Arc<Mutex<String>>,
    caption_status: Arc<Mutex<u16>>,
    image_content_type: Arc<Mutex<String>>,
}

const DEFAULT_UPLOAD_RESPONSE: &str = r#"{
    "secure_url": "https://cdn.test/vistagram/rooftops.jpg",
    "public_id": "vistagram/rooftops",
    "width": 1280,
    "height": 720,
    "format": "jpg",
    "bytes": 52341
}"#;

const DEFAULT_CAPTION_RESPONSE: &str = r#"{
    "candidates": [
        {"content": {"parts": [{"text": "  Golden hour over the old town ✨ #vistagram #sunset  "}]}}
    ]
}"#;

async fn handle_upload(
    State(state): State<MediaServerState>,
    mut multipart: Multipart,
) -> Response {
    let mut recorded = RecordedUpload {
        texts: Vec::new(),
        filename: None,
        content_type: None,
        file_len: 0,
    };
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            recorded.filename = field.file_name().map(str::to_string);
            recorded.content_type = field.content_type().map(str::to_string);
            recorded.file_len = field.bytes().await.expect("file bytes").len();
        } else {
            let value = field.text().await.expect("text field");
            recorded.texts.push((name, value));
        }
    }
    state.uploads.lock().await.push(recorded);

    let status = AxumStatusCode::from_u16(*state.upload_status.lock().await).expect("status");
    let body = state
        .upload_response
        .lock()
        .await
        .clone()
        .unwrap_or_else(|| DEFAULT_UPLOAD_RESPONSE.to_string());
    (status, [(CONTENT_TYPE, "application/json")], body).into_response()
}

async fn handle_generate_content(
    State(state): State<MediaServerState>,
    RawQuery(query): RawQuery,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state
        .caption_requests
        .lock()
        .await
        .push((query.unwrap_or_default(), body));

    let status = AxumStatusCode::from_u16(*state.caption_status.lock().await).expect("status");
    let response = state.caption_response.lock().await.clone();
    (status, [(CONTENT_TYPE, "application/json")], response).into_response()
}

async fn handle_image(State(state): State<MediaServerState>) -> Response {
    let content_type = state.image_content_type.lock().await.clone();
    (
        [(CONTENT_TYPE, content_type)],
        png_image().bytes,
    )
        .into_response()
}

async fn spawn_media_server() -> (String, MediaServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = MediaServerState::default();
    *state.upload_status.lock().await = 200;
    *state.caption_status.lock().await = 200;
    *state.caption_response.lock().await = DEFAULT_CAPTION_RESPONSE.to_string();
    *state.image_content_type.lock().await = "image/png".to_string();
    let app = Router::new()
        .route("/v1_1/:cloud/image/upload", post(handle_upload))
        .route("/v1beta/models/:call", post(handle_generate_content))
        .route("/image", get(handle_image))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

#[test]
fn validate_image_rejects_bad_inputs() {
    let mut image = png_image();
    image.bytes.clear();
    assert!(matches!(validate_image(&image), Err(MediaError::EmptyImage)));

    let mut image = png_image();
    image.mime_type = "application/pdf".to_string();
    assert!(matches!(
        validate_image(&image),
        Err(MediaError::NotAnImage(_))
    ));

    let mut image = png_image();
    image.bytes = vec![0u8; MAX_IMAGE_BYTES + 1];
    assert!(matches!(
        validate_image(&image),
        Err(MediaError::TooLarge { .. })
    ));

    assert!(validate_image(&png_image()).is_ok());
}

#[tokio::test]
async fn upload_sends_unsigned_multipart_and_parses_the_response() {
    let (base_url, state) = spawn_media_server().await;
    let uploader = CdnUploader::new(base_url, "testcloud", "unsigned-preset");

    let uploaded = uploader.upload_image(&png_image()).await.expect("upload");
    assert_eq!(uploaded.url, "https://cdn.test/vistagram/rooftops.jpg");
    assert_eq!(uploaded.public_id.as_deref(), Some("vistagram/rooftops"));
    assert_eq!(uploaded.width, Some(1280));
    assert_eq!(uploaded.format.as_deref(), Some("jpg"));

    let uploads = state.uploads.lock().await.clone();
    assert_eq!(uploads.len(), 1);
    let upload = &uploads[0];
    assert_eq!(upload.filename.as_deref(), Some("rooftops.png"));
    assert_eq!(upload.content_type.as_deref(), Some("image/png"));
    assert_eq!(upload.file_len, png_image().bytes.len());
    assert!(upload
        .texts
        .contains(&("upload_preset".to_string(), "unsigned-preset".to_string())));
    assert!(upload
        .texts
        .contains(&("folder".to_string(), "vistagram".to_string())));
}

#[tokio::test]
async fn upload_without_a_secure_url_is_an_error() {
    let (base_url, state) = spawn_media_server().await;
    *state.upload_response.lock().await = Some(r#"{"public_id": "vistagram/x"}"#.to_string());
    let uploader = CdnUploader::new(base_url, "testcloud", "unsigned-preset");

    let err = uploader
        .upload_image(&png_image())
        .await
        .expect_err("must fail");
    assert!(matches!(err, MediaError::MissingUrl));
}

#[tokio::test]
async fn upload_failure_surfaces_the_cdn_error_message() {
    let (base_url, state) = spawn_media_server().await;
    *state.upload_status.lock().await = 400;
    *state.upload_response.lock().await =
        Some(r#"{"error": {"message": "Unknown upload preset"}}"#.to_string());
    let uploader = CdnUploader::new(base_url, "testcloud", "bad-preset");

    let err = uploader
        .upload_image(&png_image())
        .await
        .expect_err("must fail");
    match err {
        MediaError::Upload(message) => assert_eq!(message, "Unknown upload preset"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn upload_rejects_invalid_images_locally() {
    // No server: validation fails before any request is built.
    let uploader = CdnUploader::new("http://127.0.0.1:9", "testcloud", "unsigned-preset");
    let mut image = png_image();
    image.mime_type = "text/plain".to_string();

    let err = uploader.upload_image(&image).await.expect_err("must fail");
    assert!(matches!(err, MediaError::NotAnImage(_)));
}

#[tokio::test]
async fn caption_round_trip_inlines_the_image_and_trims_the_text() {
    let (base_url, state) = spawn_media_server().await;
    let captioner = GenerativeCaptioner::new(base_url, "test-key", "test-model");

    let image = png_image();
    let caption = captioner
        .caption_image(&image.mime_type, &image.bytes)
        .await
        .expect("caption");
    assert_eq!(
        caption,
        "Golden hour over the old town \u{2728} #vistagram #sunset"
    );

    let requests = state.caption_requests.lock().await.clone();
    assert_eq!(requests.len(), 1);
    let (query, body) = &requests[0];
    assert_eq!(query, "key=test-key");
    let inline = &body["contents"][0]["parts"][0]["inlineData"];
    assert_eq!(inline["mimeType"], "image/png");
    assert_eq!(inline["data"], STANDARD.encode(png_image().bytes));
    assert_eq!(
        body["generationConfig"]["maxOutputTokens"],
        serde_json::json!(200)
    );
}

#[tokio::test]
async fn caption_image_url_fetches_and_delegates() {
    let (base_url, state) = spawn_media_server().await;
    let captioner = GenerativeCaptioner::new(base_url.clone(), "test-key", "test-model");

    let caption = captioner
        .caption_image_url(&format!("{base_url}/image"))
        .await
        .expect("caption");
    assert!(caption.starts_with("Golden hour"));
    assert_eq!(state.caption_requests.lock().await.len(), 1);
}

#[tokio::test]
async fn caption_image_url_rejects_non_image_content() {
    let (base_url, state) = spawn_media_server().await;
    *state.image_content_type.lock().await = "text/html".to_string();
    let captioner = GenerativeCaptioner::new(base_url.clone(), "test-key", "test-model");

    let err = captioner
        .caption_image_url(&format!("{base_url}/image"))
        .await
        .expect_err("must fail");
    assert!(matches!(err, MediaError::NotAnImage(_)));
    assert!(state.caption_requests.lock().await.is_empty());
}

#[tokio::test]
async fn empty_candidate_text_is_an_error() {
    let (base_url, state) = spawn_media_server().await;
    *state.caption_response.lock().await =
        r#"{"candidates": [{"content": {"parts": [{"text": "   "}]}}]}"#.to_string();
    let captioner = GenerativeCaptioner::new(base_url, "test-key", "test-model");

    let image = png_image();
    let err = captioner
        .caption_image(&image.mime_type, &image.bytes)
        .await
        .expect_err("must fail");
    assert!(matches!(err, MediaError::EmptyCaption));
}

#[tokio::test]
async fn quota_failures_classify_to_the_busy_fallback() {
    let (base_url, state) = spawn_media_server().await;
    *state.caption_status.lock().await = 429;
    let captioner = GenerativeCaptioner::new(base_url, "test-key", "test-model");

    let image = png_image();
    let err = captioner
        .caption_image(&image.mime_type, &image.bytes)
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("quota"));
    assert!(fallback_caption(&err).contains("busy"));
}

#[test]
fn fallback_caption_covers_every_failure_class() {
    let unconfigured = MediaError::Caption("caption provider is not configured".to_string());
    assert!(fallback_caption(&unconfigured).starts_with("Unable to generate"));

    let rejected_key = MediaError::Caption("API key rejected (status 401)".to_string());
    assert!(fallback_caption(&rejected_key).starts_with("Unable to generate"));

    let fetch = MediaError::Caption("failed to fetch image: status 404".to_string());
    assert!(fallback_caption(&fetch).contains("looks amazing"));

    let other = MediaError::EmptyCaption;
    assert!(fallback_caption(&other).contains("beautiful moment"));
}

#[test]
fn transformed_url_applies_defaults_and_overrides() {
    let uploader = CdnUploader::new("https://cdn.test", "testcloud", "unsigned-preset");

    assert_eq!(
        uploader.transformed_url("vistagram/rooftops", &Transformations::default()),
        "https://cdn.test/testcloud/image/upload/w_auto,h_auto,c_fill,q_auto,f_auto/vistagram/rooftops"
    );

    let options = Transformations {
        width: Some(640),
        height: Some(480),
        crop: "fit".to_string(),
        ..Transformations::default()
    };
    assert_eq!(
        uploader.transformed_url("vistagram/rooftops", &options),
        "https://cdn.test/testcloud/image/upload/w_640,h_480,c_fit,q_auto,f_auto/vistagram/rooftops"
    );
}

#[tokio::test]
async fn missing_implementations_always_error() {
    let err = MissingImageUploader
        .upload_image(&png_image())
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("not configured"));

    let err = MissingCaptionProvider
        .caption_image("image/png", &[1, 2, 3])
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("not configured"));
}
