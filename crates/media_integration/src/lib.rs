use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Upper bound on accepted image payloads, matching the CDN's unsigned
/// upload limit.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Folder the CDN groups Vistagram uploads under.
const UPLOAD_FOLDER: &str = "vistagram";

pub const DEFAULT_CAPTION_MODEL: &str = "gemini-2.0-flash";

const CAPTION_PROMPT: &str = "Generate a creative and engaging social media caption \
for this image. Keep it concise, fun, and suitable for a social media platform like \
Instagram. Include relevant hashtags at the end. Make it authentic and relatable. \
Maximum 280 characters including hashtags.";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("no image data provided")]
    EmptyImage,
    #[error("invalid file type '{0}': expected an image")]
    NotAnImage(String),
    #[error("image is {actual} bytes, over the {limit} byte limit")]
    TooLarge { actual: usize, limit: usize },
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("upload succeeded but no URL was returned")]
    MissingUrl,
    #[error("caption generation failed: {0}")]
    Caption(String),
    #[error("caption model returned an empty response")]
    EmptyCaption,
}

/// An image ready to be shipped to one of the media services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub fn validate_image(image: &ImageFile) -> Result<(), MediaError> {
    if image.bytes.is_empty() {
        return Err(MediaError::EmptyImage);
    }
    if !image.mime_type.starts_with("image/") {
        return Err(MediaError::NotAnImage(image.mime_type.clone()));
    }
    if image.bytes.len() > MAX_IMAGE_BYTES {
        return Err(MediaError::TooLarge {
            actual: image.bytes.len(),
            limit: MAX_IMAGE_BYTES,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub url: String,
    pub public_id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    pub bytes: Option<u64>,
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload_image(&self, image: &ImageFile) -> Result<UploadedImage, MediaError>;
}

pub struct MissingImageUploader;

#[async_trait]
impl ImageUploader for MissingImageUploader {
    async fn upload_image(&self, _image: &ImageFile) -> Result<UploadedImage, MediaError> {
        Err(MediaError::Upload(
            "image uploader is not configured".to_string(),
        ))
    }
}

/// Delivery-URL transformation knobs. `None` dimensions resolve to `auto`.
#[derive(Debug, Clone)]
pub struct Transformations {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub crop: String,
    pub quality: String,
    pub format: String,
}

impl Default for Transformations {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            crop: "fill".to_string(),
            quality: "auto".to_string(),
            format: "auto".to_string(),
        }
    }
}

impl Transformations {
    fn segment(&self) -> String {
        let width = self
            .width
            .map_or_else(|| "auto".to_string(), |w| w.to_string());
        let height = self
            .height
            .map_or_else(|| "auto".to_string(), |h| h.to_string());
        format!(
            "w_{width},h_{height},c_{},q_{},f_{}",
            self.crop, self.quality, self.format
        )
    }
}

#[derive(Debug, Deserialize)]
struct CdnUploadResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    format: Option<String>,
    bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CdnErrorBody {
    error: CdnErrorMessage,
}

#[derive(Debug, Deserialize)]
struct CdnErrorMessage {
    message: String,
}

/// Unsigned upload client for the image CDN.
pub struct CdnUploader {
    http: Client,
    base_url: String,
    cloud_name: String,
    upload_preset: String,
}

impl CdnUploader {
    pub fn new(
        base_url: impl Into<String>,
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        }
    }

    /// Derived delivery URL applying the given transformations.
    pub fn transformed_url(&self, public_id: &str, options: &Transformations) -> String {
        format!(
            "{}/{}/image/upload/{}/{}",
            self.base_url,
            self.cloud_name,
            options.segment(),
            public_id
        )
    }
}

#[async_trait]
impl ImageUploader for CdnUploader {
    async fn upload_image(&self, image: &ImageFile) -> Result<UploadedImage, MediaError> {
        validate_image(image)?;

        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(image.filename.clone())
            .mime_str(&image.mime_type)
            .map_err(|err| MediaError::NotAnImage(format!("{}: {err}", image.mime_type)))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", UPLOAD_FOLDER);

        let response = self
            .http
            .post(format!(
                "{}/v1_1/{}/image/upload",
                self.base_url, self.cloud_name
            ))
            .multipart(form)
            .send()
            .await
            .map_err(|err| MediaError::Upload(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<CdnErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("upload rejected with status {status}"),
            };
            return Err(MediaError::Upload(message));
        }

        let body: CdnUploadResponse = response
            .json()
            .await
            .map_err(|err| MediaError::Upload(format!("invalid upload response: {err}")))?;
        let url = body.secure_url.ok_or(MediaError::MissingUrl)?;
        debug!(filename = %image.filename, url = %url, "image uploaded");

        Ok(UploadedImage {
            url,
            public_id: body.public_id,
            width: body.width,
            height: body.height,
            format: body.format,
            bytes: body.bytes,
        })
    }
}

#[async_trait]
pub trait CaptionProvider: Send + Sync {
    /// Caption an image from its raw bytes.
    async fn caption_image(&self, mime_type: &str, bytes: &[u8]) -> Result<String, MediaError>;

    /// Fetch an image by URL, then caption it.
    async fn caption_image_url(&self, image_url: &str) -> Result<String, MediaError>;
}

pub struct MissingCaptionProvider;

#[async_trait]
impl CaptionProvider for MissingCaptionProvider {
    async fn caption_image(&self, _mime_type: &str, _bytes: &[u8]) -> Result<String, MediaError> {
        Err(MediaError::Caption(
            "caption provider is not configured".to_string(),
        ))
    }

    async fn caption_image_url(&self, _image_url: &str) -> Result<String, MediaError> {
        Err(MediaError::Caption(
            "caption provider is not configured".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Client for the generative captioning service.
pub struct GenerativeCaptioner {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GenerativeCaptioner {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl CaptionProvider for GenerativeCaptioner {
    async fn caption_image(&self, mime_type: &str, bytes: &[u8]) -> Result<String, MediaError> {
        if self.api_key.is_empty() {
            return Err(MediaError::Caption(
                "caption API key not configured".to_string(),
            ));
        }
        if !mime_type.starts_with("image/") {
            return Err(MediaError::NotAnImage(mime_type.to_string()));
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part {
                        inline_data: Some(InlineData {
                            mime_type,
                            data: STANDARD.encode(bytes),
                        }),
                        text: None,
                    },
                    Part {
                        inline_data: None,
                        text: Some(CAPTION_PROMPT),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: 200,
                temperature: 0.7,
                top_p: 0.8,
                top_k: 40,
            },
        };

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|err| MediaError::Caption(err.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(MediaError::Caption(format!(
                    "API key rejected (status {})",
                    status.as_u16()
                )));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(MediaError::Caption(
                    "quota exhausted (status 429)".to_string(),
                ));
            }
            _ if !status.is_success() => {
                return Err(MediaError::Caption(format!(
                    "caption request failed with status {status}"
                )));
            }
            _ => {}
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| MediaError::Caption(format!("invalid caption response: {err}")))?;
        let caption = body
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let caption = caption.trim();
        if caption.is_empty() {
            return Err(MediaError::EmptyCaption);
        }
        debug!(model = %self.model, "caption generated");
        Ok(caption.to_string())
    }

    async fn caption_image_url(&self, image_url: &str) -> Result<String, MediaError> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .map_err(|err| MediaError::Caption(format!("failed to fetch image: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Caption(format!(
                "failed to fetch image: status {status}"
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        if !mime_type.starts_with("image/") {
            return Err(MediaError::NotAnImage(mime_type));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| MediaError::Caption(format!("failed to fetch image: {err}")))?;
        self.caption_image(&mime_type, &bytes).await
    }
}

/// Canned caption for when the generative service is unavailable, chosen by
/// failure class so the create-post flow never blocks on captioning.
pub fn fallback_caption(err: &MediaError) -> &'static str {
    let message = err.to_string().to_ascii_lowercase();
    if message.contains("api key") || message.contains("401") || message.contains("not configured")
    {
        "Unable to generate a caption right now. \u{2728} #vistagram #memories"
    } else if message.contains("fetch") {
        "Couldn't process the image, but it looks amazing! \u{1F4F8} #vistagram #memories"
    } else if message.contains("quota") || message.contains("429") {
        "Caption service is busy. This moment looks incredible! \u{1F31F} #vistagram #photooftheday"
    } else {
        "Sharing this beautiful moment! \u{2728} #vistagram #memories #photooftheday"
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
