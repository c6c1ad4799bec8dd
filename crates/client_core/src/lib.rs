use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use url::Url;

use shared::{
    domain::PostId,
    error::ApiError,
    protocol::{
        AuthResponse, CreatePostRequest, FeedQuery, LoginRequest, PostPayload, ReactionUpdate,
        ShareResponse, SignupRequest, UpdatePostRequest, UserSummary,
    },
};

pub mod error;
pub mod reaction;
pub mod session;

pub use error::ClientError;
pub use reaction::{ReactionApi, ReactionController, ReactionOutcome, ReactionSnapshot};
pub use session::{FileTokenStore, InMemoryTokenStore, TokenStore};

/// Bound on every remote call so a dead network cannot leave a reaction
/// stuck in its in-flight state.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Process-wide notifications emitted by the client. Fire-and-forget:
/// lagging or absent receivers are fine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The backend rejected the session token. Credentials have already
    /// been cleared; the shell should return to the login flow.
    SessionExpired,
}

/// HTTP client for the Vistagram backend: auth, posts, and the reaction
/// endpoints consumed by [`ReactionController`].
///
/// The session token lives in an injected [`TokenStore`] and is attached
/// as a bearer header to every request that has one. A 401 from any
/// endpoint invalidates the session before the error is surfaced.
pub struct VistagramClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    current_user: Mutex<Option<UserSummary>>,
    events: broadcast::Sender<ClientEvent>,
}

impl VistagramClient {
    pub fn new(base_url: Url, tokens: Arc<dyn TokenStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            http: Client::new(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            tokens,
            current_user: Mutex::new(None),
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    pub async fn current_user(&self) -> Option<UserSummary> {
        self.current_user.lock().await.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Build the reaction controller for one displayed post, seeded from
    /// its server payload. This is the only production construction path:
    /// every post view shares these exact toggle/rollback semantics.
    pub fn reaction_controller(self: &Arc<Self>, post: &PostPayload) -> ReactionController {
        ReactionController::from_post(post, Arc::clone(self) as Arc<dyn ReactionApi>)
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<AuthResponse, ClientError> {
        let response = self
            .execute(self.http.post(self.endpoint("/auth/signup")).json(&request))
            .await?;
        let auth: AuthResponse = decode(response).await?;
        self.adopt_session(&auth).await;
        Ok(auth)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ClientError> {
        let response = self
            .execute(self.http.post(self.endpoint("/auth/login")).json(&request))
            .await?;
        let auth: AuthResponse = decode(response).await?;
        self.adopt_session(&auth).await;
        Ok(auth)
    }

    /// Best effort: the remote call may fail, the local session is cleared
    /// regardless.
    pub async fn logout(&self) {
        let result = self.execute(self.http.post(self.endpoint("/auth/logout"))).await;
        match result {
            Ok(_) | Err(ClientError::Unauthorized) => {}
            Err(err) => warn!("logout call failed: {err}"),
        }
        self.tokens.clear_token();
        *self.current_user.lock().await = None;
    }

    pub async fn fetch_posts(&self, query: FeedQuery) -> Result<Vec<PostPayload>, ClientError> {
        let response = self
            .execute(self.http.get(self.endpoint("/posts")).query(&query))
            .await?;
        decode(response).await
    }

    pub async fn fetch_post(&self, post_id: PostId) -> Result<PostPayload, ClientError> {
        let response = self
            .execute(self.http.get(self.endpoint(format!("/posts/{}", post_id.0))))
            .await?;
        decode(response).await
    }

    pub async fn create_post(
        &self,
        request: CreatePostRequest,
    ) -> Result<PostPayload, ClientError> {
        self.ensure_authenticated()?;
        let response = self
            .execute(self.http.post(self.endpoint("/posts")).json(&request))
            .await?;
        decode(response).await
    }

    pub async fn update_post(
        &self,
        post_id: PostId,
        request: UpdatePostRequest,
    ) -> Result<PostPayload, ClientError> {
        self.ensure_authenticated()?;
        let response = self
            .execute(
                self.http
                    .put(self.endpoint(format!("/posts/{}", post_id.0)))
                    .json(&request),
            )
            .await?;
        decode(response).await
    }

    pub async fn delete_post(&self, post_id: PostId) -> Result<(), ClientError> {
        self.ensure_authenticated()?;
        self.execute(self.http.delete(self.endpoint(format!("/posts/{}", post_id.0))))
            .await?;
        Ok(())
    }

    /// Liveness probe for diagnostics; carries no auth.
    pub async fn health(&self) -> Result<(), ClientError> {
        self.execute(self.http.get(self.endpoint("/health"))).await?;
        Ok(())
    }

    fn endpoint(&self, path: impl AsRef<str>) -> String {
        format!("{}{}", self.base_url, path.as_ref())
    }

    fn ensure_authenticated(&self) -> Result<(), ClientError> {
        if self.tokens.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::NotLoggedIn)
        }
    }

    async fn adopt_session(&self, auth: &AuthResponse) {
        self.tokens.set_token(&auth.token);
        *self.current_user.lock().await = Some(auth.user.clone());
    }

    /// The session-invalidation hook: clear credentials and notify the
    /// shell. Called from exactly one place, the 401 branch of `execute`.
    async fn invalidate_session(&self) {
        debug!("session token rejected by the backend; clearing credentials");
        self.tokens.clear_token();
        *self.current_user.lock().await = None;
        let _ = self.events.send(ClientEvent::SessionExpired);
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let builder = match self.tokens.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let response = builder
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_session().await;
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(body) => body.message,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unexpected server response")
                    .to_string(),
            };
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ReactionApi for VistagramClient {
    async fn like_post(&self, post_id: PostId) -> Result<ReactionUpdate, ClientError> {
        let response = self
            .execute(self.http.post(self.endpoint(format!("/posts/{}/like", post_id.0))))
            .await?;
        decode_or_default(response).await
    }

    async fn dislike_post(&self, post_id: PostId) -> Result<ReactionUpdate, ClientError> {
        let response = self
            .execute(
                self.http
                    .post(self.endpoint(format!("/posts/{}/dislike", post_id.0))),
            )
            .await?;
        decode_or_default(response).await
    }

    async fn share_post(&self, post_id: PostId) -> Result<Option<u64>, ClientError> {
        let response = self
            .execute(
                self.http
                    .post(self.endpoint(format!("/posts/{}/share", post_id.0))),
            )
            .await?;
        let body: ShareResponse = decode_or_default(response).await?;
        Ok(body.share_count)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await.map_err(ClientError::from_transport)?;
    serde_json::from_slice(&bytes).map_err(|err| ClientError::InvalidResponse(err.to_string()))
}

/// Like `decode`, but an empty 2xx body resolves to `T::default()`. The
/// reaction endpoints are allowed to answer with no payload at all.
async fn decode_or_default<T: DeserializeOwned + Default>(
    response: Response,
) -> Result<T, ClientError> {
    let bytes = response.bytes().await.map_err(ClientError::from_transport)?;
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|err| ClientError::InvalidResponse(err.to_string()))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
