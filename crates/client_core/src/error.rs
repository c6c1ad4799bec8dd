use thiserror::Error;

/// Failure taxonomy for remote calls issued by the client.
///
/// A like/dislike issued while another one is in flight is NOT an error:
/// the call is dropped and reported as `ReactionOutcome::Dropped`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No usable response: connect failure, broken transport, or timeout.
    #[error("network failure: {0}")]
    Network(String),

    /// The backend answered with a non-2xx status other than 401.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// 401 from the backend. Raised only after the session has been
    /// invalidated and `ClientEvent::SessionExpired` broadcast.
    #[error("unauthorized: session invalidated")]
    Unauthorized,

    /// The operation requires a session token and none is stored.
    #[error("not logged in")]
    NotLoggedIn,

    /// 2xx response whose body failed to deserialize.
    #[error("invalid server response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }

    /// True for the transient failures a UI should surface as a retryable
    /// notice rather than a session problem.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}
