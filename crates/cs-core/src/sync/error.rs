use thiserror::Error;

/// Failure reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl RemoteError {
    /// Authentication / authorization failures are never retried.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Unauthorized(_) => true,
            Self::Server { status, message } => {
                matches!(status, 401 | 403) || mentions_auth(message)
            }
            Self::Network(message) => mentions_auth(message),
        }
    }
}

fn mentions_auth(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("auth") || lower.contains("jwt")
}

/// Outcome classes of an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("content is empty")]
    EmptyContent,

    #[error("content was uploaded moments ago")]
    DuplicateLoopPrevention,

    #[error("upload rate limit reached")]
    RateLimited,

    #[error("no authenticated session")]
    NotAuthenticated,

    #[error("content already stored remotely")]
    DuplicateContent,

    #[error("network or server error: {0}")]
    NetworkOrServer(String),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("superseded by a newer capture of the same content")]
    Superseded,
}

impl UploadError {
    /// Whether the caller keeps the content as a local pending record.
    pub fn falls_back_to_pending(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::NetworkOrServer(_) | Self::AuthRejected(_)
        )
    }

    /// Stable code for the presentation message contract.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::DuplicateLoopPrevention => "DUPLICATE_LOOP_PREVENTION",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::DuplicateContent => "DUPLICATE_CONTENT",
            Self::NetworkOrServer(_) => "NETWORK_OR_SERVER_ERROR",
            Self::AuthRejected(_) => "AUTH_REJECTED",
            Self::Superseded => "SUPERSEDED",
        }
    }
}

impl From<RemoteError> for UploadError {
    fn from(err: RemoteError) -> Self {
        if err.is_auth_failure() {
            Self::AuthRejected(err.to_string())
        } else {
            Self::NetworkOrServer(err.to_string())
        }
    }
}
