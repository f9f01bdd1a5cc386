use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Terminal failures of a resilient request.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },
    #[error("HTTP error {status} {status_text}: {body}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },
    #[error("network error after {attempts} attempts: {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode response body: {0}")]
    Decode(String),
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// HTTP status carried by the failure, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::RateLimitExceeded { .. } => Some(429),
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Network { .. }
            | ClientError::Decode(_)
            | ClientError::InvalidRequest(_) => None,
        }
    }

    /// True for failures that were retried until the budget ran out.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::RateLimitExceeded { .. } | ClientError::Network { .. }
        )
    }
}
