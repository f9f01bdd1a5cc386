use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use common_resilient_client::ClientError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("token rejected by identity service")]
    InvalidToken,
    #[error("malformed identity response: {0}")]
    MalformedIdentityResponse(String),
    #[error("identity service request failed: {0}")]
    Identity(#[from] ClientError),
    #[error("identity configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Maps an identity-service failure on token validation; 401/403 mean the token is bad.
    pub fn from_validation_failure(err: ClientError) -> Self {
        match err.status() {
            Some(401) | Some(403) => AuthError::InvalidToken,
            _ => AuthError::Identity(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                ApiError::Unauthorized { code: "auth_header", message: value.to_string() }
            }
            AuthError::InvalidToken => {
                ApiError::Unauthorized { code: "invalid_token", message: value.to_string() }
            }
            AuthError::MalformedIdentityResponse(_) | AuthError::Identity(_) => {
                tracing::warn!(error = %value, "identity service unavailable");
                ApiError::unavailable("identity_unavailable", "Identity service unavailable")
            }
            AuthError::Configuration(_) => ApiError::internal(value),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
