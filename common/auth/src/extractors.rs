use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts};

use crate::error::{AuthError, AuthResult};
use crate::identity::TokenValidator;
use crate::user::AuthenticatedUser;

/// The caller, resolved from the bearer token by the configured validator.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: AuthenticatedUser,
    pub token: String,
}

impl AuthContext {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<dyn TokenValidator>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let validator = Arc::<dyn TokenValidator>::from_ref(state);

        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;

        let token = parse_bearer(header_value)?;
        let user = validator.validate(&token).await?;
        tracing::Span::current().record("user_id", tracing::field::display(&user.id));

        Ok(Self { user, token })
    }
}

fn parse_bearer(value: &axum::http::HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorization)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
