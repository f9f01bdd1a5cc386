use async_trait::async_trait;
use common_resilient_client::{OutboundRequest, ResilientClient};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::IdentityConfig;
use crate::error::{AuthError, AuthResult};
use crate::user::{AuthenticatedUser, ValidationRepr};

/// Resolves a bearer token to the user it belongs to.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> AuthResult<AuthenticatedUser>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Client for the third-party identity service. Every call goes through the resilient client.
#[derive(Clone)]
pub struct IdentityClient {
    config: IdentityConfig,
    http: ResilientClient,
}

impl IdentityClient {
    pub fn new(config: IdentityConfig) -> Self {
        let http = ResilientClient::new(config.retry);
        Self { config, http }
    }

    /// Uses a pre-configured client (custom sleeper, metrics counter).
    pub fn with_client(config: IdentityConfig, http: ResilientClient) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Value> {
        let request = OutboundRequest::post(self.config.url("/auth/login"))
            .with_json(&json!({ "email": email, "password": password }))?;
        Ok(self.http.execute_json(&request).await?)
    }

    pub async fn register(&self, registration: &RegistrationRequest) -> AuthResult<Value> {
        let request =
            OutboundRequest::post(self.config.url("/auth/register")).with_json(registration)?;
        Ok(self.http.execute_json(&request).await?)
    }

    pub async fn validate_token(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        let request = OutboundRequest::post(self.config.url("/auth/validate"))
            .with_bearer(token)
            .map_err(|_| AuthError::InvalidAuthorization)?;
        let repr: ValidationRepr = self
            .http
            .execute_json(&request)
            .await
            .map_err(AuthError::from_validation_failure)?;
        let user = AuthenticatedUser::try_from(repr)?;
        debug!(user_id = %user.id, "validated bearer token");
        Ok(user)
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> AuthResult<Value> {
        let request = OutboundRequest::post(self.config.url("/auth/refresh"))
            .with_json(&json!({ "refreshToken": refresh_token }))?;
        Ok(self.http.execute_json(&request).await?)
    }

    pub async fn request_password_reset(&self, email: &str) -> AuthResult<Value> {
        let request = OutboundRequest::post(self.config.url("/auth/password-reset"))
            .with_json(&json!({ "email": email }))?;
        Ok(self.http.execute_json(&request).await?)
    }

    pub async fn user_profile(&self, token: &str) -> AuthResult<Value> {
        let request = OutboundRequest::get(self.config.url("/users/me")).with_bearer(token)?;
        Ok(self.http.execute_json(&request).await?)
    }

    pub async fn subscription(&self, token: &str) -> AuthResult<Value> {
        let request =
            OutboundRequest::get(self.config.url("/users/me/subscription")).with_bearer(token)?;
        Ok(self.http.execute_json(&request).await?)
    }
}

#[async_trait]
impl TokenValidator for IdentityClient {
    async fn validate(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        self.validate_token(token).await
    }
}
