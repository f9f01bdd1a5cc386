use std::env;
use std::fmt;
use std::str::FromStr;

use common_resilient_client::RetryConfig;

use crate::error::{AuthError, AuthResult};

/// Deployment the identity service base URL is selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityEnvironment {
    Production,
    Staging,
    Development,
}

impl IdentityEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityEnvironment::Production => "PRODUCTION",
            IdentityEnvironment::Staging => "STAGING",
            IdentityEnvironment::Development => "DEVELOPMENT",
        }
    }

    /// Name of the variable holding this environment's base URL.
    pub fn url_var(&self) -> String {
        format!("IDENTITY_{}_URL", self.as_str())
    }
}

impl fmt::Display for IdentityEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityEnvironment {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRODUCTION" => Ok(IdentityEnvironment::Production),
            "STAGING" => Ok(IdentityEnvironment::Staging),
            "DEVELOPMENT" => Ok(IdentityEnvironment::Development),
            other => Err(AuthError::Configuration(format!(
                "unknown identity environment '{other}'"
            ))),
        }
    }
}

/// Runtime configuration for the identity service client.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub environment: IdentityEnvironment,
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub retry: RetryConfig,
}

impl IdentityConfig {
    pub fn new(environment: IdentityEnvironment, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            environment,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("IDENTITY_ENV") {
            Some(raw) => raw.parse::<IdentityEnvironment>()?,
            None => IdentityEnvironment::Development,
        };
        let url_var = environment.url_var();
        let base_url = lookup(&url_var)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AuthError::Configuration(format!("{url_var} must be set")))?;

        let defaults = RetryConfig::default();
        let parse = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(default)
        };
        let max_retries = lookup("IDENTITY_MAX_RETRIES")
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);
        let retry = defaults
            .with_max_retries(max_retries)
            .with_initial_backoff_ms(parse("IDENTITY_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms))
            .with_max_backoff_ms(parse("IDENTITY_MAX_BACKOFF_MS", defaults.max_backoff_ms));

        Ok(Self::new(environment, base_url).with_retry(retry))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
