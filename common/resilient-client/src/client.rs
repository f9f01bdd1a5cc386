use std::sync::Arc;
use std::time::Duration;

use prometheus::IntCounterVec;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backoff::{Backoff, Jitter, RandomJitter};
use crate::config::RetryConfig;
use crate::error::{ClientError, ClientResult};
use crate::sleeper::{Sleeper, TokioSleeper};

/// A request description that can be replayed on every attempt.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_bearer(self, token: &str) -> ClientResult<Self> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| ClientError::InvalidRequest(err.to_string()))?;
        Ok(self.with_header(AUTHORIZATION, value))
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| ClientError::InvalidRequest(err.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }
}

/// Successful response payload, shaped by `RetryConfig::parse_json`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn into_json(self) -> Option<Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            ResponseBody::Text(text) => Some(text),
            ResponseBody::Json(_) => None,
        }
    }
}

/// What a single attempt produced.
enum AttemptOutcome {
    Success(Response),
    RateLimited { retry_after: Option<String> },
    Rejected { status: StatusCode, body: String },
    Transport(reqwest::Error),
}

impl AttemptOutcome {
    fn retry_reason(&self) -> Option<&'static str> {
        match self {
            AttemptOutcome::RateLimited { .. } => Some("rate_limited"),
            AttemptOutcome::Transport(_) => Some("network"),
            AttemptOutcome::Success(_) | AttemptOutcome::Rejected { .. } => None,
        }
    }
}

/// HTTP executor that retries rate limits and transport failures with backoff.
///
/// Holds no per-call state; every `execute` starts a fresh backoff sequence.
#[derive(Clone)]
pub struct ResilientClient {
    http: Client,
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn Jitter>,
    retry_counter: Option<IntCounterVec>,
}

impl ResilientClient {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: RetryConfig) -> Self {
        Self {
            http,
            config,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(RandomJitter),
            retry_counter: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Counter incremented once per retry, labelled by `reason`.
    pub fn with_retry_counter(mut self, counter: IntCounterVec) -> Self {
        self.retry_counter = Some(counter);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute(&self, request: &OutboundRequest) -> ClientResult<ResponseBody> {
        let response = self.send_with_retries(request).await?;
        if self.config.parse_json {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| ClientError::Decode(err.to_string()))?;
            if bytes.is_empty() {
                return Ok(ResponseBody::Json(Value::Null));
            }
            let value = serde_json::from_slice(&bytes)
                .map_err(|err| ClientError::Decode(err.to_string()))?;
            Ok(ResponseBody::Json(value))
        } else {
            let text = response
                .text()
                .await
                .map_err(|err| ClientError::Decode(err.to_string()))?;
            Ok(ResponseBody::Text(text))
        }
    }

    /// Executes the request and deserializes a JSON body into `T`.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: &OutboundRequest) -> ClientResult<T> {
        let response = self.send_with_retries(request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
    }

    async fn send_with_retries(&self, request: &OutboundRequest) -> ClientResult<Response> {
        let mut backoff = Backoff::new(&self.config);
        let mut attempts: u32 = 1;
        let mut outcome = self.attempt(request).await;

        for retry in 1..=self.config.max_retries {
            let wait = match &outcome {
                AttemptOutcome::Success(_) | AttemptOutcome::Rejected { .. } => break,
                AttemptOutcome::RateLimited { retry_after } => {
                    let wait = backoff.rate_limit_wait(retry_after.as_deref());
                    backoff.grow_with_jitter(self.jitter.multiplier());
                    wait
                }
                AttemptOutcome::Transport(err) => {
                    debug!(error = %err, url = %request.url, "outbound transport failure");
                    let wait = backoff.current();
                    backoff.double();
                    wait
                }
            };
            let reason = outcome.retry_reason().unwrap_or("unknown");
            self.record_retry(request, reason, retry, wait);
            self.sleeper.sleep(wait).await;
            attempts += 1;
            outcome = self.attempt(request).await;
        }

        match outcome {
            AttemptOutcome::Success(response) => Ok(response),
            AttemptOutcome::Rejected { status, body } => Err(ClientError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            }),
            AttemptOutcome::RateLimited { .. } => {
                warn!(url = %request.url, attempts, "rate limit budget exhausted");
                Err(ClientError::RateLimitExceeded { attempts })
            }
            AttemptOutcome::Transport(source) => {
                warn!(url = %request.url, attempts, error = %source, "network retry budget exhausted");
                Err(ClientError::Network { attempts, source })
            }
        }
    }

    async fn attempt(&self, request: &OutboundRequest) -> AttemptOutcome {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return AttemptOutcome::Transport(err),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            AttemptOutcome::RateLimited { retry_after }
        } else if status.is_success() {
            AttemptOutcome::Success(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            AttemptOutcome::Rejected { status, body }
        }
    }

    fn record_retry(&self, request: &OutboundRequest, reason: &'static str, retry: u32, wait: Duration) {
        warn!(
            url = %request.url,
            method = %request.method,
            reason,
            retry,
            wait_ms = wait.as_millis() as u64,
            "retrying outbound request"
        );
        if let Some(counter) = &self.retry_counter {
            counter.with_label_values(&[reason]).inc();
        }
    }
}
