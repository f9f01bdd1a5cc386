//! Outbound HTTP with bounded retries.
//!
//! Only rate limits (429) and transport failures are retried. Every other
//! non-2xx status is terminal on the first attempt, 5xx included.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod sleeper;

pub use backoff::{Backoff, FixedJitter, Jitter, RandomJitter, JITTER_MAX, JITTER_MIN};
pub use client::{OutboundRequest, ResilientClient, ResponseBody};
pub use config::RetryConfig;
pub use error::{ClientError, ClientResult};
pub use sleeper::{Sleeper, TokioSleeper};
