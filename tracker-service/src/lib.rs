//! Cannabis session and inventory tracker backend.
//!
//! Items deplete through an append-only consumption ledger; sessions link
//! products and effects back to inventory for usage statistics.

use std::sync::Arc;

use axum::extract::FromRef;
use common_auth::TokenValidator;
use common_observability::TrackerMetrics;
use sqlx::PgPool;

pub mod api;
pub mod app;
pub mod config;
pub mod inventory_handlers;
pub mod ledger;
pub mod model;
pub mod query;
pub mod session_handlers;
pub mod session_store;
pub mod store;
pub mod validation;

pub use app::build_router;
pub use config::TrackerConfig;
pub use ledger::{LedgerError, LedgerResult, StockState, UsageStats};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub token_validator: Arc<dyn TokenValidator>,
    pub metrics: Arc<TrackerMetrics>,
}

impl FromRef<AppState> for Arc<dyn TokenValidator> {
    fn from_ref(state: &AppState) -> Self {
        state.token_validator.clone()
    }
}
