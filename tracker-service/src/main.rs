use std::sync::Arc;

use anyhow::Context;
use common_auth::{IdentityClient, IdentityConfig, TokenValidator};
use common_observability::TrackerMetrics;
use common_resilient_client::ResilientClient;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracker_service::{build_router, AppState, TrackerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = TrackerConfig::from_env()?;
    let identity_config = IdentityConfig::from_env().context("identity service configuration")?;
    info!(
        environment = %identity_config.environment,
        base_url = %identity_config.base_url,
        "identity service selected"
    );

    let db = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to DATABASE_URL")?;
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("running migrations")?;

    let metrics = Arc::new(TrackerMetrics::new().context("registering metrics")?);
    let http = ResilientClient::new(identity_config.retry)
        .with_retry_counter(metrics.outbound_retries_total.clone());
    let identity: Arc<dyn TokenValidator> =
        Arc::new(IdentityClient::with_client(identity_config, http));

    let state = AppState {
        db,
        token_validator: identity,
        metrics,
    };
    let app = build_router(state, &config.allowed_origins);

    let addr = config.addr();
    info!(%addr, "starting tracker-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
