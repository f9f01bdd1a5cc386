use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, Request, StatusCode,
    },
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use common_observability::TrackerMetrics;
use prometheus::{Encoder, TextEncoder};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::inventory_handlers::{
    create_inventory_item, delete_inventory_item, get_inventory_item, get_usage, list_consumption,
    list_inventory, record_consumption, update_inventory_item,
};
use crate::session_handlers::{
    create_session, delete_session, get_session, list_sessions, update_session,
};
use crate::AppState;

pub const SERVICE_NAME: &str = "tracker-service";

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
}

/// Counts every response with status >= 400 by its `X-Error-Code`.
pub async fn error_metrics_mw(
    State(metrics): State<Arc<TrackerMetrics>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("x-error-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        metrics
            .http_errors_total
            .with_label_values(&[SERVICE_NAME, code, status.as_str()])
            .inc();
    }
    resp
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let metrics = state.metrics.clone();
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/inventory", get(list_inventory).post(create_inventory_item))
        .route(
            "/inventory/:id",
            get(get_inventory_item)
                .put(update_inventory_item)
                .delete(delete_inventory_item),
        )
        .route("/inventory/:id/consume", axum::routing::post(record_consumption))
        .route("/inventory/:id/usage", get(get_usage))
        .route("/inventory/:id/consumption", get(list_consumption))
        .route("/sessions", get(list_sessions).post(create_session))
        .route(
            "/sessions/:id",
            get(get_session).put(update_session).delete(delete_session),
        )
        .with_state(state)
        .layer(middleware::from_fn_with_state(metrics, error_metrics_mw))
        .layer(cors_layer(allowed_origins))
}
