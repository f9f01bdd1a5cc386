use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::api::{ok, ApiJson, ApiPath, ApiQuery};
use crate::inventory_handlers::{Deleted, ITEM_NOT_FOUND};
use crate::model::{InventoryConsumption, NewSession, Session, SessionUpdate};
use crate::query::{SessionFilter, SessionListParams};
use crate::session_store::{self, CreateSessionOutcome};
use crate::AppState;

fn session_not_found() -> ApiError {
    ApiError::not_found("session_not_found", "Session not found")
}

#[derive(Debug, Serialize)]
pub struct SessionPayload {
    pub session: Session,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session: Session,
    pub consumption: Vec<InventoryConsumption>,
}

#[derive(Debug, Serialize)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<SessionListParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = SessionFilter::try_from(params)?;
    let (sessions, total) = session_store::list_sessions(&state.db, auth.user_id(), &filter).await?;
    Ok(ok(SessionPage {
        sessions,
        total,
        limit: filter.pagination.limit,
        offset: filter.pagination.offset,
    }))
}

#[instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(payload): ApiJson<NewSession>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    match session_store::create_session(&state.db, auth.user_id(), &payload).await? {
        CreateSessionOutcome::Created { session, consumption } => {
            state.metrics.sessions_created_total.inc();
            state
                .metrics
                .consumption_recorded_total
                .inc_by(consumption.len() as u64);
            Ok((StatusCode::CREATED, ok(CreatedSession { session, consumption })))
        }
        CreateSessionOutcome::UnknownInventoryItem(item_id) => {
            warn!(%item_id, "session references unknown inventory item");
            Err(ApiError::not_found(
                ITEM_NOT_FOUND,
                format!("Inventory item {item_id} not found"),
            ))
        }
    }
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %session_id))]
pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = session_store::get_session(&state.db, auth.user_id(), session_id)
        .await?
        .ok_or_else(session_not_found)?;
    Ok(ok(SessionPayload { session }))
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %session_id))]
pub async fn update_session(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(session_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SessionUpdate>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let session = session_store::update_session(&state.db, auth.user_id(), session_id, &payload)
        .await?
        .ok_or_else(session_not_found)?;
    Ok(ok(SessionPayload { session }))
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %session_id))]
pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !session_store::delete_session(&state.db, auth.user_id(), session_id).await? {
        return Err(session_not_found());
    }
    Ok(ok(Deleted { deleted: session_id }))
}
