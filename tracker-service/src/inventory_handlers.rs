use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::api::{ok, ApiJson, ApiPath, ApiQuery};
use crate::ledger::{StockState, UsageStats};
use crate::model::{
    ConsumptionRequest, InventoryConsumption, InventoryItem, InventoryItemUpdate, InventorySummary,
    NewInventoryItem,
};
use crate::query::{InventoryFilter, InventoryListParams, PageParams, Pagination};
use crate::{store, AppState};

pub(crate) const ITEM_NOT_FOUND: &str = "inventory_item_not_found";

fn item_not_found() -> ApiError {
    ApiError::not_found(ITEM_NOT_FOUND, "Inventory item not found")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryPage {
    pub items: Vec<InventorySummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub item: InventoryItem,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    pub item: InventoryItem,
    pub low_stock: bool,
    pub stock_state: StockState,
    pub usage: UsageStats,
}

#[derive(Debug, Serialize)]
pub struct ConsumptionPayload {
    pub consumption: InventoryConsumption,
}

#[derive(Debug, Serialize)]
pub struct ConsumptionHistory {
    pub consumption: Vec<InventoryConsumption>,
}

#[derive(Debug, Serialize)]
pub struct UsagePayload {
    pub usage: UsageStats,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: Uuid,
}

#[instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn list_inventory(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<InventoryListParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = InventoryFilter::try_from(params)?;
    let (items, total) = store::list_summaries(&state.db, auth.user_id(), &filter).await?;
    Ok(ok(InventoryPage {
        items,
        total,
        limit: filter.pagination.limit,
        offset: filter.pagination.offset,
    }))
}

#[instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn create_inventory_item(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(payload): ApiJson<NewInventoryItem>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let item = store::create_item(&state.db, auth.user_id(), &payload).await?;
    Ok((StatusCode::CREATED, ok(ItemPayload { item })))
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %item_id))]
pub async fn get_inventory_item(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(item_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let item = store::get_item(&state.db, auth.user_id(), item_id)
        .await?
        .ok_or_else(item_not_found)?;
    let usage = store::compute_usage(&state.db, auth.user_id(), item_id)
        .await?
        .ok_or_else(item_not_found)?;
    Ok(ok(ItemDetail {
        low_stock: item.low_stock(),
        stock_state: item.stock_state(),
        item,
        usage,
    }))
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %item_id))]
pub async fn update_inventory_item(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(item_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<InventoryItemUpdate>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let item = store::update_item(&state.db, auth.user_id(), item_id, &payload)
        .await?
        .ok_or_else(item_not_found)?;
    Ok(ok(ItemPayload { item }))
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %item_id))]
pub async fn delete_inventory_item(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(item_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !store::delete_item(&state.db, auth.user_id(), item_id).await? {
        return Err(item_not_found());
    }
    Ok(ok(Deleted { deleted: item_id }))
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %item_id))]
pub async fn record_consumption(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(item_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ConsumptionRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let consumption = store::record_consumption(&state.db, auth.user_id(), item_id, &payload)
        .await?
        .ok_or_else(item_not_found)?;
    state.metrics.consumption_recorded_total.inc();
    Ok((StatusCode::CREATED, ok(ConsumptionPayload { consumption })))
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %item_id))]
pub async fn get_usage(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(item_id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let usage = store::compute_usage(&state.db, auth.user_id(), item_id)
        .await?
        .ok_or_else(item_not_found)?;
    Ok(ok(UsagePayload { usage }))
}

#[instrument(skip_all, fields(user_id = %auth.user_id(), %item_id))]
pub async fn list_consumption(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(item_id): ApiPath<Uuid>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> ApiResult<impl IntoResponse> {
    let consumption =
        store::consumption_history(&state.db, auth.user_id(), item_id, Pagination::from(page))
            .await?
            .ok_or_else(item_not_found)?;
    Ok(ok(ConsumptionHistory { consumption }))
}
