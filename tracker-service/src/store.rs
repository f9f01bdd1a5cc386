//! Postgres persistence for inventory items and the consumption ledger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ledger::{
    validate_amount, ConsumptionPoint, LedgerResult, SessionUsage, UsageStats, LOW_STOCK_RATIO,
};
use crate::model::{
    ConsumptionRequest, InventoryConsumption, InventoryItem, InventoryItemRow, InventoryItemUpdate,
    InventorySummary, InventorySummaryRow, NewInventoryItem,
};
use crate::query::{InventoryFilter, Pagination};

pub(crate) const DEFAULT_UNIT: &str = "g";

pub(crate) const INSERT_ITEM_SQL: &str = r#"INSERT INTO inventory_items (
        id, user_id, name, item_type, brand, strain_name, strain_type, strain_dominance,
        thc_content, cbd_content, initial_quantity, current_quantity, unit, purchase_date,
        price, notes, is_favorite)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
    RETURNING id, user_id, name, item_type, brand, strain_name, strain_type, strain_dominance,
        thc_content, cbd_content, initial_quantity, current_quantity, unit, purchase_date,
        price, notes, is_favorite, created_at, updated_at"#;

pub(crate) const SELECT_ITEM_SQL: &str = r#"SELECT id, user_id, name, item_type, brand, strain_name,
        strain_type, strain_dominance, thc_content, cbd_content, initial_quantity,
        current_quantity, unit, purchase_date, price, notes, is_favorite, created_at, updated_at
    FROM inventory_items WHERE id = $1 AND user_id = $2"#;

pub(crate) const UPDATE_ITEM_SQL: &str = r#"UPDATE inventory_items SET
        name = COALESCE($3, name),
        item_type = COALESCE($4, item_type),
        brand = COALESCE($5, brand),
        strain_name = COALESCE($6, strain_name),
        strain_type = COALESCE($7, strain_type),
        strain_dominance = COALESCE($8, strain_dominance),
        thc_content = COALESCE($9, thc_content),
        cbd_content = COALESCE($10, cbd_content),
        initial_quantity = COALESCE($11, initial_quantity),
        current_quantity = COALESCE($12, current_quantity),
        unit = COALESCE($13, unit),
        purchase_date = COALESCE($14, purchase_date),
        price = COALESCE($15, price),
        notes = COALESCE($16, notes),
        is_favorite = COALESCE($17, is_favorite),
        updated_at = NOW()
    WHERE id = $1 AND user_id = $2
    RETURNING id, user_id, name, item_type, brand, strain_name, strain_type, strain_dominance,
        thc_content, cbd_content, initial_quantity, current_quantity, unit, purchase_date,
        price, notes, is_favorite, created_at, updated_at"#;

pub(crate) const DELETE_ITEM_SQL: &str =
    "DELETE FROM inventory_items WHERE id = $1 AND user_id = $2";

pub(crate) const ITEM_EXISTS_SQL: &str =
    "SELECT EXISTS (SELECT 1 FROM inventory_items WHERE id = $1 AND user_id = $2)";

/// Single-statement decrement; the floor at zero is applied by the database.
pub(crate) const DECREMENT_SQL: &str = r#"UPDATE inventory_items
    SET current_quantity = GREATEST(0, current_quantity - $1), updated_at = NOW()
    WHERE id = $2 AND user_id = $3
    RETURNING current_quantity"#;

pub(crate) const INSERT_CONSUMPTION_SQL: &str = r#"INSERT INTO inventory_consumption
        (id, inventory_item_id, session_id, amount_used, remaining_amount, timestamp)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING id, inventory_item_id, session_id, amount_used, remaining_amount, timestamp, created_at"#;

pub(crate) const CONSUMPTION_HISTORY_SQL: &str = r#"SELECT id, inventory_item_id, session_id,
        amount_used, remaining_amount, timestamp, created_at
    FROM inventory_consumption
    WHERE inventory_item_id = $1
    ORDER BY timestamp DESC, created_at DESC
    LIMIT $2 OFFSET $3"#;

const USAGE_SESSIONS_SQL: &str = r#"SELECT DISTINCT s.id, s.rating, s.session_date
    FROM sessions s
    JOIN session_products p ON p.session_id = s.id
    WHERE p.inventory_item_id = $1 AND s.user_id = $2
    ORDER BY s.session_date, s.id"#;

const USAGE_EFFECTS_SQL: &str = r#"SELECT session_id, name FROM session_effects
    WHERE session_id = ANY($1)
    ORDER BY session_id, ordinal"#;

const USAGE_CONSUMPTION_SQL: &str =
    "SELECT amount_used, timestamp FROM inventory_consumption WHERE inventory_item_id = $1";

pub async fn create_item(
    db: &PgPool,
    user_id: &str,
    new_item: &NewInventoryItem,
) -> LedgerResult<InventoryItem> {
    let current = new_item.current_quantity.unwrap_or(new_item.initial_quantity);
    let row = sqlx::query_as::<_, InventoryItemRow>(INSERT_ITEM_SQL)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(new_item.name.trim())
        .bind(new_item.item_type.as_str())
        .bind(new_item.brand.as_deref())
        .bind(new_item.strain_name.as_deref())
        .bind(new_item.strain_type.map(|s| s.as_str()))
        .bind(new_item.strain_dominance)
        .bind(new_item.thc_content)
        .bind(new_item.cbd_content)
        .bind(new_item.initial_quantity)
        .bind(current)
        .bind(new_item.unit.as_deref().unwrap_or(DEFAULT_UNIT))
        .bind(new_item.purchase_date)
        .bind(new_item.price)
        .bind(new_item.notes.as_deref())
        .bind(new_item.is_favorite)
        .fetch_one(db)
        .await?;
    let item = InventoryItem::try_from(row)?;
    info!(item_id = %item.id, user_id, "inventory item created");
    Ok(item)
}

pub async fn get_item(db: &PgPool, user_id: &str, item_id: Uuid) -> LedgerResult<Option<InventoryItem>> {
    sqlx::query_as::<_, InventoryItemRow>(SELECT_ITEM_SQL)
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .map(InventoryItem::try_from)
        .transpose()
}

pub async fn update_item(
    db: &PgPool,
    user_id: &str,
    item_id: Uuid,
    update: &InventoryItemUpdate,
) -> LedgerResult<Option<InventoryItem>> {
    let row = sqlx::query_as::<_, InventoryItemRow>(UPDATE_ITEM_SQL)
        .bind(item_id)
        .bind(user_id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.item_type.map(|t| t.as_str()))
        .bind(update.brand.as_deref())
        .bind(update.strain_name.as_deref())
        .bind(update.strain_type.map(|s| s.as_str()))
        .bind(update.strain_dominance)
        .bind(update.thc_content)
        .bind(update.cbd_content)
        .bind(update.initial_quantity)
        .bind(update.current_quantity)
        .bind(update.unit.as_deref())
        .bind(update.purchase_date)
        .bind(update.price)
        .bind(update.notes.as_deref())
        .bind(update.is_favorite)
        .fetch_optional(db)
        .await?;
    row.map(InventoryItem::try_from).transpose()
}

/// Session links are nulled by the schema; consumption rows stay.
pub async fn delete_item(db: &PgPool, user_id: &str, item_id: Uuid) -> LedgerResult<bool> {
    let result = sqlx::query(DELETE_ITEM_SQL)
        .bind(item_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn item_exists(
    conn: &mut PgConnection,
    user_id: &str,
    item_id: Uuid,
) -> LedgerResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>(ITEM_EXISTS_SQL)
        .bind(item_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

/// Decrements the item and appends the matching ledger row on `conn`.
///
/// Callers own the transaction. Returns `None` when the item is missing or
/// belongs to another user, in which case nothing was written.
pub(crate) async fn consume_within(
    conn: &mut PgConnection,
    user_id: &str,
    item_id: Uuid,
    session_id: Option<Uuid>,
    amount_used: f64,
    timestamp: DateTime<Utc>,
) -> LedgerResult<Option<InventoryConsumption>> {
    let remaining = sqlx::query_scalar::<_, f64>(DECREMENT_SQL)
        .bind(amount_used)
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(remaining) = remaining else {
        return Ok(None);
    };
    let record = sqlx::query_as::<_, InventoryConsumption>(INSERT_CONSUMPTION_SQL)
        .bind(Uuid::new_v4())
        .bind(item_id)
        .bind(session_id)
        .bind(amount_used)
        .bind(remaining)
        .bind(timestamp)
        .fetch_one(&mut *conn)
        .await?;
    debug!(%item_id, amount_used, remaining, "consumption recorded");
    Ok(Some(record))
}

pub async fn record_consumption(
    db: &PgPool,
    user_id: &str,
    item_id: Uuid,
    request: &ConsumptionRequest,
) -> LedgerResult<Option<InventoryConsumption>> {
    validate_amount(request.amount_used)?;
    let mut tx = db.begin().await?;
    let record = consume_within(
        &mut tx,
        user_id,
        item_id,
        request.session_id,
        request.amount_used,
        request.timestamp.unwrap_or_else(Utc::now),
    )
    .await?;
    match record {
        Some(record) => {
            tx.commit().await?;
            Ok(Some(record))
        }
        None => {
            tx.rollback().await?;
            Ok(None)
        }
    }
}

/// Newest first. `None` when the item is not visible to `user_id`.
pub async fn consumption_history(
    db: &PgPool,
    user_id: &str,
    item_id: Uuid,
    page: Pagination,
) -> LedgerResult<Option<Vec<InventoryConsumption>>> {
    let mut conn = db.acquire().await?;
    if !item_exists(&mut conn, user_id, item_id).await? {
        return Ok(None);
    }
    let records = sqlx::query_as::<_, InventoryConsumption>(CONSUMPTION_HISTORY_SQL)
        .bind(item_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&mut *conn)
        .await?;
    Ok(Some(records))
}

pub async fn compute_usage(
    db: &PgPool,
    user_id: &str,
    item_id: Uuid,
) -> LedgerResult<Option<UsageStats>> {
    let mut conn = db.acquire().await?;
    if !item_exists(&mut conn, user_id, item_id).await? {
        return Ok(None);
    }

    let session_rows = sqlx::query_as::<_, (Uuid, Option<i16>, DateTime<Utc>)>(USAGE_SESSIONS_SQL)
        .bind(item_id)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    let session_ids: Vec<Uuid> = session_rows.iter().map(|(id, _, _)| *id).collect();

    let mut effects_by_session: HashMap<Uuid, Vec<String>> = HashMap::new();
    if !session_ids.is_empty() {
        let effect_rows = sqlx::query_as::<_, (Uuid, String)>(USAGE_EFFECTS_SQL)
            .bind(session_ids.as_slice())
            .fetch_all(&mut *conn)
            .await?;
        for (session_id, name) in effect_rows {
            effects_by_session.entry(session_id).or_default().push(name);
        }
    }

    let sessions: Vec<SessionUsage> = session_rows
        .into_iter()
        .map(|(session_id, rating, _)| SessionUsage {
            session_id,
            rating,
            effects: effects_by_session.remove(&session_id).unwrap_or_default(),
        })
        .collect();

    let consumption: Vec<ConsumptionPoint> =
        sqlx::query_as::<_, (f64, DateTime<Utc>)>(USAGE_CONSUMPTION_SQL)
            .bind(item_id)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(|(amount_used, timestamp)| ConsumptionPoint { amount_used, timestamp })
            .collect();

    Ok(Some(UsageStats::compute(&sessions, &consumption)))
}

/// `%`, `_` and `\` are literal in user search text.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for ch in search.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn push_inventory_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: &str, filter: &InventoryFilter) {
    qb.push(" WHERE user_id = ").push_bind(user_id.to_string());

    if !filter.types.is_empty() {
        let types: Vec<String> = filter.types.iter().map(|t| t.as_str().to_string()).collect();
        qb.push(" AND item_type = ANY(").push_bind(types).push(")");
    }
    if !filter.strain_types.is_empty() {
        let strains: Vec<String> = filter
            .strain_types
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        qb.push(" AND strain_type = ANY(").push_bind(strains).push(")");
    }
    match filter.in_stock {
        Some(true) => {
            qb.push(" AND current_quantity > 0");
        }
        Some(false) => {
            qb.push(" AND current_quantity <= 0");
        }
        None => {}
    }
    if let Some(low) = filter.low_stock {
        qb.push(if low { " AND " } else { " AND NOT " })
            .push("(current_quantity > 0 AND current_quantity <= initial_quantity * ")
            .push_bind(LOW_STOCK_RATIO)
            .push(")");
    }
    if let Some(favorite) = filter.favorite {
        qb.push(" AND is_favorite = ").push_bind(favorite);
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR strain_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR brand ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// One page of summaries plus the total number of matching items.
pub async fn list_summaries(
    db: &PgPool,
    user_id: &str,
    filter: &InventoryFilter,
) -> LedgerResult<(Vec<InventorySummary>, i64)> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM inventory_items");
    push_inventory_filters(&mut count, user_id, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;

    let mut select = QueryBuilder::<Postgres>::new(
        "SELECT id, name, item_type, strain_type, current_quantity, initial_quantity, unit, \
         thc_content, cbd_content, is_favorite FROM inventory_items",
    );
    push_inventory_filters(&mut select, user_id, filter);
    // sort column and direction come from closed enums, never from raw input
    select
        .push(" ORDER BY ")
        .push(filter.sort.column())
        .push(" ")
        .push(filter.direction.as_sql())
        .push(" NULLS LAST, id LIMIT ")
        .push_bind(filter.pagination.limit)
        .push(" OFFSET ")
        .push_bind(filter.pagination.offset);

    let summaries = select
        .build_query_as::<InventorySummaryRow>()
        .fetch_all(db)
        .await?
        .into_iter()
        .map(InventorySummary::try_from)
        .collect::<LedgerResult<Vec<_>>>()?;
    Ok((summaries, total))
}
