//! Postgres persistence for consumption sessions, their products and effects.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use crate::ledger::LedgerResult;
use crate::model::{
    InventoryConsumption, NewSession, Session, SessionEffect, SessionEffectRow, SessionProduct,
    SessionProductRow, SessionRow, SessionUpdate,
};
use crate::query::SessionFilter;
use crate::store::{consume_within, item_exists, DEFAULT_UNIT};

const SESSION_COLUMNS: &str = "id, user_id, session_date, method, location, duration_minutes, \
     rating, notes, created_at, updated_at";

const INSERT_SESSION_SQL: &str = r#"INSERT INTO sessions
        (id, user_id, session_date, method, location, duration_minutes, rating, notes)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id, user_id, session_date, method, location, duration_minutes, rating, notes,
        created_at, updated_at"#;

const INSERT_PRODUCT_SQL: &str = r#"INSERT INTO session_products
        (id, session_id, inventory_item_id, product_name, product_type, amount_used, unit, ordinal)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id, session_id, inventory_item_id, product_name, product_type, amount_used, unit"#;

const INSERT_EFFECT_SQL: &str = r#"INSERT INTO session_effects
        (id, session_id, name, category, intensity, ordinal)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING id, session_id, name, category, intensity"#;

const SELECT_SESSION_SQL: &str = r#"SELECT id, user_id, session_date, method, location,
        duration_minutes, rating, notes, created_at, updated_at
    FROM sessions WHERE id = $1 AND user_id = $2"#;

const UPDATE_SESSION_SQL: &str = r#"UPDATE sessions SET
        session_date = COALESCE($3, session_date),
        method = COALESCE($4, method),
        location = COALESCE($5, location),
        duration_minutes = COALESCE($6, duration_minutes),
        rating = COALESCE($7, rating),
        notes = COALESCE($8, notes),
        updated_at = NOW()
    WHERE id = $1 AND user_id = $2
    RETURNING id, user_id, session_date, method, location, duration_minutes, rating, notes,
        created_at, updated_at"#;

const DELETE_SESSION_SQL: &str = "DELETE FROM sessions WHERE id = $1 AND user_id = $2";

const PRODUCTS_FOR_SQL: &str = r#"SELECT id, session_id, inventory_item_id, product_name,
        product_type, amount_used, unit
    FROM session_products WHERE session_id = ANY($1)
    ORDER BY session_id, ordinal"#;

const EFFECTS_FOR_SQL: &str = r#"SELECT id, session_id, name, category, intensity
    FROM session_effects WHERE session_id = ANY($1)
    ORDER BY session_id, ordinal"#;

#[derive(Debug)]
pub enum CreateSessionOutcome {
    Created {
        session: Session,
        consumption: Vec<InventoryConsumption>,
    },
    /// A product linked an item the user does not own; nothing was written.
    UnknownInventoryItem(Uuid),
}

/// Inserts the session with its products and effects in one transaction.
///
/// Linked products with a positive amount are consumed from inventory at the
/// session date inside the same transaction.
pub async fn create_session(
    db: &PgPool,
    user_id: &str,
    new_session: &NewSession,
) -> LedgerResult<CreateSessionOutcome> {
    let session_id = Uuid::new_v4();
    let session_date = new_session.session_date.unwrap_or_else(Utc::now);
    let mut tx = db.begin().await?;

    for item_id in new_session.products.iter().filter_map(|p| p.inventory_item_id) {
        if !item_exists(&mut tx, user_id, item_id).await? {
            tx.rollback().await?;
            return Ok(CreateSessionOutcome::UnknownInventoryItem(item_id));
        }
    }

    let row = sqlx::query_as::<_, SessionRow>(INSERT_SESSION_SQL)
        .bind(session_id)
        .bind(user_id)
        .bind(session_date)
        .bind(new_session.method.trim())
        .bind(new_session.location.as_deref())
        .bind(new_session.duration_minutes)
        .bind(new_session.rating)
        .bind(new_session.notes.as_deref())
        .fetch_one(&mut *tx)
        .await?;

    let mut products = Vec::with_capacity(new_session.products.len());
    let mut consumption = Vec::new();
    for (ordinal, product) in new_session.products.iter().enumerate() {
        let product_row = sqlx::query_as::<_, SessionProductRow>(INSERT_PRODUCT_SQL)
            .bind(Uuid::new_v4())
            .bind(session_id)
            .bind(product.inventory_item_id)
            .bind(product.product_name.trim())
            .bind(product.product_type.map(|t| t.as_str()))
            .bind(product.amount_used)
            .bind(product.unit.as_deref().unwrap_or(DEFAULT_UNIT))
            .bind(ordinal as i32)
            .fetch_one(&mut *tx)
            .await?;
        products.push(SessionProduct::try_from(product_row)?);

        let (Some(item_id), Some(amount)) = (product.inventory_item_id, product.amount_used) else {
            continue;
        };
        if amount <= 0.0 {
            continue;
        }
        match consume_within(&mut tx, user_id, item_id, Some(session_id), amount, session_date).await? {
            Some(record) => consumption.push(record),
            None => {
                tx.rollback().await?;
                return Ok(CreateSessionOutcome::UnknownInventoryItem(item_id));
            }
        }
    }

    let mut effects = Vec::with_capacity(new_session.effects.len());
    for (ordinal, effect) in new_session.effects.iter().enumerate() {
        let effect_row = sqlx::query_as::<_, SessionEffectRow>(INSERT_EFFECT_SQL)
            .bind(Uuid::new_v4())
            .bind(session_id)
            .bind(effect.name.trim())
            .bind(effect.category.as_str())
            .bind(effect.intensity)
            .bind(ordinal as i32)
            .fetch_one(&mut *tx)
            .await?;
        effects.push(SessionEffect::try_from(effect_row)?);
    }

    let session = row.into_session(products, effects)?;
    tx.commit().await?;
    info!(
        %session_id,
        user_id,
        consumed = consumption.len(),
        "session created"
    );
    Ok(CreateSessionOutcome::Created { session, consumption })
}

type Children = (
    HashMap<Uuid, Vec<SessionProduct>>,
    HashMap<Uuid, Vec<SessionEffect>>,
);

async fn load_children(conn: &mut PgConnection, session_ids: &[Uuid]) -> LedgerResult<Children> {
    let mut products: HashMap<Uuid, Vec<SessionProduct>> = HashMap::new();
    let mut effects: HashMap<Uuid, Vec<SessionEffect>> = HashMap::new();
    if session_ids.is_empty() {
        return Ok((products, effects));
    }

    let product_rows = sqlx::query_as::<_, SessionProductRow>(PRODUCTS_FOR_SQL)
        .bind(session_ids)
        .fetch_all(&mut *conn)
        .await?;
    for row in product_rows {
        let product = SessionProduct::try_from(row)?;
        products.entry(product.session_id).or_default().push(product);
    }

    let effect_rows = sqlx::query_as::<_, SessionEffectRow>(EFFECTS_FOR_SQL)
        .bind(session_ids)
        .fetch_all(&mut *conn)
        .await?;
    for row in effect_rows {
        let effect = SessionEffect::try_from(row)?;
        effects.entry(effect.session_id).or_default().push(effect);
    }
    Ok((products, effects))
}

async fn assemble(conn: &mut PgConnection, rows: Vec<SessionRow>) -> LedgerResult<Vec<Session>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let (mut products, mut effects) = load_children(conn, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let id = row.id;
            row.into_session(
                products.remove(&id).unwrap_or_default(),
                effects.remove(&id).unwrap_or_default(),
            )
        })
        .collect()
}

pub async fn get_session(db: &PgPool, user_id: &str, session_id: Uuid) -> LedgerResult<Option<Session>> {
    let mut conn = db.acquire().await?;
    let row = sqlx::query_as::<_, SessionRow>(SELECT_SESSION_SQL)
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(assemble(&mut conn, vec![row]).await?.pop())
}

fn push_session_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: &str, filter: &SessionFilter) {
    qb.push(" WHERE user_id = ").push_bind(user_id.to_string());
    if let Some(from) = filter.from {
        qb.push(" AND session_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND session_date <= ").push_bind(to);
    }
}

/// One page of sessions plus the total number matching the date range.
pub async fn list_sessions(
    db: &PgPool,
    user_id: &str,
    filter: &SessionFilter,
) -> LedgerResult<(Vec<Session>, i64)> {
    let mut conn = db.acquire().await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sessions");
    push_session_filters(&mut count, user_id, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {SESSION_COLUMNS} FROM sessions"));
    push_session_filters(&mut select, user_id, filter);
    select
        .push(" ORDER BY ")
        .push(filter.sort.column())
        .push(" ")
        .push(filter.direction.as_sql())
        .push(" NULLS LAST, id LIMIT ")
        .push_bind(filter.pagination.limit)
        .push(" OFFSET ")
        .push_bind(filter.pagination.offset);
    let rows = select
        .build_query_as::<SessionRow>()
        .fetch_all(&mut *conn)
        .await?;

    let sessions = assemble(&mut conn, rows).await?;
    Ok((sessions, total))
}

/// Updates scalar fields only; products and effects are immutable once logged.
pub async fn update_session(
    db: &PgPool,
    user_id: &str,
    session_id: Uuid,
    update: &SessionUpdate,
) -> LedgerResult<Option<Session>> {
    let mut conn = db.acquire().await?;
    let row = sqlx::query_as::<_, SessionRow>(UPDATE_SESSION_SQL)
        .bind(session_id)
        .bind(user_id)
        .bind(update.session_date)
        .bind(update.method.as_deref().map(str::trim))
        .bind(update.location.as_deref())
        .bind(update.duration_minutes)
        .bind(update.rating)
        .bind(update.notes.as_deref())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(assemble(&mut conn, vec![row]).await?.pop())
}

/// Products and effects cascade. Consumption rows and item quantities are untouched.
pub async fn delete_session(db: &PgPool, user_id: &str, session_id: Uuid) -> LedgerResult<bool> {
    let result = sqlx::query(DELETE_SESSION_SQL)
        .bind(session_id)
        .bind(user_id)
        .execute(db)
        .await?;
    if result.rows_affected() > 0 {
        info!(%session_id, user_id, "session deleted");
    }
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Pagination, SessionSort, SortDirection};
    use chrono::TimeZone;

    #[test]
    fn date_range_filters_are_bound() {
        let filter = SessionFilter {
            from: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
            sort: SessionSort::Rating,
            direction: SortDirection::Asc,
            pagination: Pagination::default(),
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM sessions");
        push_session_filters(&mut qb, "user-1", &filter);
        assert_eq!(
            qb.sql(),
            "SELECT id FROM sessions WHERE user_id = $1 AND session_date >= $2 AND session_date <= $3"
        );
    }

    #[test]
    fn update_leaves_children_alone() {
        assert!(!UPDATE_SESSION_SQL.contains("session_products"));
        assert!(!UPDATE_SESSION_SQL.contains("session_effects"));
    }
}
