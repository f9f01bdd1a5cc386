//! Quantity arithmetic and derived usage statistics for inventory items.
//!
//! Everything here is pure; persistence lives in [`crate::store`], which
//! runs the same decrement rule as a single SQL statement.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use common_http_errors::ApiError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Fraction of the initial quantity at or below which stock counts as low.
pub const LOW_STOCK_RATIO: f64 = 0.2;
pub const MOST_COMMON_EFFECTS_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Validation { field, message: message.into() }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation { .. } => ApiError::bad_request("validation_error", err.to_string()),
            LedgerError::DataIntegrity(_) => ApiError::internal(err),
            LedgerError::Store(e) => {
                tracing::error!(error = %e, "backing store failure");
                ApiError::unavailable("store_unavailable", "Backing store unavailable")
            }
        }
    }
}

pub fn validate_amount(amount_used: f64) -> LedgerResult<()> {
    if !amount_used.is_finite() {
        return Err(LedgerError::validation("amountUsed", "must be a finite number"));
    }
    if amount_used < 0.0 {
        return Err(LedgerError::validation("amountUsed", "must not be negative"));
    }
    Ok(())
}

/// `max(0, current - amount)`; mirrors the SQL decrement.
pub fn quantity_after_consumption(current_quantity: f64, amount_used: f64) -> f64 {
    (current_quantity - amount_used).max(0.0)
}

pub fn is_low_stock(current_quantity: f64, initial_quantity: f64) -> bool {
    current_quantity > 0.0 && current_quantity <= initial_quantity * LOW_STOCK_RATIO
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StockState {
    Stocked,
    LowStock,
    Depleted,
}

impl StockState {
    pub fn classify(current_quantity: f64, initial_quantity: f64) -> Self {
        if current_quantity <= 0.0 {
            StockState::Depleted
        } else if is_low_stock(current_quantity, initial_quantity) {
            StockState::LowStock
        } else {
            StockState::Stocked
        }
    }
}

/// A session that references the item through one of its products.
#[derive(Debug, Clone)]
pub struct SessionUsage {
    pub session_id: Uuid,
    pub rating: Option<i16>,
    /// Effect names in the order they were logged.
    pub effects: Vec<String>,
}

/// One consumption event reduced to what the statistics need.
#[derive(Debug, Clone, Copy)]
pub struct ConsumptionPoint {
    pub amount_used: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub sessions_used_in: BTreeSet<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    /// Units per week.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumption_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_common_effects: Option<Vec<String>>,
}

impl UsageStats {
    pub fn compute(sessions: &[SessionUsage], consumption: &[ConsumptionPoint]) -> Self {
        let sessions_used_in: BTreeSet<Uuid> = sessions.iter().map(|s| s.session_id).collect();

        let first_used = consumption.iter().map(|c| c.timestamp).min();
        let last_used = consumption.iter().map(|c| c.timestamp).max();

        let consumption_rate = match (first_used, last_used) {
            (Some(first), Some(last)) if !sessions_used_in.is_empty() => {
                let total_used: f64 = consumption.iter().map(|c| c.amount_used).sum();
                Some(total_used / weeks_between(first, last))
            }
            _ => None,
        };

        // a session linking the item through two products still counts once
        let mut seen = BTreeSet::new();
        let distinct: Vec<&SessionUsage> = sessions
            .iter()
            .filter(|s| seen.insert(s.session_id))
            .collect();

        let ratings: Vec<f64> = distinct.iter().filter_map(|s| s.rating).map(f64::from).collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };

        let effects = most_common_effects(distinct.iter().flat_map(|s| s.effects.iter()));

        UsageStats {
            sessions_used_in,
            last_used,
            consumption_rate,
            average_rating,
            most_common_effects: if effects.is_empty() { None } else { Some(effects) },
        }
    }
}

/// Elapsed weeks, never less than one.
pub fn weeks_between(first: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    let elapsed_ms = (last - first).num_milliseconds().max(0) as f64;
    let week_ms = Duration::weeks(1).num_milliseconds() as f64;
    (elapsed_ms / week_ms).max(1.0)
}

/// Top names by count; ties keep first-encountered order.
pub fn most_common_effects<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut order: Vec<&'a String> = Vec::new();
    let mut counts: HashMap<&'a String, usize> = HashMap::new();
    for name in names {
        let count = counts.entry(name).or_insert(0);
        if *count == 0 {
            order.push(name);
        }
        *count += 1;
    }
    // sort_by is stable
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order
        .into_iter()
        .take(MOST_COMMON_EFFECTS_LIMIT)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn session(rating: Option<i16>, effects: &[&str]) -> SessionUsage {
        SessionUsage {
            session_id: Uuid::new_v4(),
            rating,
            effects: effects.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn low_stock_boundary() {
        assert!(is_low_stock(2.0, 10.0));
        assert!(!is_low_stock(2.000001, 10.0));
        assert!(!is_low_stock(0.0, 10.0));
        assert_eq!(StockState::classify(0.0, 10.0), StockState::Depleted);
        assert_eq!(StockState::classify(5.0, 10.0), StockState::Stocked);
    }

    #[test]
    fn consume_nine_then_two_clamps_at_zero() {
        let after_first = quantity_after_consumption(10.0, 9.0);
        assert_eq!(after_first, 1.0);
        assert!(is_low_stock(after_first, 10.0));

        let after_second = quantity_after_consumption(after_first, 2.0);
        assert_eq!(after_second, 0.0);
        assert!(!is_low_stock(after_second, 10.0));
    }

    #[test]
    fn amount_validation() {
        assert!(validate_amount(0.0).is_ok());
        assert!(validate_amount(3.5).is_ok());
        assert!(matches!(
            validate_amount(-0.1),
            Err(LedgerError::Validation { field: "amountUsed", .. })
        ));
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
    }

    #[test]
    fn same_day_usage_uses_one_week_window() {
        let sessions = vec![session(None, &[])];
        let consumption = vec![
            ConsumptionPoint { amount_used: 1.5, timestamp: at(10, 9) },
            ConsumptionPoint { amount_used: 2.5, timestamp: at(10, 21) },
        ];
        let stats = UsageStats::compute(&sessions, &consumption);
        assert_eq!(stats.consumption_rate, Some(4.0));
        assert_eq!(stats.last_used, Some(at(10, 21)));
    }

    #[test]
    fn rate_spans_elapsed_weeks() {
        let sessions = vec![session(None, &[])];
        let consumption = vec![
            ConsumptionPoint { amount_used: 3.0, timestamp: at(1, 0) },
            ConsumptionPoint { amount_used: 3.0, timestamp: at(15, 0) },
        ];
        let stats = UsageStats::compute(&sessions, &consumption);
        assert_eq!(stats.consumption_rate, Some(3.0));
    }

    #[test]
    fn rate_requires_linked_session() {
        let consumption = vec![ConsumptionPoint { amount_used: 1.0, timestamp: at(1, 0) }];
        let stats = UsageStats::compute(&[], &consumption);
        assert!(stats.consumption_rate.is_none());
        assert_eq!(stats.last_used, Some(at(1, 0)));
        assert!(stats.sessions_used_in.is_empty());
    }

    #[test]
    fn average_rating_skips_unrated_sessions() {
        let sessions = vec![session(Some(8), &[]), session(None, &[]), session(Some(5), &[])];
        let stats = UsageStats::compute(&sessions, &[]);
        assert_eq!(stats.average_rating, Some(6.5));
        assert_eq!(stats.sessions_used_in.len(), 3);
        assert!(stats.consumption_rate.is_none());
    }

    #[test]
    fn duplicate_session_links_count_once() {
        let shared = session(Some(4), &["relaxed"]);
        let sessions = vec![shared.clone(), shared, session(Some(10), &["happy"])];
        let stats = UsageStats::compute(&sessions, &[]);
        assert_eq!(stats.sessions_used_in.len(), 2);
        assert_eq!(stats.average_rating, Some(7.0));
        assert_eq!(
            stats.most_common_effects,
            Some(vec!["relaxed".to_string(), "happy".to_string()])
        );
    }

    #[test]
    fn top_effects_are_stable_and_capped() {
        let sessions = vec![
            session(None, &["dry mouth", "relaxed", "happy"]),
            session(None, &["sleepy", "relaxed", "focused"]),
            session(None, &["creative", "happy", "hungry"]),
        ];
        let stats = UsageStats::compute(&sessions, &[]);
        assert_eq!(
            stats.most_common_effects,
            Some(vec![
                "relaxed".to_string(),
                "happy".to_string(),
                "dry mouth".to_string(),
                "sleepy".to_string(),
                "focused".to_string(),
            ])
        );
    }

    #[test]
    fn empty_fields_are_omitted_from_json() {
        let stats = UsageStats::compute(&[], &[]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json, serde_json::json!({ "sessionsUsedIn": [] }));
    }

    #[test]
    fn ledger_errors_map_to_api_errors() {
        let api: ApiError = LedgerError::validation("name", "must not be empty").into();
        assert_eq!(api.code(), "validation_error");
        assert_eq!(api.to_string(), "name: must not be empty");

        let api: ApiError = LedgerError::Store(sqlx::Error::PoolTimedOut).into();
        assert_eq!(api.code(), "store_unavailable");

        let api: ApiError = LedgerError::DataIntegrity("bad row".into()).into();
        assert_eq!(api.code(), "internal_error");
    }
}
