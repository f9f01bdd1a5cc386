use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::{is_low_stock, LedgerError, LedgerResult, StockState};

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(trimmed))
                    .ok_or_else(|| ParseEnumError { kind: $kind, value: trimmed.to_string() })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryType {
    Flower,
    #[serde(rename = "Pre-roll")]
    PreRoll,
    Vape,
    Concentrate,
    Edible,
    Tincture,
    Topical,
    Accessory,
}

string_enum!(InventoryType, "inventory type", {
    Flower => "Flower",
    PreRoll => "Pre-roll",
    Vape => "Vape",
    Concentrate => "Concentrate",
    Edible => "Edible",
    Tincture => "Tincture",
    Topical => "Topical",
    Accessory => "Accessory",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrainType {
    Sativa,
    Indica,
    Hybrid,
    #[serde(rename = "CBD")]
    Cbd,
}

string_enum!(StrainType, "strain type", {
    Sativa => "Sativa",
    Indica => "Indica",
    Hybrid => "Hybrid",
    Cbd => "CBD",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectCategory {
    Positive,
    Negative,
    Medical,
}

string_enum!(EffectCategory, "effect category", {
    Positive => "positive",
    Negative => "negative",
    Medical => "medical",
});

fn parse_column<T>(column: &'static str, raw: &str) -> LedgerResult<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse::<T>()
        .map_err(|err| LedgerError::DataIntegrity(format!("column {column}: {err}")))
}

fn parse_optional_column<T>(column: &'static str, raw: Option<&str>) -> LedgerResult<Option<T>>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.map(|value| parse_column(column, value)).transpose()
}

// ---------------- Inventory ----------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: InventoryType,
    pub brand: Option<String>,
    pub strain_name: Option<String>,
    pub strain_type: Option<StrainType>,
    pub strain_dominance: Option<i16>,
    pub thc_content: Option<f64>,
    pub cbd_content: Option<f64>,
    pub initial_quantity: f64,
    pub current_quantity: f64,
    pub unit: String,
    pub purchase_date: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub notes: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn low_stock(&self) -> bool {
        is_low_stock(self.current_quantity, self.initial_quantity)
    }

    pub fn stock_state(&self) -> StockState {
        StockState::classify(self.current_quantity, self.initial_quantity)
    }
}

/// Raw `inventory_items` row; enum columns are still text.
#[derive(Debug, sqlx::FromRow)]
pub struct InventoryItemRow {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub item_type: String,
    pub brand: Option<String>,
    pub strain_name: Option<String>,
    pub strain_type: Option<String>,
    pub strain_dominance: Option<i16>,
    pub thc_content: Option<f64>,
    pub cbd_content: Option<f64>,
    pub initial_quantity: f64,
    pub current_quantity: f64,
    pub unit: String,
    pub purchase_date: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub notes: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<InventoryItemRow> for InventoryItem {
    type Error = LedgerError;

    fn try_from(row: InventoryItemRow) -> LedgerResult<Self> {
        check_quantity("initial_quantity", row.initial_quantity)?;
        check_quantity("current_quantity", row.current_quantity)?;
        if let Some(dominance) = row.strain_dominance {
            if !(-10..=10).contains(&dominance) {
                return Err(LedgerError::DataIntegrity(format!(
                    "column strain_dominance: {dominance} outside -10..=10"
                )));
            }
        }
        Ok(InventoryItem {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            item_type: parse_column("item_type", &row.item_type)?,
            brand: row.brand,
            strain_name: row.strain_name,
            strain_type: parse_optional_column("strain_type", row.strain_type.as_deref())?,
            strain_dominance: row.strain_dominance,
            thc_content: row.thc_content,
            cbd_content: row.cbd_content,
            initial_quantity: row.initial_quantity,
            current_quantity: row.current_quantity,
            unit: row.unit,
            purchase_date: row.purchase_date,
            price: row.price,
            notes: row.notes,
            is_favorite: row.is_favorite,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn check_quantity(column: &'static str, value: f64) -> LedgerResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LedgerError::DataIntegrity(format!(
            "column {column}: {value} is not a non-negative quantity"
        )))
    }
}

/// Lightweight projection used by list views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: InventoryType,
    pub strain_type: Option<StrainType>,
    pub current_quantity: f64,
    pub unit: String,
    pub thc_content: Option<f64>,
    pub cbd_content: Option<f64>,
    pub is_favorite: bool,
    pub low_stock: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct InventorySummaryRow {
    pub id: Uuid,
    pub name: String,
    pub item_type: String,
    pub strain_type: Option<String>,
    pub current_quantity: f64,
    pub initial_quantity: f64,
    pub unit: String,
    pub thc_content: Option<f64>,
    pub cbd_content: Option<f64>,
    pub is_favorite: bool,
}

impl TryFrom<InventorySummaryRow> for InventorySummary {
    type Error = LedgerError;

    fn try_from(row: InventorySummaryRow) -> LedgerResult<Self> {
        check_quantity("current_quantity", row.current_quantity)?;
        Ok(InventorySummary {
            id: row.id,
            name: row.name,
            item_type: parse_column("item_type", &row.item_type)?,
            strain_type: parse_optional_column("strain_type", row.strain_type.as_deref())?,
            low_stock: is_low_stock(row.current_quantity, row.initial_quantity),
            current_quantity: row.current_quantity,
            unit: row.unit,
            thc_content: row.thc_content,
            cbd_content: row.cbd_content,
            is_favorite: row.is_favorite,
        })
    }
}

/// Immutable record of inventory used, optionally within a session.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InventoryConsumption {
    pub id: Uuid,
    pub inventory_item_id: Uuid,
    pub session_id: Option<Uuid>,
    pub amount_used: f64,
    pub remaining_amount: f64,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInventoryItem {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: InventoryType,
    pub brand: Option<String>,
    pub strain_name: Option<String>,
    pub strain_type: Option<StrainType>,
    pub strain_dominance: Option<i16>,
    pub thc_content: Option<f64>,
    pub cbd_content: Option<f64>,
    pub initial_quantity: f64,
    /// Defaults to `initial_quantity`.
    pub current_quantity: Option<f64>,
    pub unit: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

/// Partial edit. Absent fields keep their stored value; restocking is a plain edit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemUpdate {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<InventoryType>,
    pub brand: Option<String>,
    pub strain_name: Option<String>,
    pub strain_type: Option<StrainType>,
    pub strain_dominance: Option<i16>,
    pub thc_content: Option<f64>,
    pub cbd_content: Option<f64>,
    pub initial_quantity: Option<f64>,
    pub current_quantity: Option<f64>,
    pub unit: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub notes: Option<String>,
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionRequest {
    pub amount_used: f64,
    pub session_id: Option<Uuid>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------- Sessions ----------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub session_date: DateTime<Utc>,
    pub method: String,
    pub location: Option<String>,
    pub duration_minutes: Option<i32>,
    pub rating: Option<i16>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub products: Vec<SessionProduct>,
    pub effects: Vec<SessionEffect>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: String,
    pub session_date: DateTime<Utc>,
    pub method: String,
    pub location: Option<String>,
    pub duration_minutes: Option<i32>,
    pub rating: Option<i16>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRow {
    pub fn into_session(
        self,
        products: Vec<SessionProduct>,
        effects: Vec<SessionEffect>,
    ) -> LedgerResult<Session> {
        if let Some(rating) = self.rating {
            if !(1..=10).contains(&rating) {
                return Err(LedgerError::DataIntegrity(format!(
                    "column rating: {rating} outside 1..=10"
                )));
            }
        }
        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            session_date: self.session_date,
            method: self.method,
            location: self.location,
            duration_minutes: self.duration_minutes,
            rating: self.rating,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            products,
            effects,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProduct {
    pub id: Uuid,
    pub session_id: Uuid,
    pub inventory_item_id: Option<Uuid>,
    pub product_name: String,
    pub product_type: Option<InventoryType>,
    pub amount_used: Option<f64>,
    pub unit: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionProductRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub inventory_item_id: Option<Uuid>,
    pub product_name: String,
    pub product_type: Option<String>,
    pub amount_used: Option<f64>,
    pub unit: String,
}

impl TryFrom<SessionProductRow> for SessionProduct {
    type Error = LedgerError;

    fn try_from(row: SessionProductRow) -> LedgerResult<Self> {
        Ok(SessionProduct {
            id: row.id,
            session_id: row.session_id,
            inventory_item_id: row.inventory_item_id,
            product_name: row.product_name,
            product_type: parse_optional_column("product_type", row.product_type.as_deref())?,
            amount_used: row.amount_used,
            unit: row.unit,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEffect {
    pub id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub category: EffectCategory,
    pub intensity: i16,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionEffectRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub category: String,
    pub intensity: i16,
}

impl TryFrom<SessionEffectRow> for SessionEffect {
    type Error = LedgerError;

    fn try_from(row: SessionEffectRow) -> LedgerResult<Self> {
        if !(1..=10).contains(&row.intensity) {
            return Err(LedgerError::DataIntegrity(format!(
                "column intensity: {} outside 1..=10",
                row.intensity
            )));
        }
        Ok(SessionEffect {
            id: row.id,
            session_id: row.session_id,
            name: row.name,
            category: parse_column("category", &row.category)?,
            intensity: row.intensity,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    /// Defaults to the time of the request.
    pub session_date: Option<DateTime<Utc>>,
    pub method: String,
    pub location: Option<String>,
    pub duration_minutes: Option<i32>,
    pub rating: Option<i16>,
    pub notes: Option<String>,
    #[serde(default)]
    pub products: Vec<NewSessionProduct>,
    #[serde(default)]
    pub effects: Vec<NewSessionEffect>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionProduct {
    pub inventory_item_id: Option<Uuid>,
    pub product_name: String,
    pub product_type: Option<InventoryType>,
    pub amount_used: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionEffect {
    pub name: String,
    pub category: EffectCategory,
    pub intensity: i16,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub session_date: Option<DateTime<Utc>>,
    pub method: Option<String>,
    pub location: Option<String>,
    pub duration_minutes: Option<i32>,
    pub rating: Option<i16>,
    pub notes: Option<String>,
}
