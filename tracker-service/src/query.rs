//! List query parameters: pagination, sorting and inventory filters.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ledger::{LedgerError, LedgerResult};
use crate::model::{InventoryType, StrainType};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Pagination {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn parse(raw: Option<&str>, default: SortDirection) -> LedgerResult<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") => Ok(default),
            Some("asc") => Ok(SortDirection::Asc),
            Some("desc") => Ok(SortDirection::Desc),
            Some(other) => Err(LedgerError::validation(
                "order",
                format!("'{other}' is not one of asc, desc"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventorySort {
    Name,
    PurchaseDate,
    CurrentQuantity,
    ThcContent,
}

impl InventorySort {
    pub fn column(&self) -> &'static str {
        match self {
            InventorySort::Name => "name",
            InventorySort::PurchaseDate => "purchase_date",
            InventorySort::CurrentQuantity => "current_quantity",
            InventorySort::ThcContent => "thc_content",
        }
    }

    fn parse(raw: &str) -> LedgerResult<Self> {
        match raw.trim() {
            "name" => Ok(InventorySort::Name),
            "purchaseDate" | "purchase_date" => Ok(InventorySort::PurchaseDate),
            "currentQuantity" | "current_quantity" => Ok(InventorySort::CurrentQuantity),
            "thcContent" | "thc_content" => Ok(InventorySort::ThcContent),
            other => Err(LedgerError::validation(
                "sort",
                format!("cannot sort inventory by '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSort {
    SessionDate,
    Rating,
    CreatedAt,
}

impl SessionSort {
    pub fn column(&self) -> &'static str {
        match self {
            SessionSort::SessionDate => "session_date",
            SessionSort::Rating => "rating",
            SessionSort::CreatedAt => "created_at",
        }
    }

    fn parse(raw: &str) -> LedgerResult<Self> {
        match raw.trim() {
            "sessionDate" | "session_date" | "date" => Ok(SessionSort::SessionDate),
            "rating" => Ok(SessionSort::Rating),
            "createdAt" | "created_at" => Ok(SessionSort::CreatedAt),
            other => Err(LedgerError::validation(
                "sort",
                format!("cannot sort sessions by '{other}'"),
            )),
        }
    }
}

/// Raw `GET /inventory` query string. Sets are comma separated.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryListParams {
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub strain_type: Option<String>,
    pub in_stock: Option<bool>,
    pub low_stock: Option<bool>,
    pub favorite: Option<bool>,
    pub search: Option<String>,
    #[serde(alias = "sortBy")]
    pub sort: Option<String>,
    #[serde(alias = "sortDirection")]
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryFilter {
    pub types: Vec<InventoryType>,
    pub strain_types: Vec<StrainType>,
    pub in_stock: Option<bool>,
    pub low_stock: Option<bool>,
    pub favorite: Option<bool>,
    pub search: Option<String>,
    pub sort: InventorySort,
    pub direction: SortDirection,
    pub pagination: Pagination,
}

impl Default for InventoryFilter {
    fn default() -> Self {
        InventoryFilter {
            types: Vec::new(),
            strain_types: Vec::new(),
            in_stock: None,
            low_stock: None,
            favorite: None,
            search: None,
            sort: InventorySort::Name,
            direction: SortDirection::Asc,
            pagination: Pagination::default(),
        }
    }
}

fn parse_set<T>(field: &'static str, raw: Option<&str>) -> LedgerResult<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<T>().map_err(|e| LedgerError::validation(field, e.to_string())))
        .collect()
}

impl TryFrom<InventoryListParams> for InventoryFilter {
    type Error = LedgerError;

    fn try_from(params: InventoryListParams) -> LedgerResult<Self> {
        let search = params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let sort = match params.sort.as_deref().map(str::trim) {
            None | Some("") => InventorySort::Name,
            Some(raw) => InventorySort::parse(raw)?,
        };
        Ok(InventoryFilter {
            types: parse_set("type", params.item_type.as_deref())?,
            strain_types: parse_set("strainType", params.strain_type.as_deref())?,
            in_stock: params.in_stock,
            low_stock: params.low_stock,
            favorite: params.favorite,
            search,
            sort,
            direction: SortDirection::parse(params.order.as_deref(), SortDirection::Asc)?,
            pagination: Pagination::new(params.limit, params.offset),
        })
    }
}

/// Raw `GET /sessions` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(alias = "sortBy")]
    pub sort: Option<String>,
    #[serde(alias = "sortDirection")]
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort: SessionSort,
    pub direction: SortDirection,
    pub pagination: Pagination,
}

impl Default for SessionFilter {
    fn default() -> Self {
        SessionFilter {
            from: None,
            to: None,
            sort: SessionSort::SessionDate,
            direction: SortDirection::Desc,
            pagination: Pagination::default(),
        }
    }
}

impl TryFrom<SessionListParams> for SessionFilter {
    type Error = LedgerError;

    fn try_from(params: SessionListParams) -> LedgerResult<Self> {
        if let (Some(from), Some(to)) = (params.from, params.to) {
            if from > to {
                return Err(LedgerError::validation("from", "must not be after 'to'"));
            }
        }
        let sort = match params.sort.as_deref().map(str::trim) {
            None | Some("") => SessionSort::SessionDate,
            Some(raw) => SessionSort::parse(raw)?,
        };
        Ok(SessionFilter {
            from: params.from,
            to: params.to,
            sort,
            direction: SortDirection::parse(params.order.as_deref(), SortDirection::Desc)?,
            pagination: Pagination::new(params.limit, params.offset),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<PageParams> for Pagination {
    fn from(params: PageParams) -> Self {
        Pagination::new(params.limit, params.offset)
    }
}
