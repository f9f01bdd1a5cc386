//! Input checks run by handlers before any store interaction.

use crate::ledger::{validate_amount, LedgerError, LedgerResult};
use crate::model::{
    ConsumptionRequest, InventoryItemUpdate, NewInventoryItem, NewSession, NewSessionEffect,
    NewSessionProduct, SessionUpdate,
};

fn require_text(field: &'static str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        Err(LedgerError::validation(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn quantity(field: &'static str, value: f64) -> LedgerResult<()> {
    if !value.is_finite() {
        return Err(LedgerError::validation(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(LedgerError::validation(field, "must not be negative"));
    }
    Ok(())
}

fn percentage(field: &'static str, value: Option<f64>) -> LedgerResult<()> {
    match value {
        Some(v) if !(0.0..=100.0).contains(&v) => {
            Err(LedgerError::validation(field, "must be between 0 and 100"))
        }
        _ => Ok(()),
    }
}

fn bounded<T>(field: &'static str, value: Option<T>, min: T, max: T) -> LedgerResult<()>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    match value {
        Some(v) if v < min || v > max => Err(LedgerError::validation(
            field,
            format!("must be between {min} and {max}"),
        )),
        _ => Ok(()),
    }
}

fn price(value: Option<f64>) -> LedgerResult<()> {
    match value {
        Some(v) => quantity("price", v),
        None => Ok(()),
    }
}

impl NewInventoryItem {
    pub fn validate(&self) -> LedgerResult<()> {
        require_text("name", &self.name)?;
        quantity("initialQuantity", self.initial_quantity)?;
        if let Some(current) = self.current_quantity {
            quantity("currentQuantity", current)?;
        }
        if let Some(unit) = &self.unit {
            require_text("unit", unit)?;
        }
        bounded("strainDominance", self.strain_dominance, -10, 10)?;
        percentage("thcContent", self.thc_content)?;
        percentage("cbdContent", self.cbd_content)?;
        price(self.price)
    }
}

impl InventoryItemUpdate {
    pub fn validate(&self) -> LedgerResult<()> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(initial) = self.initial_quantity {
            quantity("initialQuantity", initial)?;
        }
        // over-fill above initialQuantity is allowed
        if let Some(current) = self.current_quantity {
            quantity("currentQuantity", current)?;
        }
        if let Some(unit) = &self.unit {
            require_text("unit", unit)?;
        }
        bounded("strainDominance", self.strain_dominance, -10, 10)?;
        percentage("thcContent", self.thc_content)?;
        percentage("cbdContent", self.cbd_content)?;
        price(self.price)
    }
}

impl ConsumptionRequest {
    pub fn validate(&self) -> LedgerResult<()> {
        validate_amount(self.amount_used)
    }
}

impl NewSessionProduct {
    pub fn validate(&self) -> LedgerResult<()> {
        require_text("productName", &self.product_name)?;
        if let Some(amount) = self.amount_used {
            quantity("amountUsed", amount)?;
        }
        Ok(())
    }
}

impl NewSessionEffect {
    pub fn validate(&self) -> LedgerResult<()> {
        require_text("effectName", &self.name)?;
        bounded("intensity", Some(self.intensity), 1, 10)
    }
}

impl NewSession {
    pub fn validate(&self) -> LedgerResult<()> {
        require_text("method", &self.method)?;
        bounded("rating", self.rating, 1, 10)?;
        bounded("durationMinutes", self.duration_minutes, 0, i32::MAX)?;
        for product in &self.products {
            product.validate()?;
        }
        for effect in &self.effects {
            effect.validate()?;
        }
        Ok(())
    }
}

impl SessionUpdate {
    pub fn validate(&self) -> LedgerResult<()> {
        if let Some(method) = &self.method {
            require_text("method", method)?;
        }
        bounded("rating", self.rating, 1, 10)?;
        bounded("durationMinutes", self.duration_minutes, 0, i32::MAX)
    }
}
