//! Per-line metric derivation.
//!
//! Turns a stored order line (non-negative magnitudes) into its signed
//! contribution to a daily product row.

use thiserror::Error;

use super::{line_cost, line_gross, prorate};
use crate::normalization::FinancialStatus;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DerivationError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i32),
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// Order-level inputs shared by all lines of one order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAmounts {
    pub subtotal: f64,
    pub total_tax: f64,
    pub total_shipping: f64,
    pub total_price: f64,
    pub financial_status: FinancialStatus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAmounts {
    pub price: f64,
    pub quantity: i32,
    pub cost: Option<f64>,
    /// Non-negative discount magnitude
    pub discount: f64,
}

/// Signed contribution of one line.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedLine {
    pub gross: f64,
    /// ≤ 0
    pub discount: f64,
    /// ≤ 0
    pub returns_amount: f64,
    pub returns_count: i64,
    pub units: i64,
    pub taxes: f64,
    pub shipping: f64,
    pub cost: f64,
}

fn finite(field: &'static str, value: f64) -> Result<f64, DerivationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DerivationError::NonFinite { field })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, DerivationError> {
    let value = finite(field, value)?;
    if value < 0.0 {
        return Err(DerivationError::Negative { field, value });
    }
    Ok(value)
}

/// Derive one line's contribution.
///
/// A line is returned in full iff its order is `refunded`; partial refunds are
/// not attributed to lines.
pub fn derive_line(
    order: &OrderAmounts,
    line: &LineAmounts,
    default_cost_fraction: f64,
) -> Result<DerivedLine, DerivationError> {
    if line.quantity <= 0 {
        return Err(DerivationError::NonPositiveQuantity(line.quantity));
    }
    let price = non_negative("price", line.price)?;
    let discount = non_negative("total_discount", line.discount)?;
    let unit_cost = line
        .cost
        .map(|c| non_negative("cost", c))
        .transpose()?;
    let subtotal = finite("subtotal_price", order.subtotal)?;
    let total_tax = finite("total_tax", order.total_tax)?;
    let total_shipping = finite("total_shipping", order.total_shipping)?;

    let gross = line_gross(price, line.quantity);
    let (returns_amount, returns_count) = if order.financial_status.is_refunded() {
        (-(gross - discount), i64::from(line.quantity))
    } else {
        (0.0, 0)
    };

    Ok(DerivedLine {
        gross,
        discount: -discount,
        returns_amount,
        returns_count,
        units: i64::from(line.quantity),
        taxes: prorate(total_tax, gross, subtotal),
        shipping: prorate(total_shipping, gross, subtotal),
        cost: line_cost(unit_cost, price, default_cost_fraction, line.quantity),
    })
}
