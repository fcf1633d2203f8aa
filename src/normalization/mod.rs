//! Canonical order vocabulary.
//!
//! Upstream payloads are mapped into these types before anything is persisted,
//! so the rest of the crate never handles upstream-specific strings.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Order-level payment state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
    Pending,
    Authorized,
    Paid,
    PartiallyPaid,
    PartiallyRefunded,
    Refunded,
    Voided,
    /// Upstream value outside the canonical set, kept verbatim.
    Other(String),
}

impl FinancialStatus {
    /// Parse a status string; unknown values are preserved as `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "authorized" => Self::Authorized,
            "paid" => Self::Paid,
            "partially_paid" => Self::PartiallyPaid,
            "partially_refunded" => Self::PartiallyRefunded,
            "refunded" => Self::Refunded,
            "voided" => Self::Voided,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Paid => "paid",
            Self::PartiallyPaid => "partially_paid",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Refunded => "refunded",
            Self::Voided => "voided",
            Self::Other(raw) => raw.as_str(),
        }
    }

    /// Whether every line of the order is treated as returned.
    ///
    /// This is an order-level proxy: partially refunded orders are not
    /// counted, fully refunded orders count every line in full.
    pub fn is_refunded(&self) -> bool {
        matches!(self, Self::Refunded)
    }
}

impl fmt::Display for FinancialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order or line fulfillment state. Absent upstream values map to `Unfulfilled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[default]
    Unfulfilled,
    Partial,
    Fulfilled,
    Restocked,
}

impl FulfillmentStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("fulfilled") => Self::Fulfilled,
            Some("partial") => Self::Partial,
            Some("restocked") => Self::Restocked,
            _ => Self::Unfulfilled,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unfulfilled => "unfulfilled",
            Self::Partial => "partial",
            Self::Fulfilled => "fulfilled",
            Self::Restocked => "restocked",
        }
    }

    pub fn is_fulfilled(self) -> bool {
        matches!(self, Self::Fulfilled)
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer identity attached to an order. Guest orders carry none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub name: Option<String>,
    /// Lower-cased
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Order header plus lines in canonical form, ready to persist.
///
/// All money fields are non-negative magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    pub external_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub processed_at: Option<DateTime<FixedOffset>>,
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub financial_status: FinancialStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub subtotal_price: f64,
    pub total_tax: f64,
    pub total_discounts: f64,
    pub total_shipping: f64,
    pub total_refunded: f64,
    pub total_price: f64,
    pub currency: Option<String>,
    pub customer: CustomerIdentity,
    pub line_items: Vec<NormalizedLineItem>,
}

impl NormalizedOrder {
    /// Calendar date of the order, taken in the upstream timestamp's own offset.
    pub fn order_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLineItem {
    pub external_line_id: Option<String>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub sku: Option<String>,
    pub title: Option<String>,
    pub quantity: i32,
    pub price: f64,
    pub cost: Option<f64>,
    pub total_discount: f64,
    pub fulfillment_status: Option<FulfillmentStatus>,
}

/// Lower-case and trim an email; blank values become `None`.
pub fn normalize_email(raw: Option<&str>) -> Option<String> {
    raw.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty())
}
