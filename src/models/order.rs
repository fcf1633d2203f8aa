//! Order entity model
//!
//! This module contains the SeaORM entity model for the orders table, which
//! holds one upstream commerce order header per row.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use crate::finance::OrderAmounts;
use crate::normalization::{FinancialStatus, FulfillmentStatus};

/// Order header as ingested from the upstream platform
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Internal identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Upstream order identifier, unique across the table
    #[sea_orm(unique)]
    pub external_id: String,

    /// Human readable order name (e.g. `#1001`)
    pub name: Option<String>,

    /// Upstream creation timestamp
    pub created_at: DateTimeWithTimeZone,

    /// Upstream processing timestamp
    pub processed_at: Option<DateTimeWithTimeZone>,

    /// Upstream last-modified timestamp, used to detect edits on re-sync
    pub upstream_updated_at: Option<DateTimeWithTimeZone>,

    /// Calendar date of `created_at` in the upstream timestamp's own offset
    pub order_date: Date,

    /// Canonical financial status string
    pub financial_status: String,

    /// Canonical fulfillment status string
    pub fulfillment_status: String,

    pub subtotal_price: f64,
    pub total_tax: f64,
    /// Order-level discount magnitude (non-negative)
    pub total_discounts: f64,
    pub total_shipping: f64,
    /// Refunded magnitude (non-negative)
    pub total_refunded: f64,
    pub total_price: f64,

    pub currency: Option<String>,

    /// Customer identity; all three are absent for guest orders
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,

    /// Timestamp when the row was first written
    pub ingested_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last written
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Order-level amounts consumed by line derivation.
    pub fn amounts(&self) -> OrderAmounts {
        OrderAmounts {
            subtotal: self.subtotal_price,
            total_tax: self.total_tax,
            total_shipping: self.total_shipping,
            total_price: self.total_price,
            financial_status: FinancialStatus::parse(&self.financial_status),
        }
    }

    /// Whether the order counts as fulfilled in daily fulfillment counts.
    pub fn is_fulfilled(&self) -> bool {
        FulfillmentStatus::parse(Some(&self.fulfillment_status)).is_fulfilled()
    }
}
