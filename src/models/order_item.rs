//! OrderItem entity model
//!
//! Line items belong exclusively to an order and are removed with it.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use uuid::Uuid;

use crate::finance::LineAmounts;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Parent order
    pub order_id: Uuid,

    /// Upstream line identifier
    pub external_line_id: Option<String>,

    /// Product identifier; custom lines without a product are not aggregated
    pub product_id: Option<String>,

    pub variant_id: Option<String>,
    pub sku: Option<String>,
    pub title: Option<String>,

    /// Units ordered (positive)
    pub quantity: i32,

    /// Unit price
    pub price: f64,

    /// Per-unit cost when known
    pub cost: Option<f64>,

    /// Discount attributed to this line (non-negative magnitude)
    pub total_discount: f64,

    pub fulfillment_status: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Line-level amounts consumed by line derivation.
    pub fn amounts(&self) -> LineAmounts {
        LineAmounts {
            price: self.price,
            quantity: self.quantity,
            cost: self.cost,
            discount: self.total_discount,
        }
    }
}
