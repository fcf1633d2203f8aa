//! Daily product metric entity model
//!
//! Backs the `product_performance_enhanced` table. Rows are fully recomputed by
//! daily aggregation and never edited in place.
//!
//! Sign convention: `total_discounts` and `returns_amount` are non-positive,
//! so `net_sales = gross_sales + total_discounts + returns_amount`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "product_performance_enhanced")]
#[schema(as = DailyProductMetric)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: String,
    #[schema(value_type = String, format = Date)]
    pub metric_date: Date,
    pub gross_sales: f64,
    pub net_sales: f64,
    pub total_sales: f64,
    pub units_sold: i64,
    pub orders_count: i64,
    pub total_discounts: f64,
    pub returns_amount: f64,
    pub returns_count: i64,
    pub taxes: f64,
    pub shipping_charges: f64,
    pub total_cost: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    pub margin_percentage: f64,
    pub unique_customers: i64,
    pub new_customers: i64,
    pub average_order_value: f64,
    pub fulfilled_orders: i64,
    pub unfulfilled_orders: i64,
    #[schema(value_type = String, format = DateTime)]
    pub computed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
