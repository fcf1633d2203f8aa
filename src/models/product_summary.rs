//! Product lifetime/window summary entity model
//!
//! Backs the `product_analytics_summary` table, rebuilt wholesale from the
//! daily metrics after every aggregation run.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "product_analytics_summary")]
#[schema(as = ProductSummary)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: String,

    /// Lifetime total sales (net sales plus taxes)
    pub lifetime_revenue: f64,
    pub lifetime_net_sales: f64,
    pub lifetime_units: i64,
    pub lifetime_orders: i64,
    pub lifetime_cost: f64,
    /// Lifetime net profit
    pub lifetime_profit: f64,
    pub lifetime_margin_percentage: f64,

    pub last_7d_revenue: f64,
    pub last_7d_units: i64,
    pub last_7d_orders: i64,
    pub last_7d_profit: f64,

    pub last_30d_revenue: f64,
    pub last_30d_units: i64,
    pub last_30d_orders: i64,
    pub last_30d_profit: f64,

    /// Revenue of the 7 days preceding the last-7-day window
    pub prev_7d_revenue: f64,

    pub overall_score: f64,
    /// One of `up`, `down`, `flat`
    pub trend_direction: String,
    /// Week-over-week revenue change ratio; absent without a prior baseline
    pub trend_change_pct: Option<f64>,
    pub rank: i32,

    #[schema(value_type = Option<String>, format = Date)]
    pub first_sale_date: Option<Date>,
    #[schema(value_type = Option<String>, format = Date)]
    pub last_sale_date: Option<Date>,
    #[schema(value_type = String, format = DateTime)]
    pub computed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
