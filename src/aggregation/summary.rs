//! Lifetime and window summary per product.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ActiveModelTrait, DatabaseConnection, IntoActiveModel};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::DateRange;
use crate::config::MetricsPolicyConfig;
use crate::error::RepositoryError;
use crate::finance::{self, ScoreWeights};
use crate::models::{daily_product_metric, product_summary};
use crate::repositories::{DailyMetricRepository, SummaryRepository};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SummaryReport {
    #[schema(value_type = String, format = Date)]
    pub today: NaiveDate,
    pub daily_rows_read: u64,
    pub products: u64,
}

/// Sums of one product over one set of days.
#[derive(Debug, Default, Clone, Copy)]
struct WindowTotals {
    revenue: f64,
    net_sales: f64,
    units: i64,
    orders: i64,
    cost: f64,
    profit: f64,
}

impl WindowTotals {
    fn add(&mut self, row: &daily_product_metric::Model) {
        self.revenue += row.total_sales;
        self.net_sales += row.net_sales;
        self.units += row.units_sold;
        self.orders += row.orders_count;
        self.cost += row.total_cost;
        self.profit += row.net_profit;
    }
}

#[derive(Debug, Default)]
struct ProductTotals {
    lifetime: WindowTotals,
    last_7d: WindowTotals,
    last_30d: WindowTotals,
    prev_7d: WindowTotals,
    first_sale: Option<NaiveDate>,
    last_sale: Option<NaiveDate>,
}

/// Build ranked summary rows from daily rows.
///
/// Windows end at `today` inclusive: the last 7 days are `[today-6, today]`,
/// the last 30 are `[today-29, today]` and the previous week is
/// `[today-13, today-7]`.
pub fn build_summaries(
    rows: &[daily_product_metric::Model],
    today: NaiveDate,
    policy: &MetricsPolicyConfig,
    computed_at: DateTimeWithTimeZone,
) -> Vec<product_summary::Model> {
    let last_7d = DateRange::trailing(today, 7);
    let last_30d = DateRange::trailing(today, 30);
    let prev_7d = last_7d.preceding();

    let mut products: BTreeMap<&str, ProductTotals> = BTreeMap::new();
    for row in rows {
        let totals = products.entry(row.product_id.as_str()).or_default();
        totals.lifetime.add(row);
        if last_7d.contains(row.metric_date) {
            totals.last_7d.add(row);
        }
        if last_30d.contains(row.metric_date) {
            totals.last_30d.add(row);
        }
        if prev_7d.contains(row.metric_date) {
            totals.prev_7d.add(row);
        }
        totals.first_sale = Some(match totals.first_sale {
            Some(d) => d.min(row.metric_date),
            None => row.metric_date,
        });
        totals.last_sale = Some(match totals.last_sale {
            Some(d) => d.max(row.metric_date),
            None => row.metric_date,
        });
    }

    let weights: ScoreWeights = policy.score_weights();
    let mut summaries: Vec<product_summary::Model> = products
        .into_iter()
        .map(|(product_id, t)| {
            let (trend, change) = finance::trend_direction(
                t.last_7d.revenue,
                t.prev_7d.revenue,
                policy.trend_flat_threshold,
            );
            product_summary::Model {
                product_id: product_id.to_string(),
                lifetime_revenue: t.lifetime.revenue,
                lifetime_net_sales: t.lifetime.net_sales,
                lifetime_units: t.lifetime.units,
                lifetime_orders: t.lifetime.orders,
                lifetime_cost: t.lifetime.cost,
                lifetime_profit: t.lifetime.profit,
                lifetime_margin_percentage: finance::margin_percentage(
                    t.lifetime.net_sales,
                    t.lifetime.cost,
                ),
                last_7d_revenue: t.last_7d.revenue,
                last_7d_units: t.last_7d.units,
                last_7d_orders: t.last_7d.orders,
                last_7d_profit: t.last_7d.profit,
                last_30d_revenue: t.last_30d.revenue,
                last_30d_units: t.last_30d.units,
                last_30d_orders: t.last_30d.orders,
                last_30d_profit: t.last_30d.profit,
                prev_7d_revenue: t.prev_7d.revenue,
                overall_score: finance::composite_score(
                    t.lifetime.revenue,
                    t.lifetime.units,
                    t.lifetime.profit,
                    &weights,
                ),
                trend_direction: trend.as_str().to_string(),
                trend_change_pct: change,
                rank: 0,
                first_sale_date: t.first_sale,
                last_sale_date: t.last_sale,
                computed_at,
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    for (i, summary) in summaries.iter_mut().enumerate() {
        summary.rank = i32::try_from(i + 1).unwrap_or(i32::MAX);
    }
    summaries
}

/// Rebuild the whole summary table from the stored daily rows.
#[instrument(skip(db, policy), fields(today = %today))]
pub async fn summarize_products(
    db: &DatabaseConnection,
    today: NaiveDate,
    policy: &MetricsPolicyConfig,
) -> Result<SummaryReport, RepositoryError> {
    let rows = DailyMetricRepository::new(db.clone()).find_all().await?;
    let summaries = build_summaries(&rows, today, policy, Utc::now().fixed_offset());

    let models = summaries
        .into_iter()
        .map(|s| s.into_active_model().reset_all())
        .collect();
    let written = SummaryRepository::new(db.clone()).replace_all(models).await?;

    info!(daily_rows = rows.len(), products = written, "Product summary rebuilt");
    Ok(SummaryReport {
        today,
        daily_rows_read: rows.len() as u64,
        products: written,
    })
}
