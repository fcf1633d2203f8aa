//! Read-side analytics over the derived tables.
//!
//! These are the stable entry points behind the HTTP read API. They only read
//! `product_performance_enhanced` and `product_analytics_summary`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::aggregation::DateRange;
use crate::error::RepositoryError;
use crate::finance;
use crate::models::{daily_product_metric, product_summary};
use crate::repositories::{DailyMetricRepository, SummaryRepository};

pub const DEFAULT_TOP_LIMIT: u32 = 10;
pub const MAX_TOP_LIMIT: u32 = 100;
pub const DEFAULT_PERIOD_DAYS: u32 = 30;
pub const MAX_PERIOD_DAYS: u32 = 366;

/// Totals of a set of daily rows, with derived ratios recomputed from the sums.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RangeTotals {
    pub gross_sales: f64,
    pub total_discounts: f64,
    pub returns_amount: f64,
    pub returns_count: i64,
    pub net_sales: f64,
    pub taxes: f64,
    pub total_sales: f64,
    pub shipping_charges: f64,
    pub total_cost: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    pub margin_percentage: f64,
    pub units_sold: i64,
    pub orders_count: i64,
    pub average_order_value: f64,
}

impl RangeTotals {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a daily_product_metric::Model>) -> Self {
        let mut t = Self::default();
        let mut order_value = 0.0;
        for row in rows {
            t.gross_sales += row.gross_sales;
            t.total_discounts += row.total_discounts;
            t.returns_amount += row.returns_amount;
            t.returns_count += row.returns_count;
            t.taxes += row.taxes;
            t.shipping_charges += row.shipping_charges;
            t.total_cost += row.total_cost;
            t.units_sold += row.units_sold;
            t.orders_count += row.orders_count;
            order_value += row.average_order_value * row.orders_count as f64;
        }
        t.net_sales = finance::net_sales(t.gross_sales, t.total_discounts, t.returns_amount);
        t.total_sales = finance::total_sales(t.net_sales, t.taxes);
        t.gross_profit = finance::gross_profit(t.net_sales, t.total_cost);
        t.net_profit = finance::net_profit(t.gross_profit, t.shipping_charges);
        t.margin_percentage = finance::margin_percentage(t.net_sales, t.total_cost);
        t.average_order_value =
            finance::average(order_value, usize::try_from(t.orders_count).unwrap_or(0));
        t
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComprehensiveAnalytics {
    pub product_id: Option<String>,
    pub range: DateRange,
    pub daily: Vec<daily_product_metric::Model>,
    pub totals: RangeTotals,
    pub summaries: Vec<product_summary::Model>,
}

/// Daily rows, range totals and lifetime summaries, for one product or all.
pub async fn comprehensive_analytics(
    db: &DatabaseConnection,
    product_id: Option<&str>,
    range: DateRange,
) -> Result<ComprehensiveAnalytics, RepositoryError> {
    let daily = DailyMetricRepository::new(db.clone())
        .find_range(product_id, range.start, range.end)
        .await?;
    let summaries = SummaryRepository::new(db.clone());
    let summaries = match product_id {
        Some(id) => summaries.find_by_product(id).await?.into_iter().collect(),
        None => summaries.list_ranked(None).await?,
    };
    let totals = RangeTotals::from_rows(&daily);

    Ok(ComprehensiveAnalytics {
        product_id: product_id.map(str::to_string),
        range,
        daily,
        totals,
        summaries,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TopMetric {
    #[default]
    Revenue,
    Units,
    Profit,
    Margin,
    Growth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopProduct {
    pub rank: u32,
    pub product_id: String,
    /// Value of the ranking metric
    pub value: f64,
    pub revenue: f64,
    pub units: i64,
    pub profit: f64,
    pub margin_percentage: f64,
    pub previous_revenue: f64,
    /// Revenue growth against the preceding period, in percent
    pub growth_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopProducts {
    pub metric: TopMetric,
    pub period: DateRange,
    pub previous_period: DateRange,
    pub products: Vec<TopProduct>,
}

#[derive(Default)]
struct PeriodTotals {
    current: Vec<daily_product_metric::Model>,
    previous_revenue: f64,
}

/// Rank products over the `period_days` ending at `today`.
///
/// Growth compares revenue with the preceding period of the same length;
/// products without revenue in that period rank after those with a baseline,
/// ordered by current revenue.
pub async fn top_products(
    db: &DatabaseConnection,
    metric: TopMetric,
    limit: u32,
    period_days: u32,
    today: NaiveDate,
) -> Result<TopProducts, RepositoryError> {
    let limit = limit.clamp(1, MAX_TOP_LIMIT) as usize;
    let period = DateRange::trailing(today, period_days.clamp(1, MAX_PERIOD_DAYS));
    let previous_period = period.preceding();

    let rows = DailyMetricRepository::new(db.clone())
        .find_range(None, previous_period.start, period.end)
        .await?;

    let mut by_product: BTreeMap<String, PeriodTotals> = BTreeMap::new();
    for row in rows {
        if period.contains(row.metric_date) {
            by_product
                .entry(row.product_id.clone())
                .or_default()
                .current
                .push(row);
        } else {
            by_product
                .entry(row.product_id.clone())
                .or_default()
                .previous_revenue += row.total_sales;
        }
    }

    let mut products: Vec<TopProduct> = by_product
        .into_iter()
        .filter(|(_, t)| !t.current.is_empty())
        .map(|(product_id, t)| {
            let totals = RangeTotals::from_rows(&t.current);
            let growth = finance::percentage_change(totals.total_sales, t.previous_revenue)
                .map(|ratio| ratio * 100.0);
            let value = match metric {
                TopMetric::Revenue => totals.total_sales,
                TopMetric::Units => totals.units_sold as f64,
                TopMetric::Profit => totals.net_profit,
                TopMetric::Margin => totals.margin_percentage,
                TopMetric::Growth => growth.unwrap_or(totals.total_sales),
            };
            TopProduct {
                rank: 0,
                product_id,
                value,
                revenue: totals.total_sales,
                units: totals.units_sold,
                profit: totals.net_profit,
                margin_percentage: totals.margin_percentage,
                previous_revenue: t.previous_revenue,
                growth_percentage: growth,
            }
        })
        .collect();

    products.sort_by(|a, b| {
        let by_baseline = match metric {
            TopMetric::Growth => b
                .growth_percentage
                .is_some()
                .cmp(&a.growth_percentage.is_some()),
            _ => Ordering::Equal,
        };
        by_baseline
            .then_with(|| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal))
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    products.truncate(limit);
    for (i, product) in products.iter_mut().enumerate() {
        product.rank = u32::try_from(i + 1).unwrap_or(u32::MAX);
    }

    Ok(TopProducts {
        metric,
        period,
        previous_period,
        products,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn row(orders: i64, aov: f64, net: f64, cost: f64) -> daily_product_metric::Model {
        daily_product_metric::Model {
            id: Uuid::new_v4(),
            product_id: "P1".to_string(),
            metric_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            gross_sales: net,
            net_sales: net,
            total_sales: net,
            units_sold: 1,
            orders_count: orders,
            total_discounts: 0.0,
            returns_amount: 0.0,
            returns_count: 0,
            taxes: 0.0,
            shipping_charges: 0.0,
            total_cost: cost,
            gross_profit: net - cost,
            net_profit: net - cost,
            margin_percentage: 0.0,
            unique_customers: 0,
            new_customers: 0,
            average_order_value: aov,
            fulfilled_orders: 0,
            unfulfilled_orders: orders,
            computed_at: Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn totals_recompute_margin_from_sums() {
        let rows = [row(1, 100.0, 100.0, 80.0), row(3, 20.0, 100.0, 20.0)];
        let totals = RangeTotals::from_rows(&rows);
        assert_eq!(totals.net_sales, 200.0);
        assert_eq!(totals.total_cost, 100.0);
        assert_eq!(totals.margin_percentage, 50.0);
        // (100*1 + 20*3) / 4
        assert_eq!(totals.average_order_value, 40.0);
    }

    #[test]
    fn empty_totals_are_zero() {
        let totals = RangeTotals::from_rows(&[]);
        assert_eq!(totals, RangeTotals::default());
    }

    #[test]
    fn top_metric_parses_lowercase() {
        let metric: TopMetric = serde_json::from_str("\"growth\"").unwrap();
        assert_eq!(metric, TopMetric::Growth);
    }
}
