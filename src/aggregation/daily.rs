//! Daily product aggregation.
//!
//! Groups every derived order line by `(product_id, order_date)` and sums the
//! contributions into one `product_performance_enhanced` row per key. Keys
//! with an invalid line are left untouched in the table and reported.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, Utc};
use metrics::counter;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ActiveModelTrait, DatabaseConnection, IntoActiveModel};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::DateRange;
use crate::config::MetricsPolicyConfig;
use crate::error::RepositoryError;
use crate::finance::{self, DerivedLine, derive_line};
use crate::models::daily_product_metric;
use crate::repositories::{
    CustomerFirstOrderRepository, DailyMetricRepository, OrderRepository, OrderWithItems,
};

/// A `(product_id, date)` key whose row could not be recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FailedKey {
    pub product_id: String,
    #[schema(value_type = String, format = Date)]
    pub metric_date: NaiveDate,
    pub order_external_id: String,
    pub line_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AggregationReport {
    pub range: DateRange,
    pub orders_scanned: u64,
    pub lines_aggregated: u64,
    /// Custom lines stored without a product id
    pub lines_without_product: u64,
    pub rows_deleted: u64,
    pub rows_written: u64,
    pub failed_keys: Vec<FailedKey>,
}

/// Output of the pure aggregation step.
#[derive(Debug, Clone, Default)]
pub struct DailyBuild {
    pub rows: Vec<daily_product_metric::Model>,
    pub failed: Vec<FailedKey>,
    pub orders_scanned: u64,
    pub lines_aggregated: u64,
    pub lines_without_product: u64,
}

#[derive(Debug, Default)]
struct Accumulator {
    sums: DerivedLine,
    /// Distinct contributing orders: total price and fulfillment.
    orders: BTreeMap<Uuid, (f64, bool)>,
    customers: BTreeSet<String>,
    new_customers: BTreeSet<String>,
    failure: Option<FailedKey>,
}

impl Accumulator {
    fn add(&mut self, line: &DerivedLine) {
        let s = &mut self.sums;
        s.gross += line.gross;
        s.discount += line.discount;
        s.returns_amount += line.returns_amount;
        s.returns_count += line.returns_count;
        s.units += line.units;
        s.taxes += line.taxes;
        s.shipping += line.shipping;
        s.cost += line.cost;
    }

    fn into_model(
        self,
        product_id: String,
        metric_date: NaiveDate,
        computed_at: DateTimeWithTimeZone,
    ) -> daily_product_metric::Model {
        let s = self.sums;
        let net = finance::net_sales(s.gross, s.discount, s.returns_amount);
        let gross_profit = finance::gross_profit(net, s.cost);
        let order_value: f64 = self.orders.values().map(|(total, _)| total).sum();
        let fulfilled = self.orders.values().filter(|(_, f)| *f).count() as i64;
        let orders_count = self.orders.len() as i64;

        daily_product_metric::Model {
            id: Uuid::new_v4(),
            product_id,
            metric_date,
            gross_sales: s.gross,
            net_sales: net,
            total_sales: finance::total_sales(net, s.taxes),
            units_sold: s.units,
            orders_count,
            total_discounts: s.discount,
            returns_amount: s.returns_amount,
            returns_count: s.returns_count,
            taxes: s.taxes,
            shipping_charges: s.shipping,
            total_cost: s.cost,
            gross_profit,
            net_profit: finance::net_profit(gross_profit, s.shipping),
            margin_percentage: finance::margin_percentage(net, s.cost),
            unique_customers: self.customers.len() as i64,
            new_customers: self.new_customers.len() as i64,
            average_order_value: finance::average(order_value, self.orders.len()),
            fulfilled_orders: fulfilled,
            unfulfilled_orders: orders_count - fulfilled,
            computed_at,
        }
    }
}

/// Earliest order per customer email within `orders`, as external ids.
fn batch_first_orders(orders: &[OrderWithItems]) -> HashMap<String, String> {
    let mut earliest: HashMap<String, (DateTimeWithTimeZone, &str)> = HashMap::new();
    for (order, _) in orders {
        let Some(email) = order.customer_email.as_deref() else {
            continue;
        };
        let candidate = (order.created_at, order.external_id.as_str());
        earliest
            .entry(email.to_string())
            .and_modify(|current| {
                if (candidate.0, candidate.1) < (current.0, current.1) {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }
    earliest
        .into_iter()
        .map(|(email, (_, id))| (email, id.to_string()))
        .collect()
}

/// Aggregate orders into daily rows.
///
/// `first_orders` maps a customer email to the external id of that customer's
/// first order; emails missing from it fall back to the earliest order in
/// `orders`. Only orders dated inside `range` contribute.
pub fn build_daily_rows(
    range: DateRange,
    orders: &[OrderWithItems],
    first_orders: &HashMap<String, String>,
    default_cost_fraction: f64,
    computed_at: DateTimeWithTimeZone,
) -> DailyBuild {
    let batch_first = batch_first_orders(orders);
    let mut build = DailyBuild::default();
    let mut keys: BTreeMap<(String, NaiveDate), Accumulator> = BTreeMap::new();

    for (order, items) in orders {
        if !range.contains(order.order_date) {
            continue;
        }
        build.orders_scanned += 1;
        let amounts = order.amounts();
        let fulfilled = order.is_fulfilled();
        let email = order.customer_email.as_deref();
        let is_new_customer = email.is_some_and(|email| {
            first_orders
                .get(email)
                .or_else(|| batch_first.get(email))
                .is_some_and(|first| *first == order.external_id)
        });

        let mut items: Vec<_> = items.iter().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));

        for item in items {
            let Some(product_id) = item.product_id.as_deref() else {
                build.lines_without_product += 1;
                continue;
            };
            let acc = keys
                .entry((product_id.to_string(), order.order_date))
                .or_default();
            if acc.failure.is_some() {
                continue;
            }
            match derive_line(&amounts, &item.amounts(), default_cost_fraction) {
                Ok(line) => {
                    acc.add(&line);
                    acc.orders.insert(order.id, (order.total_price, fulfilled));
                    if let Some(email) = email {
                        acc.customers.insert(email.to_string());
                        if is_new_customer {
                            acc.new_customers.insert(email.to_string());
                        }
                    }
                    build.lines_aggregated += 1;
                }
                Err(e) => {
                    acc.failure = Some(FailedKey {
                        product_id: product_id.to_string(),
                        metric_date: order.order_date,
                        order_external_id: order.external_id.clone(),
                        line_id: item.external_line_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    for ((product_id, metric_date), mut acc) in keys {
        match acc.failure.take() {
            Some(failed) => build.failed.push(failed),
            None => build
                .rows
                .push(acc.into_model(product_id, metric_date, computed_at)),
        }
    }
    build
}

/// Recompute daily rows for every date in `range` and replace them atomically.
#[instrument(skip(db, policy), fields(start = %range.start, end = %range.end))]
pub async fn aggregate_daily(
    db: &DatabaseConnection,
    range: DateRange,
    policy: &MetricsPolicyConfig,
) -> Result<AggregationReport, RepositoryError> {
    let orders = OrderRepository::new(db.clone())
        .find_with_items_in_range(range.start, range.end)
        .await?;

    let emails: Vec<String> = orders
        .iter()
        .filter_map(|(order, _)| order.customer_email.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let first_orders: HashMap<String, String> = CustomerFirstOrderRepository::new(db.clone())
        .find_many(&emails)
        .await?
        .into_iter()
        .map(|(email, entry)| (email, entry.first_order_external_id))
        .collect();

    let computed_at = Utc::now().fixed_offset();
    let build = build_daily_rows(
        range,
        &orders,
        &first_orders,
        policy.default_cost_fraction,
        computed_at,
    );

    for failed in &build.failed {
        warn!(
            product_id = %failed.product_id,
            date = %failed.metric_date,
            order = %failed.order_external_id,
            reason = %failed.reason,
            "Keeping previous daily row for key with invalid line"
        );
    }

    let preserve: Vec<(String, NaiveDate)> = build
        .failed
        .iter()
        .map(|f| (f.product_id.clone(), f.metric_date))
        .collect();
    let rows = build
        .rows
        .into_iter()
        .map(|row| row.into_active_model().reset_all())
        .collect();
    let stats = DailyMetricRepository::new(db.clone())
        .replace_range(range.start, range.end, rows, &preserve)
        .await?;
    counter!("daily_metrics_rows_written_total").increment(stats.inserted);

    info!(
        orders = build.orders_scanned,
        lines = build.lines_aggregated,
        rows_written = stats.inserted,
        rows_deleted = stats.deleted,
        failed_keys = build.failed.len(),
        "Daily aggregation finished"
    );

    Ok(AggregationReport {
        range,
        orders_scanned: build.orders_scanned,
        lines_aggregated: build.lines_aggregated,
        lines_without_product: build.lines_without_product,
        rows_deleted: stats.deleted,
        rows_written: stats.inserted,
        failed_keys: build.failed,
    })
}
