//! Reconciliation against externally supplied reference totals.
//!
//! Purely diagnostic: sums the stored daily rows over a range and reports the
//! variance of each metric the caller supplied. Nothing is written.

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::aggregation::DateRange;
use crate::error::RepositoryError;
use crate::finance::{self, RECONCILIATION_TOLERANCE_PCT};
use crate::models::daily_product_metric;
use crate::repositories::DailyMetricRepository;

/// Reference figures for a range, typically copied from the commerce
/// platform's own sales report. Only supplied metrics are compared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReferenceTotals {
    pub gross_sales: Option<f64>,
    pub total_discounts: Option<f64>,
    pub returns_amount: Option<f64>,
    pub net_sales: Option<f64>,
    pub taxes: Option<f64>,
    pub total_sales: Option<f64>,
    pub shipping_charges: Option<f64>,
    pub units_sold: Option<f64>,
    pub orders_count: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VarianceLine {
    pub metric: String,
    pub internal: f64,
    pub reference: f64,
    pub difference: f64,
    /// Two decimals, `"0.00"` or `"N/A"` against a zero reference
    pub difference_percentage: String,
    pub within_tolerance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VarianceReport {
    pub range: DateRange,
    pub daily_rows: u64,
    pub lines: Vec<VarianceLine>,
    pub all_within_tolerance: bool,
}

/// Internal totals over a set of daily rows, keyed like [`ReferenceTotals`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InternalTotals {
    pub gross_sales: f64,
    pub total_discounts: f64,
    pub returns_amount: f64,
    pub net_sales: f64,
    pub taxes: f64,
    pub total_sales: f64,
    pub shipping_charges: f64,
    pub units_sold: f64,
    pub orders_count: f64,
}

impl InternalTotals {
    pub fn from_rows(rows: &[daily_product_metric::Model]) -> Self {
        let mut totals = Self::default();
        for row in rows {
            totals.gross_sales += row.gross_sales;
            totals.total_discounts += row.total_discounts;
            totals.returns_amount += row.returns_amount;
            totals.taxes += row.taxes;
            totals.shipping_charges += row.shipping_charges;
            totals.units_sold += row.units_sold as f64;
            totals.orders_count += row.orders_count as f64;
        }
        totals.net_sales = finance::net_sales(
            totals.gross_sales,
            totals.total_discounts,
            totals.returns_amount,
        );
        totals.total_sales = finance::total_sales(totals.net_sales, totals.taxes);
        totals
    }
}

pub fn variance_line(metric: &str, internal: f64, reference: f64) -> VarianceLine {
    let within_tolerance = match finance::variance_ratio(internal, reference) {
        Some(pct) => pct.abs() <= RECONCILIATION_TOLERANCE_PCT,
        None => internal == 0.0,
    };
    VarianceLine {
        metric: metric.to_string(),
        internal,
        reference,
        difference: internal - reference,
        difference_percentage: finance::variance_percentage(internal, reference),
        within_tolerance,
    }
}

/// Compare internal totals with the supplied reference, one line per supplied metric.
pub fn compare_totals(internal: &InternalTotals, reference: &ReferenceTotals) -> Vec<VarianceLine> {
    let pairs = [
        ("gross_sales", internal.gross_sales, reference.gross_sales),
        ("total_discounts", internal.total_discounts, reference.total_discounts),
        ("returns_amount", internal.returns_amount, reference.returns_amount),
        ("net_sales", internal.net_sales, reference.net_sales),
        ("taxes", internal.taxes, reference.taxes),
        ("total_sales", internal.total_sales, reference.total_sales),
        ("shipping_charges", internal.shipping_charges, reference.shipping_charges),
        ("units_sold", internal.units_sold, reference.units_sold),
        ("orders_count", internal.orders_count, reference.orders_count),
    ];
    pairs
        .into_iter()
        .filter_map(|(metric, internal, reference)| {
            reference.map(|reference| variance_line(metric, internal, reference))
        })
        .collect()
}

// orders_count sums per-product distinct orders, so an order spanning two
// products counts twice; compare it against a reference counted the same way.
#[instrument(skip(db, reference), fields(start = %range.start, end = %range.end))]
pub async fn compare_against_reference(
    db: &DatabaseConnection,
    range: DateRange,
    reference: &ReferenceTotals,
) -> Result<VarianceReport, RepositoryError> {
    let rows = DailyMetricRepository::new(db.clone())
        .find_range(None, range.start, range.end)
        .await?;
    let internal = InternalTotals::from_rows(&rows);
    let lines = compare_totals(&internal, reference);
    let all_within_tolerance = lines.iter().all(|l| l.within_tolerance);

    info!(
        metrics = lines.len(),
        all_within_tolerance, "Reconciliation report computed"
    );
    Ok(VarianceReport {
        range,
        daily_rows: rows.len() as u64,
        lines,
        all_within_tolerance,
    })
}
