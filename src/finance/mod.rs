//! Financial formulas.
//!
//! Every money computation in the crate goes through these functions so that
//! aggregation, summary, analytics and reconciliation agree on one definition
//! of each metric.
//!
//! Sign convention for derived values: discounts and returns are
//! non-positive, so net sales is always a plain sum.

pub mod derivation;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use derivation::{DerivationError, DerivedLine, LineAmounts, OrderAmounts, derive_line};

/// Revenue change ratio below which a product is considered flat.
pub const DEFAULT_TREND_THRESHOLD: f64 = 0.05;

/// Tolerance (in percent) for a reconciled metric to count as matching.
pub const RECONCILIATION_TOLERANCE_PCT: f64 = 1.0;

pub fn line_gross(price: f64, quantity: i32) -> f64 {
    price * f64::from(quantity)
}

/// Cost of a line, falling back to a fraction of the price when unit cost is unknown.
pub fn line_cost(unit_cost: Option<f64>, price: f64, default_cost_fraction: f64, quantity: i32) -> f64 {
    unit_cost.unwrap_or(price * default_cost_fraction) * f64::from(quantity)
}

/// Share of an order-level amount attributed to a line by its value.
///
/// Returns 0 when the subtotal is not positive.
pub fn prorate(order_total: f64, line_gross: f64, subtotal: f64) -> f64 {
    if subtotal <= 0.0 {
        return 0.0;
    }
    order_total * line_gross / subtotal
}

/// `discounts` and `returns` are non-positive.
pub fn net_sales(gross: f64, discounts: f64, returns: f64) -> f64 {
    gross + discounts + returns
}

pub fn total_sales(net: f64, taxes: f64) -> f64 {
    net + taxes
}

pub fn gross_profit(net: f64, cost: f64) -> f64 {
    net - cost
}

/// Shipping charges collected from the customer are added on top of gross profit.
pub fn net_profit(gross_profit: f64, shipping_charges: f64) -> f64 {
    gross_profit + shipping_charges
}

/// Profit margin in percent, 0 when there are no positive net sales.
pub fn margin_percentage(net: f64, cost: f64) -> f64 {
    if net <= 0.0 {
        return 0.0;
    }
    (net - cost) * 100.0 / net
}

pub fn average(sum: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Relative change from `previous` to `current` as a ratio, `None` without a baseline.
pub fn percentage_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous)
}

/// Variance of an internal figure against a reference figure, formatted for reports.
///
/// `"0.00"` when both are zero, `"N/A"` when only the reference is zero.
pub fn variance_percentage(internal: f64, reference: f64) -> String {
    match variance_ratio(internal, reference) {
        Some(pct) => format!("{pct:.2}"),
        None if internal == 0.0 => "0.00".to_string(),
        None => "N/A".to_string(),
    }
}

/// Numeric form of [`variance_percentage`], in percent.
pub fn variance_ratio(internal: f64, reference: f64) -> Option<f64> {
    if reference == 0.0 {
        return None;
    }
    Some((internal - reference) * 100.0 / reference)
}

/// Divisors balancing revenue, units and profit in the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub revenue_divisor: f64,
    pub units_divisor: f64,
    pub profit_divisor: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            revenue_divisor: 1000.0,
            units_divisor: 1.0,
            profit_divisor: 100.0,
        }
    }
}

/// Equal-weight mean of scaled revenue, units and profit.
pub fn composite_score(revenue: f64, units: i64, profit: f64, weights: &ScoreWeights) -> f64 {
    (revenue / weights.revenue_divisor
        + units as f64 / weights.units_divisor
        + profit / weights.profit_divisor)
        / 3.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl TrendDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Flat => "flat",
        }
    }
}

/// Week-over-week trend. Without a prior baseline any positive revenue is `Up`.
pub fn trend_direction(current: f64, previous: f64, threshold: f64) -> (TrendDirection, Option<f64>) {
    match percentage_change(current, previous) {
        Some(change) if change > threshold => (TrendDirection::Up, Some(change)),
        Some(change) if change < -threshold => (TrendDirection::Down, Some(change)),
        Some(change) => (TrendDirection::Flat, Some(change)),
        None if current > 0.0 => (TrendDirection::Up, None),
        None => (TrendDirection::Flat, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn tax_is_prorated_by_line_value() {
        let tax = 10.0;
        assert!(approx(prorate(tax, 70.0, 100.0), 7.0));
        assert!(approx(prorate(tax, 30.0, 100.0), 3.0));
    }

    #[test]
    fn proration_against_empty_subtotal_is_zero() {
        assert_eq!(prorate(10.0, 0.0, 0.0), 0.0);
        assert_eq!(prorate(10.0, 5.0, -1.0), 0.0);
    }

    #[test]
    fn cost_falls_back_to_price_fraction() {
        assert!(approx(line_cost(None, 100.0, 0.4, 2), 80.0));
        assert!(approx(line_cost(Some(20.0), 50.0, 0.4, 3), 60.0));
    }

    #[test]
    fn margin_is_zero_without_net_sales() {
        assert_eq!(margin_percentage(0.0, 10.0), 0.0);
        assert_eq!(margin_percentage(-5.0, 10.0), 0.0);
        assert!(approx(margin_percentage(150.0, 60.0), 60.0));
    }

    #[test]
    fn net_sales_adds_signed_deductions() {
        assert!(approx(net_sales(200.0, -20.0, -50.0), 130.0));
        assert!(approx(total_sales(130.0, 13.0), 143.0));
    }

    #[test]
    fn variance_is_formatted_to_two_decimals() {
        assert_eq!(variance_percentage(100.0, 95.0), "5.26");
        assert_eq!(variance_percentage(90.0, 100.0), "-10.00");
    }

    #[test]
    fn variance_against_zero_reference() {
        assert_eq!(variance_percentage(0.0, 0.0), "0.00");
        assert_eq!(variance_percentage(12.0, 0.0), "N/A");
    }

    #[test]
    fn composite_score_balances_components() {
        let score = composite_score(3000.0, 6, 300.0, &ScoreWeights::default());
        assert!(approx(score, (3.0 + 6.0 + 3.0) / 3.0));
    }

    #[test]
    fn trend_thresholds() {
        assert_eq!(trend_direction(110.0, 100.0, 0.05).0, TrendDirection::Up);
        assert_eq!(trend_direction(90.0, 100.0, 0.05).0, TrendDirection::Down);
        assert_eq!(trend_direction(103.0, 100.0, 0.05).0, TrendDirection::Flat);
    }

    #[test]
    fn trend_without_baseline() {
        assert_eq!(trend_direction(50.0, 0.0, 0.05), (TrendDirection::Up, None));
        assert_eq!(trend_direction(0.0, 0.0, 0.05), (TrendDirection::Flat, None));
    }

    #[test]
    fn average_of_nothing_is_zero() {
        assert_eq!(average(0.0, 0), 0.0);
        assert!(approx(average(30.0, 4), 7.5));
    }
}
