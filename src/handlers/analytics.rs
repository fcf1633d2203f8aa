//! # Analytics Endpoint Handlers
//!
//! Read-only views over the derived product tables plus the reconciliation
//! report.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{extract::Query, extract::State, response::Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::aggregation::DateRange;
use crate::analytics::{
    self, ComprehensiveAnalytics, DEFAULT_PERIOD_DAYS, DEFAULT_TOP_LIMIT, MAX_PERIOD_DAYS,
    MAX_TOP_LIMIT, TopMetric, TopProducts,
};
use crate::error::{ApiError, validation_error};
use crate::reconciliation::{self, ReferenceTotals, VarianceReport};
use crate::server::AppState;

/// Query parameters for product analytics
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ProductAnalyticsQuery {
    /// Restrict to one product
    pub product_id: Option<String>,
    /// First day, inclusive (YYYY-MM-DD; default: 29 days before end_date)
    pub start_date: Option<String>,
    /// Last day, inclusive (YYYY-MM-DD; default: today, UTC)
    pub end_date: Option<String>,
}

/// Query parameters for the top products ranking
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct TopProductsQuery {
    /// Ranking metric (default: revenue)
    pub metric: Option<TopMetric>,
    /// Number of products (default: 10, max: 100)
    pub limit: Option<u32>,
    /// Trailing period length in days, ending today (default: 30, max: 366)
    pub period_days: Option<u32>,
}

/// Request body for reconciliation against reference totals
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReconciliationRequest {
    #[schema(value_type = String, format = Date, example = "2025-01-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-01-31")]
    pub end_date: NaiveDate,
    pub reference: ReferenceTotals,
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        validation_error(
            &format!("{field} must be a date in YYYY-MM-DD format"),
            json!({ "field": field, "value": value }),
        )
    })
}

fn date_range(start: NaiveDate, end: NaiveDate) -> Result<DateRange, ApiError> {
    DateRange::new(start, end).map_err(|e| {
        validation_error(
            &e.to_string(),
            json!({ "start_date": start.to_string(), "end_date": end.to_string() }),
        )
    })
}

/// Daily metrics, range totals and lifetime summaries
#[utoipa::path(
    get,
    path = "/analytics/products",
    params(ProductAnalyticsQuery),
    responses(
        (status = 200, description = "Product analytics for the range", body = ComprehensiveAnalytics),
        (status = 400, description = "Invalid query parameters", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "start_date must be a date in YYYY-MM-DD format",
            "trace_id": "corr-12345678"
        })),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "analytics"
)]
pub async fn product_analytics(
    State(state): State<AppState>,
    query: Result<Query<ProductAnalyticsQuery>, QueryRejection>,
) -> Result<Json<ComprehensiveAnalytics>, ApiError> {
    let Query(query) = query?;
    let end = match query.end_date.as_deref() {
        Some(value) => parse_date("end_date", value)?,
        None => Utc::now().date_naive(),
    };
    let start = match query.start_date.as_deref() {
        Some(value) => parse_date("start_date", value)?,
        None => DateRange::trailing(end, DEFAULT_PERIOD_DAYS).start,
    };
    let range = date_range(start, end)?;
    let product_id = query
        .product_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let result = analytics::comprehensive_analytics(&state.db, product_id, range).await?;
    Ok(Json(result))
}

/// Products ranked by a metric over a trailing period
#[utoipa::path(
    get,
    path = "/analytics/top-products",
    params(TopProductsQuery),
    responses(
        (status = 200, description = "Ranked products", body = TopProducts),
        (status = 400, description = "Invalid query parameters", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "limit must be between 1 and 100",
            "trace_id": "corr-12345678"
        })),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "analytics"
)]
pub async fn top_products(
    State(state): State<AppState>,
    query: Result<Query<TopProductsQuery>, QueryRejection>,
) -> Result<Json<TopProducts>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    if !(1..=MAX_TOP_LIMIT).contains(&limit) {
        return Err(validation_error(
            &format!("limit must be between 1 and {MAX_TOP_LIMIT}"),
            json!({ "limit": limit }),
        ));
    }
    let period_days = query.period_days.unwrap_or(DEFAULT_PERIOD_DAYS);
    if !(1..=MAX_PERIOD_DAYS).contains(&period_days) {
        return Err(validation_error(
            &format!("period_days must be between 1 and {MAX_PERIOD_DAYS}"),
            json!({ "period_days": period_days }),
        ));
    }

    let result = analytics::top_products(
        &state.db,
        query.metric.unwrap_or_default(),
        limit,
        period_days,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(Json(result))
}

/// Compare stored daily totals with externally supplied reference totals
#[utoipa::path(
    post,
    path = "/analytics/reconciliation",
    request_body = ReconciliationRequest,
    responses(
        (status = 200, description = "Variance per supplied metric", body = VarianceReport),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "analytics"
)]
pub async fn reconcile(
    State(state): State<AppState>,
    payload: Result<Json<ReconciliationRequest>, JsonRejection>,
) -> Result<Json<VarianceReport>, ApiError> {
    let Json(request) = payload?;
    let range = date_range(request.start_date, request.end_date)?;
    let report =
        reconciliation::compare_against_reference(&state.db, range, &request.reference).await?;
    Ok(Json(report))
}
