//! # Server Configuration
//!
//! This module contains the server setup and configuration for the order
//! metrics read API.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/analytics/products",
            get(handlers::analytics::product_analytics),
        )
        .route(
            "/analytics/top-products",
            get(handlers::analytics::top_products),
        )
        .route(
            "/analytics/reconciliation",
            post(handlers::analytics::reconcile),
        )
        .route("/sync/runs", get(handlers::sync_runs::list_sync_runs))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts the server and serves until `shutdown` is cancelled.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let profile = config.profile.clone();
    let app = create_app(AppState {
        db,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::analytics::product_analytics,
        crate::handlers::analytics::top_products,
        crate::handlers::analytics::reconcile,
        crate::handlers::sync_runs::list_sync_runs,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::aggregation::DateRange,
            crate::analytics::ComprehensiveAnalytics,
            crate::analytics::RangeTotals,
            crate::analytics::TopMetric,
            crate::analytics::TopProduct,
            crate::analytics::TopProducts,
            crate::models::daily_product_metric::Model,
            crate::models::product_summary::Model,
            crate::reconciliation::ReferenceTotals,
            crate::reconciliation::VarianceLine,
            crate::reconciliation::VarianceReport,
            crate::handlers::analytics::ReconciliationRequest,
            crate::handlers::sync_runs::SyncRunInfo,
            crate::handlers::sync_runs::SyncRunsResponse,
        )
    ),
    tags(
        (name = "root", description = "Service information"),
        (name = "analytics", description = "Product performance analytics"),
        (name = "sync", description = "Pipeline run history"),
    ),
    info(
        title = "Order Metrics API",
        description = "Read API over order-derived product financial metrics",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
