//! # Sync Runs Endpoint Handler
//!
//! Lists persisted pipeline run reports, most recent first.

use axum::extract::rejection::QueryRejection;
use axum::{extract::Query, extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, validation_error};
use crate::models::sync_run;
use crate::repositories::SyncRunRepository;
use crate::server::AppState;

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListSyncRunsQuery {
    /// Filter by store key
    pub store_key: Option<String>,
    /// Maximum number of runs to return (default: 20, max: 100)
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncRunInfo {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    #[schema(example = "example.myshopify.com")]
    pub store_key: String,
    #[schema(example = "completed")]
    pub status: String,
    #[schema(example = "2025-01-04")]
    pub window_start: String,
    #[schema(example = "2025-01-08")]
    pub window_end: String,
    #[schema(example = "2025-01-07T10:30:00+00:00")]
    pub started_at: String,
    #[schema(example = "2025-01-07T10:30:05+00:00")]
    pub finished_at: String,
    /// Full run report as persisted
    pub report: serde_json::Value,
}

impl From<sync_run::Model> for SyncRunInfo {
    fn from(run: sync_run::Model) -> Self {
        Self {
            id: run.id.to_string(),
            store_key: run.store_key,
            status: run.status,
            window_start: run.window_start.to_string(),
            window_end: run.window_end.to_string(),
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.to_rfc3339(),
            report: run.report,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncRunsResponse {
    pub runs: Vec<SyncRunInfo>,
}

/// List recent pipeline runs
#[utoipa::path(
    get,
    path = "/sync/runs",
    params(ListSyncRunsQuery),
    responses(
        (status = 200, description = "Recent runs", body = SyncRunsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn list_sync_runs(
    State(state): State<AppState>,
    query: Result<Query<ListSyncRunsQuery>, QueryRejection>,
) -> Result<Json<SyncRunsResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(validation_error(
            &format!("limit must be between 1 and {MAX_LIMIT}"),
            json!({ "limit": limit }),
        ));
    }

    let runs = SyncRunRepository::new(state.db.clone())
        .list_recent(query.store_key.as_deref(), limit)
        .await?;
    Ok(Json(SyncRunsResponse {
        runs: runs.into_iter().map(SyncRunInfo::from).collect(),
    }))
}
