//! Pipeline orchestration
//!
//! One run is: acquire the store's advisory lock, ingest the window, rebuild
//! daily rows for the window's dates, rebuild the summary, persist the run
//! report and release the lock. Stages execute sequentially; the only
//! suspension points are I/O.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Days, NaiveDate, Utc};
use metrics::histogram;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregation::{
    AggregationReport, DateRange, InvalidDateRange, SummaryReport, aggregate_daily,
    summarize_products,
};
use crate::config::AppConfig;
use crate::connectors::OrderSource;
use crate::error::RepositoryError;
use crate::ingest::{IngestReport, IngestWindow, OrderIngestor};
use crate::repositories::{LockOutcome, NewSyncRun, SyncLockRepository, SyncRunRepository};
use crate::telemetry::{self, RunContext};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sync lock for {store_key} is held by run {run_id}")]
    Locked { store_key: String, run_id: Uuid },
    #[error("ingestion requested but no order source is configured")]
    MissingSource,
    #[error(transparent)]
    InvalidRange(#[from] InvalidDateRange),
    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: RepositoryError,
    },
}

impl PipelineError {
    fn stage(stage: &'static str) -> impl FnOnce(RepositoryError) -> Self {
        move |source| Self::Stage { stage, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Cancelled,
    Failed,
    Locked,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Locked => "locked",
        }
    }
}

/// What a run should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub window: IngestWindow,
    /// Fetch from the upstream before aggregating
    pub ingest: bool,
    /// Reference day for summary windows; defaults to the current UTC date
    pub today: Option<NaiveDate>,
}

impl RunRequest {
    pub fn new(window: IngestWindow) -> Self {
        Self {
            window,
            ingest: true,
            today: None,
        }
    }

    pub fn aggregate_only(window: IngestWindow) -> Self {
        Self {
            ingest: false,
            ..Self::new(window)
        }
    }

    /// Calendar dates whose daily rows a run rebuilds.
    ///
    /// Order dates follow each order's own UTC offset, so the UTC window is
    /// widened by a day on both sides to cover orders near its edges.
    pub fn aggregation_range(&self, now: DateTime<Utc>) -> Result<DateRange, InvalidDateRange> {
        let start = self.window.start.date_naive();
        let end = self.window.end.unwrap_or(now).date_naive();
        DateRange::new(start, end)?;
        Ok(DateRange {
            start: start.checked_sub_days(Days::new(1)).unwrap_or(start),
            end: end.checked_add_days(Days::new(1)).unwrap_or(end),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunReport {
    pub run_id: Uuid,
    pub store_key: String,
    pub status: RunStatus,
    pub range: Option<DateRange>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub ingest: Option<IngestReport>,
    pub aggregation: Option<AggregationReport>,
    pub summary: Option<SummaryReport>,
    pub errors: Vec<String>,
}

impl RunReport {
    fn new(run_id: Uuid, store_key: String) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            store_key,
            status: RunStatus::Completed,
            range: None,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            ingest: None,
            aggregation: None,
            summary: None,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, error: PipelineError) {
        error!(error = %error, "Pipeline stage failed");
        self.status = RunStatus::Failed;
        self.errors.push(error.to_string());
    }

    fn has_stage_errors(&self) -> bool {
        let ingest = self.ingest.as_ref().is_some_and(|r| !r.is_clean());
        let aggregation = self
            .aggregation
            .as_ref()
            .is_some_and(|r| !r.failed_keys.is_empty());
        ingest || aggregation || !self.errors.is_empty()
    }
}

pub struct Pipeline {
    db: DatabaseConnection,
    config: AppConfig,
    source: Option<Arc<dyn OrderSource>>,
}

impl Pipeline {
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        Self {
            db,
            config,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn OrderSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Execute one run. Failures are reported in the returned [`RunReport`],
    /// never raised.
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> RunReport {
        let run_id = Uuid::new_v4();
        let store_key = self.config.store_key();
        telemetry::with_run_context(
            RunContext { run_id },
            self.run_locked(run_id, store_key, request, cancel),
        )
        .await
    }

    #[instrument(skip_all, fields(run_id = %run_id, store_key = %store_key))]
    async fn run_locked(
        &self,
        run_id: Uuid,
        store_key: String,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(run_id, store_key.clone());

        match request.aggregation_range(report.started_at) {
            Ok(range) => report.range = Some(range),
            Err(e) => {
                report.fail(e.into());
                return self.finish(report, started);
            }
        }
        if request.ingest && self.source.is_none() {
            report.fail(PipelineError::MissingSource);
            return self.finish(report, started);
        }

        let locks = SyncLockRepository::new(self.db.clone());
        match locks
            .try_acquire(&store_key, run_id, self.config.sync_lock_ttl())
            .await
        {
            Ok(LockOutcome::Held { run_id: holder, .. }) => {
                warn!(holder = %holder, "Another run holds the sync lock");
                report.status = RunStatus::Locked;
                report.errors.push(
                    PipelineError::Locked {
                        store_key,
                        run_id: holder,
                    }
                    .to_string(),
                );
                return self.finish(report, started);
            }
            Ok(_) => {}
            Err(e) => {
                report.fail(PipelineError::stage("lock")(e));
                return self.finish(report, started);
            }
        }

        if let Err(e) = self.run_stages(&request, &mut report, &cancel).await {
            report.fail(e);
        }
        if report.status == RunStatus::Completed && report.has_stage_errors() {
            report.status = RunStatus::CompletedWithErrors;
        }

        let report = self.finish(report, started);
        self.persist(&report).await;
        match locks.release(&report.store_key, run_id).await {
            Ok(true) => {}
            Ok(false) => warn!("Sync lock was already gone at release"),
            Err(e) => warn!(error = %e, "Failed to release sync lock"),
        }
        report
    }

    async fn run_stages(
        &self,
        request: &RunRequest,
        report: &mut RunReport,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let range = match report.range {
            Some(range) => range,
            None => request.aggregation_range(report.started_at)?,
        };

        if request.ingest {
            let source = self.source.clone().ok_or(PipelineError::MissingSource)?;
            let ingestor = OrderIngestor::new(self.db.clone(), source, &self.config);
            let ingested = ingestor.ingest(request.window, cancel).await;
            let cancelled = ingested.cancelled;
            report.ingest = Some(ingested);
            if cancelled {
                report.status = RunStatus::Cancelled;
                return Ok(());
            }
        }

        if cancel.is_cancelled() {
            report.status = RunStatus::Cancelled;
            return Ok(());
        }
        let policy = &self.config.metrics_policy;
        report.aggregation = Some(
            aggregate_daily(&self.db, range, policy)
                .await
                .map_err(PipelineError::stage("aggregation"))?,
        );

        if cancel.is_cancelled() {
            report.status = RunStatus::Cancelled;
            return Ok(());
        }
        let today = request.today.unwrap_or_else(|| Utc::now().date_naive());
        report.summary = Some(
            summarize_products(&self.db, today, policy)
                .await
                .map_err(PipelineError::stage("summary"))?,
        );
        Ok(())
    }

    fn finish(&self, mut report: RunReport, started: Instant) -> RunReport {
        report.finished_at = Utc::now();
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        histogram!("pipeline_run_duration_seconds", "status" => report.status.as_str())
            .record(started.elapsed().as_secs_f64());
        info!(
            status = report.status.as_str(),
            duration_ms = report.duration_ms,
            errors = report.errors.len(),
            "Pipeline run finished"
        );
        report
    }

    async fn persist(&self, report: &RunReport) {
        let Some(range) = report.range else {
            return;
        };
        let json = match serde_json::to_value(report) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize run report");
                serde_json::Value::Null
            }
        };
        let run = NewSyncRun {
            id: report.run_id,
            store_key: report.store_key.clone(),
            status: report.status.as_str().to_string(),
            window_start: range.start,
            window_end: range.end,
            started_at: report.started_at.fixed_offset(),
            finished_at: report.finished_at.fixed_offset(),
            report: json,
        };
        if let Err(e) = SyncRunRepository::new(self.db.clone()).record(run).await {
            warn!(error = %e, "Failed to persist run report");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn aggregation_range_is_widened_by_a_day() {
        let window = IngestWindow::between(
            Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 7, 12, 0, 0).unwrap(),
        );
        let range = RunRequest::new(window).aggregation_range(Utc::now()).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 1, 8).unwrap());
    }

    #[test]
    fn open_window_ends_now() {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
        let window = IngestWindow::since(Utc.with_ymd_and_hms(2025, 1, 30, 0, 0, 0).unwrap());
        let range = RunRequest::aggregate_only(window)
            .aggregation_range(now)
            .unwrap();
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 2, 2).unwrap());
    }

    #[test]
    fn reversed_window_is_rejected() {
        let window = IngestWindow::between(
            Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap(),
        );
        assert!(RunRequest::new(window).aggregation_range(Utc::now()).is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed_with_errors\"");
    }
}
