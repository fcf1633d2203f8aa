//! Order ingestion
//!
//! Pages through an [`OrderSource`] for a creation window and persists every
//! order in its own transaction. Rate limits and transient failures are
//! waited out in place, within a bounded retry budget; anything else aborts
//! pagination while keeping what was already committed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::config::{AppConfig, ExistingOrderPolicy, RetryPolicyConfig};
use crate::connectors::{
    OrderPage, OrderQuery, OrderSource, PageCursor, PageRequest, UpstreamError,
};
use crate::repositories::{OrderRepository, UpsertOutcome};

/// Error messages kept in a report; later ones are only counted.
const MAX_REPORTED_ERRORS: usize = 50;

/// Creation-time window to ingest. A start is always required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl IngestWindow {
    pub fn since(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IngestReport {
    pub pages_fetched: u64,
    pub orders_fetched: u64,
    pub orders_inserted: u64,
    pub orders_updated: u64,
    pub orders_unchanged: u64,
    pub orders_skipped: u64,
    pub orders_failed: u64,
    pub retries: u64,
    pub total_wait_ms: u64,
    pub errors: Vec<String>,
    /// Why pagination stopped early, if it did
    pub aborted: Option<String>,
    pub cancelled: bool,
}

impl IngestReport {
    pub fn orders_saved(&self) -> u64 {
        self.orders_inserted + self.orders_updated
    }

    pub fn is_clean(&self) -> bool {
        self.orders_failed == 0 && self.aborted.is_none() && !self.cancelled
    }

    fn push_error(&mut self, message: String) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message);
        }
    }
}

enum PageFetch {
    Page(OrderPage),
    Aborted(String),
    Cancelled,
}

pub struct OrderIngestor {
    source: Arc<dyn OrderSource>,
    orders: OrderRepository,
    retry: RetryPolicyConfig,
    page_size: u32,
    policy: ExistingOrderPolicy,
}

impl OrderIngestor {
    pub fn new(db: DatabaseConnection, source: Arc<dyn OrderSource>, config: &AppConfig) -> Self {
        Self {
            source,
            orders: OrderRepository::new(db),
            retry: config.retry_policy.clone(),
            page_size: config.shopify.page_size,
            policy: config.metrics_policy.existing_order_policy,
        }
    }

    /// Ingest every order created in `window`. Never fails: problems are
    /// recorded in the returned report.
    #[instrument(skip_all, fields(source = self.source.name(), start = %window.start))]
    pub async fn ingest(&self, window: IngestWindow, cancel: &CancellationToken) -> IngestReport {
        let mut report = IngestReport::default();
        let mut request = PageRequest::first(OrderQuery {
            created_at_min: window.start,
            created_at_max: window.end,
            limit: self.page_size,
        });
        let mut seen_cursors: HashSet<PageCursor> = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let page = match self.fetch_with_retry(&request, &mut report, cancel).await {
                PageFetch::Page(page) => page,
                PageFetch::Aborted(reason) => {
                    warn!(page = report.pages_fetched + 1, %reason, "Aborting pagination");
                    report.aborted = Some(reason);
                    break;
                }
                PageFetch::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            };

            report.pages_fetched += 1;
            report.orders_fetched += page.len() as u64;
            let failed_before = report.orders_failed;
            let saved_before = report.orders_saved();

            for rejected in &page.rejected {
                report.orders_failed += 1;
                counter!("orders_failed_total").increment(1);
                let id = rejected.external_id.as_deref().unwrap_or("<unknown>");
                warn!(order = id, reason = %rejected.reason, "Skipping malformed order");
                report.push_error(format!("order {}: {}", id, rejected.reason));
            }

            for order in &page.orders {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                match self.orders.upsert(order, self.policy).await {
                    Ok(outcome) => {
                        match outcome {
                            UpsertOutcome::Inserted => report.orders_inserted += 1,
                            UpsertOutcome::Updated => report.orders_updated += 1,
                            UpsertOutcome::Unchanged => report.orders_unchanged += 1,
                            UpsertOutcome::Skipped => report.orders_skipped += 1,
                        }
                        if matches!(outcome, UpsertOutcome::Inserted | UpsertOutcome::Updated) {
                            counter!("orders_ingested_total").increment(1);
                        }
                    }
                    Err(e) => {
                        report.orders_failed += 1;
                        counter!("orders_failed_total").increment(1);
                        warn!(order = %order.external_id, error = %e, "Failed to persist order");
                        report.push_error(format!("order {}: {}", order.external_id, e));
                    }
                }
            }

            info!(
                page = report.pages_fetched,
                fetched = page.len(),
                saved = report.orders_saved() - saved_before,
                failed = report.orders_failed - failed_before,
                "Processed orders page"
            );

            if report.cancelled {
                break;
            }
            match page.next {
                Some(cursor) if !seen_cursors.insert(cursor.clone()) => {
                    report.aborted = Some(format!(
                        "upstream repeated page cursor {}",
                        cursor.as_str()
                    ));
                    break;
                }
                Some(cursor) => request = request.next(cursor),
                None => break,
            }
        }

        info!(
            pages = report.pages_fetched,
            fetched = report.orders_fetched,
            inserted = report.orders_inserted,
            updated = report.orders_updated,
            unchanged = report.orders_unchanged,
            skipped = report.orders_skipped,
            failed = report.orders_failed,
            retries = report.retries,
            cancelled = report.cancelled,
            aborted = report.aborted.is_some(),
            "Ingestion finished"
        );
        report
    }

    async fn fetch_with_retry(
        &self,
        request: &PageRequest,
        report: &mut IngestReport,
        cancel: &CancellationToken,
    ) -> PageFetch {
        let mut attempts: u32 = 0;
        loop {
            let error = match self.source.fetch_page(request).await {
                Ok(page) => return PageFetch::Page(page),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return PageFetch::Aborted(error.to_string());
            }
            if attempts >= self.retry.max_retries {
                return PageFetch::Aborted(format!(
                    "retries exhausted after {} attempts: {}",
                    attempts + 1,
                    error
                ));
            }

            let wait = self.wait_for(&error);
            let budget = Duration::from_secs(self.retry.max_total_wait_seconds);
            let spent = Duration::from_millis(report.total_wait_ms);
            if spent + wait > budget {
                return PageFetch::Aborted(format!(
                    "retry wait budget of {}s exhausted: {}",
                    self.retry.max_total_wait_seconds, error
                ));
            }

            attempts += 1;
            report.retries += 1;
            report.total_wait_ms += wait.as_millis() as u64;
            if matches!(error, UpstreamError::RateLimited { .. }) {
                counter!("upstream_rate_limited_total").increment(1);
            }
            histogram!("upstream_retry_wait_seconds").record(wait.as_secs_f64());
            debug!(attempt = attempts, wait_ms = wait.as_millis() as u64, error = %error, "Waiting before retry");

            tokio::select! {
                _ = cancel.cancelled() => return PageFetch::Cancelled,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn wait_for(&self, error: &UpstreamError) -> Duration {
        let cap = Duration::from_secs(self.retry.max_single_wait_seconds);
        let requested = match error {
            UpstreamError::RateLimited {
                retry_after: Some(after),
            } => *after,
            _ => Duration::from_secs(self.retry.default_wait_seconds),
        };
        requested.min(cap)
    }
}
