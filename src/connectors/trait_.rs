//! Order source trait definition
//!
//! Defines the interface every upstream order feed implements, along with the
//! error taxonomy the ingestion loop uses to decide between retrying and
//! aborting.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalization::NormalizedOrder;

/// Upstream failure classes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpstreamError {
    /// HTTP 429; `retry_after` comes from the `Retry-After` header when present
    #[error("rate limited by upstream{}", format_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    /// 5xx responses and network failures
    #[error("transient upstream failure: {0}")]
    Transient(String),
    /// 401/403
    #[error("upstream rejected credentials (status {status})")]
    Unauthorized { status: u16 },
    /// Any other non-success status
    #[error("upstream returned status {status}: {body}")]
    Fatal { status: u16, body: String },
    /// Response body could not be interpreted
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(after) => format!(" (retry after {:.3}s)", after.as_secs_f64()),
        None => String::new(),
    }
}

impl UpstreamError {
    /// Whether the same request may succeed after waiting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }
}

/// Created-at window for an ingestion run. The start is mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {
    pub created_at_min: DateTime<Utc>,
    pub created_at_max: Option<DateTime<Utc>>,
    /// Orders per page
    pub limit: u32,
}

/// Opaque continuation token returned by the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageCursor(pub String);

impl PageCursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A single page fetch: the first page carries the filters, later pages
/// carry only the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub query: OrderQuery,
    pub cursor: Option<PageCursor>,
}

impl PageRequest {
    pub fn first(query: OrderQuery) -> Self {
        Self {
            query,
            cursor: None,
        }
    }

    pub fn next(&self, cursor: PageCursor) -> Self {
        Self {
            query: self.query,
            cursor: Some(cursor),
        }
    }
}

/// An order present in the page that could not be normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedOrder {
    pub external_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderPage {
    pub orders: Vec<NormalizedOrder>,
    pub rejected: Vec<RejectedOrder>,
    pub next: Option<PageCursor>,
}

impl OrderPage {
    /// Number of order records the upstream returned in this page.
    pub fn len(&self) -> usize {
        self.orders.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Paginated upstream order feed.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Short name used in logs and run reports.
    fn name(&self) -> &'static str;

    /// Fetch one page of orders.
    async fn fetch_page(&self, request: &PageRequest) -> Result<OrderPage, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(UpstreamError::RateLimited { retry_after: None }.is_retryable());
        assert!(UpstreamError::Transient("timeout".into()).is_retryable());
        assert!(!UpstreamError::Unauthorized { status: 401 }.is_retryable());
        assert!(
            !UpstreamError::Fatal {
                status: 404,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!UpstreamError::Malformed("eof".into()).is_retryable());
    }

    #[test]
    fn rate_limit_message_includes_wait() {
        let err = UpstreamError::RateLimited {
            retry_after: Some(Duration::from_millis(1500)),
        };
        assert_eq!(err.to_string(), "rate limited by upstream (retry after 1.500s)");
    }
}
