//! Integration tests for order ingestion: persistence, retries and aborts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use order_metrics::aggregation::{DateRange, aggregate_daily};
use order_metrics::config::{ExistingOrderPolicy, MetricsPolicyConfig};
use order_metrics::connectors::{OrderPage, OrderSource, PageRequest, UpstreamError};
use order_metrics::ingest::{IngestWindow, OrderIngestor};
use order_metrics::models::{CustomerFirstOrder, Order, OrderItem};
use order_metrics::normalization::FinancialStatus;
use order_metrics::repositories::{
    CustomerFirstOrderRepository, DailyMetricRepository, OrderRepository,
};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use tokio_util::sync::CancellationToken;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{OrderBuilder, ScriptedSource, page, rejected, setup_test_db, test_config};

fn window() -> IngestWindow {
    IngestWindow::since(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
}

#[tokio::test]
async fn paginates_until_no_cursor() -> Result<()> {
    let db = setup_test_db().await?;
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(page(
            vec![
                OrderBuilder::new("1001", "2025-01-05T10:00:00Z").line("P1", 50.0, 3).build(),
                OrderBuilder::new("1002", "2025-01-05T11:00:00Z").line("P2", 20.0, 1).build(),
            ],
            Some("cursor-2"),
        )),
        Ok(page(
            vec![OrderBuilder::new("1003", "2025-01-06T09:00:00Z").line("P1", 50.0, 1).build()],
            None,
        )),
    ]));
    let ingestor = OrderIngestor::new(db.clone(), source.clone(), &test_config());

    let report = ingestor.ingest(window(), &CancellationToken::new()).await;

    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.orders_fetched, 3);
    assert_eq!(report.orders_inserted, 3);
    assert!(report.is_clean());
    assert_eq!(Order::find().count(&db).await?, 3);
    assert_eq!(OrderItem::find().count(&db).await?, 3);

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].cursor.is_none());
    assert_eq!(requests[0].query.limit, 2);
    assert_eq!(requests[1].cursor.as_ref().map(|c| c.as_str()), Some("cursor-2"));
    Ok(())
}

#[tokio::test]
async fn reingesting_identical_orders_is_unchanged() -> Result<()> {
    let db = setup_test_db().await?;
    let order = OrderBuilder::new("1001", "2025-01-05T10:00:00Z")
        .line("P1", 50.0, 3)
        .email("a@example.com")
        .build();
    let config = test_config();

    for expected_inserted in [1, 0] {
        let source = Arc::new(ScriptedSource::new(vec![Ok(page(vec![order.clone()], None))]));
        let report = OrderIngestor::new(db.clone(), source, &config)
            .ingest(window(), &CancellationToken::new())
            .await;
        assert_eq!(report.orders_inserted, expected_inserted);
    }

    assert_eq!(Order::find().count(&db).await?, 1);
    assert_eq!(OrderItem::find().count(&db).await?, 1);
    assert_eq!(CustomerFirstOrder::find().count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn upsert_replaces_changed_order_and_skip_keeps_it() -> Result<()> {
    let db = setup_test_db().await?;
    let repo = OrderRepository::new(db.clone());
    let original = OrderBuilder::new("1001", "2025-01-05T10:00:00Z").line("P1", 50.0, 3).build();
    let refunded = OrderBuilder::new("1001", "2025-01-05T10:00:00Z")
        .line("P1", 50.0, 3)
        .status(FinancialStatus::Refunded)
        .build();

    repo.upsert(&original, ExistingOrderPolicy::Upsert).await?;

    let skipped = repo.upsert(&refunded, ExistingOrderPolicy::Skip).await?;
    assert_eq!(skipped, order_metrics::repositories::UpsertOutcome::Skipped);
    let (stored, _) = repo.find_by_external_id("1001").await?.expect("order stored");
    assert_eq!(stored.financial_status, "paid");

    let updated = repo.upsert(&refunded, ExistingOrderPolicy::Upsert).await?;
    assert_eq!(updated, order_metrics::repositories::UpsertOutcome::Updated);
    let (stored, items) = repo.find_by_external_id("1001").await?.expect("order stored");
    assert_eq!(stored.financial_status, "refunded");
    assert_eq!(items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_orders_are_counted_and_page_continues() -> Result<()> {
    let db = setup_test_db().await?;
    let mut first = page(
        vec![OrderBuilder::new("1001", "2025-01-05T10:00:00Z").line("P1", 10.0, 1).build()],
        None,
    );
    first.rejected.push(rejected("1002", "line 7 has non-positive quantity 0"));
    let source = Arc::new(ScriptedSource::new(vec![Ok(first)]));

    let report = OrderIngestor::new(db.clone(), source, &test_config())
        .ingest(window(), &CancellationToken::new())
        .await;

    assert_eq!(report.orders_fetched, 2);
    assert_eq!(report.orders_inserted, 1);
    assert_eq!(report.orders_failed, 1);
    assert!(report.errors[0].contains("1002"));
    assert!(report.aborted.is_none());
    assert!(!report.is_clean());
    Ok(())
}

#[tokio::test]
async fn rate_limit_is_retried_for_the_same_page() -> Result<()> {
    let db = setup_test_db().await?;
    let source = Arc::new(ScriptedSource::new(vec![
        Err(UpstreamError::RateLimited {
            retry_after: Some(Duration::ZERO),
        }),
        Err(UpstreamError::Transient("connection reset".to_string())),
        Ok(page(
            vec![OrderBuilder::new("1001", "2025-01-05T10:00:00Z").line("P1", 10.0, 1).build()],
            None,
        )),
    ]));

    let report = OrderIngestor::new(db.clone(), source.clone(), &test_config())
        .ingest(window(), &CancellationToken::new())
        .await;

    assert_eq!(report.retries, 2);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.orders_inserted, 1);
    assert!(report.is_clean());
    let requests = source.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.cursor.is_none()));
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_abort_pagination() -> Result<()> {
    let db = setup_test_db().await?;
    let mut config = test_config();
    config.retry_policy.max_retries = 1;
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(page(
            vec![OrderBuilder::new("1001", "2025-01-05T10:00:00Z").line("P1", 10.0, 1).build()],
            Some("cursor-2"),
        )),
        Err(UpstreamError::Transient("timeout".to_string())),
        Err(UpstreamError::Transient("timeout".to_string())),
    ]));

    let report = OrderIngestor::new(db.clone(), source, &config)
        .ingest(window(), &CancellationToken::new())
        .await;

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.retries, 1);
    assert!(report.aborted.as_deref().unwrap_or_default().contains("retries exhausted"));
    // Orders from the first page stay committed.
    assert_eq!(Order::find().count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn wait_budget_bounds_total_retry_time() -> Result<()> {
    let db = setup_test_db().await?;
    let mut config = test_config();
    config.retry_policy.max_total_wait_seconds = 1;
    let source = Arc::new(ScriptedSource::new(vec![Err(UpstreamError::RateLimited {
        retry_after: Some(Duration::from_secs(30)),
    })]));

    let report = OrderIngestor::new(db, source, &config)
        .ingest(window(), &CancellationToken::new())
        .await;

    assert_eq!(report.retries, 0);
    assert!(report.aborted.as_deref().unwrap_or_default().contains("budget"));
    Ok(())
}

#[tokio::test]
async fn fatal_error_aborts_without_retry() -> Result<()> {
    let db = setup_test_db().await?;
    let source = Arc::new(ScriptedSource::new(vec![Err(UpstreamError::Unauthorized {
        status: 401,
    })]));

    let report = OrderIngestor::new(db, source.clone(), &test_config())
        .ingest(window(), &CancellationToken::new())
        .await;

    assert_eq!(source.requests().len(), 1);
    assert_eq!(report.retries, 0);
    assert!(report.aborted.is_some());
    Ok(())
}

#[tokio::test]
async fn cancelled_token_stops_before_fetching() -> Result<()> {
    let db = setup_test_db().await?;
    let source = Arc::new(ScriptedSource::new(vec![Ok(OrderPage::default())]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = OrderIngestor::new(db, source.clone(), &test_config())
        .ingest(window(), &cancel)
        .await;

    assert!(report.cancelled);
    assert!(source.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn first_order_index_keeps_earliest() -> Result<()> {
    let db = setup_test_db().await?;
    let late = OrderBuilder::new("2002", "2025-01-09T10:00:00Z")
        .line("P1", 10.0, 1)
        .email("repeat@example.com")
        .build();
    let early = OrderBuilder::new("2001", "2025-01-03T10:00:00Z")
        .line("P1", 10.0, 1)
        .email("repeat@example.com")
        .build();
    let source = Arc::new(ScriptedSource::new(vec![Ok(page(vec![late, early], None))]));

    OrderIngestor::new(db.clone(), source, &test_config())
        .ingest(window(), &CancellationToken::new())
        .await;

    let entry = CustomerFirstOrder::find_by_id("repeat@example.com".to_string())
        .one(&db)
        .await?
        .expect("index entry");
    assert_eq!(entry.first_order_external_id, "2001");
    Ok(())
}

/// Cancels the run as soon as the wrapped source hands back a page, so the
/// cancellation lands while that page's orders are still unprocessed.
struct CancelAfterFetch {
    inner: ScriptedSource,
    cancel: CancellationToken,
}

#[async_trait]
impl OrderSource for CancelAfterFetch {
    fn name(&self) -> &'static str {
        "cancel-after-fetch"
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<OrderPage, UpstreamError> {
        let page = self.inner.fetch_page(request).await;
        self.cancel.cancel();
        page
    }
}

async fn first_order_of(db: &DatabaseConnection, email: &str) -> Result<Option<String>> {
    Ok(CustomerFirstOrder::find_by_id(email.to_string())
        .one(db)
        .await?
        .map(|entry| entry.first_order_external_id))
}

#[tokio::test]
async fn failed_order_rolls_back_and_page_continues() -> Result<()> {
    let db = setup_test_db().await?;
    // The header is valid but the line cannot be stored, so the order's
    // transaction fails after the header insert.
    let mut broken = OrderBuilder::new("1001", "2025-01-05T10:00:00Z")
        .line("P1", 10.0, 1)
        .email("broken@example.com")
        .build();
    broken.line_items[0].price = f64::NAN;
    let healthy = OrderBuilder::new("1002", "2025-01-05T11:00:00Z")
        .line("P2", 20.0, 1)
        .build();
    let source = Arc::new(ScriptedSource::new(vec![Ok(page(vec![broken, healthy], None))]));

    let report = OrderIngestor::new(db.clone(), source, &test_config())
        .ingest(window(), &CancellationToken::new())
        .await;

    assert_eq!(report.orders_failed, 1);
    assert_eq!(report.orders_inserted, 1);
    assert!(report.errors[0].contains("1001"));
    assert!(report.aborted.is_none());

    let repo = OrderRepository::new(db.clone());
    assert!(repo.find_by_external_id("1001").await?.is_none(), "no partial header");
    assert!(repo.find_by_external_id("1002").await?.is_some());
    assert_eq!(OrderItem::find().count(&db).await?, 1);
    assert_eq!(first_order_of(&db, "broken@example.com").await?, None);
    Ok(())
}

#[tokio::test]
async fn cancellation_during_page_stops_before_its_orders() -> Result<()> {
    let db = setup_test_db().await?;
    let cancel = CancellationToken::new();
    let source = Arc::new(CancelAfterFetch {
        inner: ScriptedSource::new(vec![
            Ok(page(
                vec![
                    OrderBuilder::new("1001", "2025-01-05T10:00:00Z").line("P1", 10.0, 1).build(),
                    OrderBuilder::new("1002", "2025-01-05T11:00:00Z").line("P1", 10.0, 1).build(),
                ],
                Some("cursor-2"),
            )),
            Ok(page(
                vec![OrderBuilder::new("1003", "2025-01-06T09:00:00Z").line("P1", 10.0, 1).build()],
                None,
            )),
        ]),
        cancel: cancel.clone(),
    });

    let report = OrderIngestor::new(db.clone(), source.clone(), &test_config())
        .ingest(window(), &cancel)
        .await;

    assert!(report.cancelled);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.orders_fetched, 2);
    assert_eq!(report.orders_saved(), 0);
    assert_eq!(source.inner.requests().len(), 1, "next page is never requested");
    assert_eq!(Order::find().count(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn cursor_cycle_aborts_pagination() -> Result<()> {
    let db = setup_test_db().await?;
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(page(
            vec![OrderBuilder::new("1001", "2025-01-05T10:00:00Z").line("P1", 10.0, 1).build()],
            Some("cursor-a"),
        )),
        Ok(page(
            vec![OrderBuilder::new("1002", "2025-01-05T11:00:00Z").line("P1", 10.0, 1).build()],
            Some("cursor-b"),
        )),
        Ok(page(
            vec![OrderBuilder::new("1003", "2025-01-05T12:00:00Z").line("P1", 10.0, 1).build()],
            Some("cursor-a"),
        )),
        Ok(page(Vec::new(), Some("cursor-b"))),
    ]));

    let report = OrderIngestor::new(db.clone(), source.clone(), &test_config())
        .ingest(window(), &CancellationToken::new())
        .await;

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(source.requests().len(), 3);
    assert!(
        report
            .aborted
            .as_deref()
            .unwrap_or_default()
            .contains("cursor-a")
    );
    // Orders from pages before the cycle stay committed.
    assert_eq!(Order::find().count(&db).await?, 3);
    Ok(())
}

#[tokio::test]
async fn rewritten_order_moves_first_order_entries() -> Result<()> {
    let db = setup_test_db().await?;
    let repo = OrderRepository::new(db.clone());
    let first = OrderBuilder::new("5001", "2025-01-01T10:00:00Z")
        .line("P1", 10.0, 1)
        .email("x@example.com")
        .build();
    let second = OrderBuilder::new("5002", "2025-01-02T10:00:00Z")
        .line("P1", 10.0, 1)
        .email("x@example.com")
        .build();
    repo.upsert(&first, ExistingOrderPolicy::Upsert).await?;
    repo.upsert(&second, ExistingOrderPolicy::Upsert).await?;
    assert_eq!(first_order_of(&db, "x@example.com").await?.as_deref(), Some("5001"));

    // Upstream corrects the email on the earliest order.
    let corrected = OrderBuilder::new("5001", "2025-01-01T10:00:00Z")
        .line("P1", 10.0, 1)
        .email("y@example.com")
        .build();
    let source = Arc::new(ScriptedSource::new(vec![Ok(page(vec![corrected], None))]));
    let report = OrderIngestor::new(db.clone(), source, &test_config())
        .ingest(window(), &CancellationToken::new())
        .await;
    assert_eq!(report.orders_updated, 1);

    assert_eq!(first_order_of(&db, "x@example.com").await?.as_deref(), Some("5002"));
    assert_eq!(first_order_of(&db, "y@example.com").await?.as_deref(), Some("5001"));

    let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    aggregate_daily(&db, DateRange::single(day), &MetricsPolicyConfig::default()).await?;
    let rows = DailyMetricRepository::new(db.clone())
        .find_range(None, day, day)
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].new_customers, 1);
    Ok(())
}

#[tokio::test]
async fn order_moved_later_gives_up_first_order() -> Result<()> {
    let db = setup_test_db().await?;
    let repo = OrderRepository::new(db.clone());
    for (id, at) in [("6001", "2025-01-01T10:00:00Z"), ("6002", "2025-01-03T10:00:00Z")] {
        let order = OrderBuilder::new(id, at)
            .line("P1", 10.0, 1)
            .email("z@example.com")
            .build();
        repo.upsert(&order, ExistingOrderPolicy::Upsert).await?;
    }

    let moved = OrderBuilder::new("6001", "2025-01-05T10:00:00Z")
        .line("P1", 10.0, 1)
        .email("z@example.com")
        .build();
    let outcome = repo.upsert(&moved, ExistingOrderPolicy::Upsert).await?;

    assert_eq!(outcome, order_metrics::repositories::UpsertOutcome::Updated);
    assert_eq!(first_order_of(&db, "z@example.com").await?.as_deref(), Some("6002"));
    Ok(())
}

#[tokio::test]
async fn rebuild_derives_index_from_stored_orders() -> Result<()> {
    let db = setup_test_db().await?;
    let repo = OrderRepository::new(db.clone());
    let orders = [
        OrderBuilder::new("7002", "2025-01-04T10:00:00Z").email("a@example.com"),
        // Earlier instant despite the later wall-clock time.
        OrderBuilder::new("7001", "2025-01-04T12:00:00+05:00").email("a@example.com"),
        OrderBuilder::new("7003", "2025-01-02T10:00:00Z").email("b@example.com"),
        OrderBuilder::new("7004", "2025-01-01T10:00:00Z"),
    ];
    for builder in orders {
        repo.upsert(&builder.line("P1", 10.0, 1).build(), ExistingOrderPolicy::Upsert)
            .await?;
    }
    CustomerFirstOrder::delete_many().exec(&db).await?;

    let indexed = CustomerFirstOrderRepository::new(db.clone()).rebuild().await?;

    assert_eq!(indexed, 2);
    assert_eq!(first_order_of(&db, "a@example.com").await?.as_deref(), Some("7001"));
    assert_eq!(first_order_of(&db, "b@example.com").await?.as_deref(), Some("7003"));
    Ok(())
}
