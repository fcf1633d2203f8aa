//! Integration tests for the Shopify order source against a mocked Admin API.

use chrono::{TimeZone, Utc};
use order_metrics::config::ShopifyConfig;
use order_metrics::connectors::{
    OrderQuery, OrderSource, PageCursor, PageRequest, ShopifyOrderSource, UpstreamError,
};
use order_metrics::normalization::FinancialStatus;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORDERS_PATH: &str = "/admin/api/2024-01/orders.json";

fn source(server: &MockServer) -> ShopifyOrderSource {
    let config = ShopifyConfig {
        shop_domain: Some("test-shop.myshopify.com".to_string()),
        access_token: Some("shpat_test_token".to_string()),
        api_base: Some(server.uri()),
        ..ShopifyConfig::default()
    };
    ShopifyOrderSource::from_config(&config).expect("source builds")
}

fn first_page() -> PageRequest {
    PageRequest::first(OrderQuery {
        created_at_min: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        created_at_max: None,
        limit: 50,
    })
}

fn order_json(id: u64, quantity: i64) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("#{id}"),
        "email": "Buyer@Example.com",
        "created_at": "2025-01-05T10:00:00-05:00",
        "financial_status": "paid",
        "fulfillment_status": null,
        "currency": "USD",
        "subtotal_price": "150.00",
        "total_tax": "12.00",
        "total_discounts": "0.00",
        "total_price": "167.00",
        "shipping_lines": [{ "price": "5.00" }],
        "line_items": [{
            "id": id * 10,
            "product_id": 111,
            "variant_id": 222,
            "sku": "SKU-1",
            "title": "Widget",
            "quantity": quantity,
            "price": "50.00",
            "total_discount": "0.00"
        }]
    })
}

#[tokio::test]
async fn first_page_sends_window_filters_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(header("X-Shopify-Access-Token", "shpat_test_token"))
        .and(query_param("limit", "50"))
        .and(query_param("status", "any"))
        .and(query_param("created_at_min", "2025-01-01T00:00:00Z"))
        .and(query_param_is_missing("page_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [order_json(1001, 3)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = source(&server).fetch_page(&first_page()).await.unwrap();

    assert_eq!(page.orders.len(), 1);
    assert!(page.next.is_none());
    let order = &page.orders[0];
    assert_eq!(order.external_id, "1001");
    assert_eq!(order.financial_status, FinancialStatus::Paid);
    assert_eq!(order.customer.email.as_deref(), Some("buyer@example.com"));
    assert_eq!(order.total_shipping, 5.0);
    assert_eq!(order.order_date().to_string(), "2025-01-05");
    assert_eq!(order.line_items[0].product_id.as_deref(), Some("111"));
    assert_eq!(order.line_items[0].quantity, 3);
}

#[tokio::test]
async fn next_page_cursor_comes_from_link_header() {
    let server = MockServer::start().await;
    let link = format!(
        "<{}{}?limit=50&page_info=cursor-2>; rel=\"next\"",
        server.uri(),
        ORDERS_PATH
    );
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("page_info", "cursor-2"))
        .and(query_param_is_missing("status"))
        .and(query_param_is_missing("created_at_min"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [order_json(1002, 1)]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param_is_missing("page_info"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", link.as_str())
                .set_body_json(json!({ "orders": [order_json(1001, 1)] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server);
    let first = source.fetch_page(&first_page()).await.unwrap();
    assert_eq!(first.next, Some(PageCursor("cursor-2".to_string())));

    let request = first_page().next(first.next.clone().unwrap());
    let second = source.fetch_page(&request).await.unwrap();
    assert_eq!(second.orders[0].external_id, "1002");
    assert!(second.next.is_none());
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2.5"))
        .mount(&server)
        .await;

    let err = source(&server).fetch_page(&first_page()).await.unwrap_err();
    match err {
        UpstreamError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(std::time::Duration::from_millis(2500)));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn status_codes_map_to_error_taxonomy() {
    let cases = [
        (401, "unauthorized"),
        (403, "unauthorized"),
        (503, "transient"),
        (404, "fatal"),
    ];
    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ORDERS_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = source(&server).fetch_page(&first_page()).await.unwrap_err();
        let kind = match err {
            UpstreamError::Unauthorized { .. } => "unauthorized",
            UpstreamError::Transient(_) => "transient",
            UpstreamError::Fatal { status: s, .. } => {
                assert_eq!(s, status);
                "fatal"
            }
            other => panic!("unexpected error for {status}: {other:?}"),
        };
        assert_eq!(kind, expected, "status {status}");
    }
}

#[tokio::test]
async fn unparseable_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = source(&server).fetch_page(&first_page()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Malformed(_)));
}

#[tokio::test]
async fn invalid_order_is_rejected_without_failing_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [order_json(1001, 2), order_json(1002, 0)]
        })))
        .mount(&server)
        .await;

    let page = source(&server).fetch_page(&first_page()).await.unwrap();
    assert_eq!(page.orders.len(), 1);
    assert_eq!(page.rejected.len(), 1);
    assert_eq!(page.rejected[0].external_id.as_deref(), Some("1002"));
    assert_eq!(page.len(), 2);
}
