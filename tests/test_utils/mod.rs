//! Test utilities shared by the integration tests.
//!
//! In-memory SQLite with all migrations applied, order fixtures and a
//! scripted `OrderSource` that replays canned pages.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use migration::{Migrator, MigratorTrait};
use order_metrics::config::AppConfig;
use order_metrics::connectors::{
    OrderPage, OrderSource, PageCursor, PageRequest, RejectedOrder, UpstreamError,
};
use order_metrics::normalization::{
    CustomerIdentity, FinancialStatus, FulfillmentStatus, NormalizedLineItem, NormalizedOrder,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    // Every pooled connection to `:memory:` would see its own empty database.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Configuration for tests: fake shop credentials and retries without real waits.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database_url = "sqlite::memory:".to_string();
    config.shopify.shop_domain = Some("test-shop.myshopify.com".to_string());
    config.shopify.access_token = Some("shpat_test_token".to_string());
    config.shopify.page_size = 2;
    config.retry_policy.default_wait_seconds = 0;
    config.retry_policy.max_retries = 3;
    config
}

/// Builder for normalized orders.
pub struct OrderBuilder {
    order: NormalizedOrder,
}

impl OrderBuilder {
    /// A paid, unfulfilled order with no lines, no tax and no shipping.
    pub fn new(external_id: &str, created_at: &str) -> Self {
        let created_at = DateTime::parse_from_rfc3339(created_at).expect("valid RFC 3339 timestamp");
        Self {
            order: NormalizedOrder {
                external_id: external_id.to_string(),
                name: Some(format!("#{external_id}")),
                created_at,
                processed_at: Some(created_at),
                updated_at: Some(created_at),
                financial_status: FinancialStatus::Paid,
                fulfillment_status: FulfillmentStatus::Unfulfilled,
                subtotal_price: 0.0,
                total_tax: 0.0,
                total_discounts: 0.0,
                total_shipping: 0.0,
                total_refunded: 0.0,
                total_price: 0.0,
                currency: Some("USD".to_string()),
                customer: CustomerIdentity::default(),
                line_items: Vec::new(),
            },
        }
    }

    /// Adds a line and grows subtotal and total price by its value.
    pub fn line(mut self, product_id: &str, price: f64, quantity: i32) -> Self {
        self.push_line(Some(product_id), price, quantity, None);
        self
    }

    pub fn line_with_cost(mut self, product_id: &str, price: f64, quantity: i32, cost: f64) -> Self {
        self.push_line(Some(product_id), price, quantity, Some(cost));
        self
    }

    pub fn custom_line(mut self, price: f64, quantity: i32) -> Self {
        self.push_line(None, price, quantity, None);
        self
    }

    fn push_line(&mut self, product_id: Option<&str>, price: f64, quantity: i32, cost: Option<f64>) {
        let index = self.order.line_items.len() + 1;
        self.order.line_items.push(NormalizedLineItem {
            external_line_id: Some(format!("{}-{index}", self.order.external_id)),
            product_id: product_id.map(str::to_string),
            variant_id: None,
            sku: None,
            title: product_id.map(|p| format!("Product {p}")),
            quantity,
            price,
            cost,
            total_discount: 0.0,
            fulfillment_status: None,
        });
        let value = price * f64::from(quantity);
        self.order.subtotal_price += value;
        self.order.total_price += value;
    }

    pub fn tax(mut self, amount: f64) -> Self {
        self.order.total_tax = amount;
        self.order.total_price += amount;
        self
    }

    pub fn shipping(mut self, amount: f64) -> Self {
        self.order.total_shipping = amount;
        self.order.total_price += amount;
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.order.customer.email = Some(email.to_lowercase());
        self
    }

    pub fn status(mut self, status: FinancialStatus) -> Self {
        self.order.financial_status = status;
        self
    }

    pub fn fulfilled(mut self) -> Self {
        self.order.fulfillment_status = FulfillmentStatus::Fulfilled;
        self
    }

    pub fn build(self) -> NormalizedOrder {
        self.order
    }
}

/// One page of orders, with an optional continuation cursor.
pub fn page(orders: Vec<NormalizedOrder>, next: Option<&str>) -> OrderPage {
    OrderPage {
        orders,
        rejected: Vec::new(),
        next: next.map(|c| PageCursor(c.to_string())),
    }
}

pub fn rejected(external_id: &str, reason: &str) -> RejectedOrder {
    RejectedOrder {
        external_id: Some(external_id.to_string()),
        reason: reason.to_string(),
    }
}

/// An `OrderSource` that returns scripted responses in order and records
/// every request it receives.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<OrderPage, UpstreamError>>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<OrderPage, UpstreamError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl OrderSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<OrderPage, UpstreamError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Ok(OrderPage::default()))
    }
}
