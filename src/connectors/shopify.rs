//! Shopify order source
//!
//! Reads the Admin REST `orders.json` endpoint. The first request filters by
//! creation window and status; follow-up pages are addressed solely through the
//! `page_info` cursor from the `Link` header, as the API rejects filters
//! alongside a cursor.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use regex::Regex;
use reqwest::{StatusCode, header::HeaderMap};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ConfigError, ShopifyConfig};
use crate::connectors::trait_::{
    OrderPage, OrderSource, PageCursor, PageRequest, RejectedOrder, UpstreamError,
};
use crate::normalization::{
    CustomerIdentity, FinancialStatus, FulfillmentStatus, NormalizedLineItem, NormalizedOrder,
    normalize_email,
};

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const USER_AGENT: &str = concat!("order-metrics/", env!("CARGO_PKG_VERSION"));
const BODY_SNIPPET_CHARS: usize = 200;

pub struct ShopifyOrderSource {
    client: reqwest::Client,
    endpoint: Url,
    access_token: String,
    order_status: String,
}

impl ShopifyOrderSource {
    /// Build a source from configuration. Credentials must be present.
    pub fn from_config(config: &ShopifyConfig) -> Result<Self, ConfigError> {
        let base = config.base_url()?;
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingAccessToken)?;
        let raw = format!("{}/admin/api/{}/orders.json", base, config.api_version);
        let endpoint = Url::parse(&raw).map_err(|source| ConfigError::InvalidApiBase {
            value: raw.clone(),
            source,
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint,
            access_token,
            order_status: config.order_status.clone(),
        })
    }

    fn request_url(&self, request: &PageRequest) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &request.query.limit.to_string());
            match &request.cursor {
                Some(cursor) => {
                    pairs.append_pair("page_info", cursor.as_str());
                }
                None => {
                    pairs.append_pair("status", &self.order_status);
                    pairs.append_pair(
                        "created_at_min",
                        &request
                            .query
                            .created_at_min
                            .to_rfc3339_opts(SecondsFormat::Secs, true),
                    );
                    if let Some(max) = request.query.created_at_max {
                        pairs.append_pair(
                            "created_at_max",
                            &max.to_rfc3339_opts(SecondsFormat::Secs, true),
                        );
                    }
                }
            }
        }
        url
    }
}

#[async_trait]
impl OrderSource for ShopifyOrderSource {
    fn name(&self) -> &'static str {
        "shopify"
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<OrderPage, UpstreamError> {
        let url = self.request_url(request);
        debug!(url = %url, "Fetching orders page");

        let response = self
            .client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| UpstreamError::Transient(e.to_string()))?;

        let status = response.status();
        let next = response
            .headers()
            .get("Link")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_next_page_info)
            .map(PageCursor);

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            warn!(?retry_after, "Rate limited by upstream");
            return Err(UpstreamError::RateLimited { retry_after });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(UpstreamError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Transient(format!(
                "status {}: {}",
                status.as_u16(),
                snippet(&body)
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Fatal {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transient(e.to_string()))?;
        let mut page = parse_orders_body(&body)?;
        page.next = next;
        Ok(page)
    }
}

#[derive(Debug, Deserialize)]
struct OrdersEnvelope {
    orders: Vec<Value>,
}

/// Parse a response body, normalizing each order independently.
pub fn parse_orders_body(body: &str) -> Result<OrderPage, UpstreamError> {
    let envelope: OrdersEnvelope =
        serde_json::from_str(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;

    let mut page = OrderPage::default();
    for raw in envelope.orders {
        let external_id = raw.get("id").and_then(id_from_value);
        match serde_json::from_value::<ShopifyOrder>(raw)
            .map_err(|e| e.to_string())
            .and_then(ShopifyOrder::normalize)
        {
            Ok(order) => page.orders.push(order),
            Err(reason) => page.rejected.push(RejectedOrder {
                external_id,
                reason,
            }),
        }
    }
    Ok(page)
}

/// Extract the `page_info` of the `rel="next"` entry in a `Link` header.
pub fn parse_next_page_info(link_header: &str) -> Option<String> {
    static NEXT_LINK: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = NEXT_LINK
        .get_or_init(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).ok())
        .as_ref()?;

    link_header.split(',').find_map(|entry| {
        let captures = pattern.captures(entry.trim())?;
        let url = Url::parse(captures.get(1)?.as_str()).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page_info")
            .map(|(_, value)| value.into_owned())
    })
}

/// `Retry-After` in seconds; fractional values are allowed.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds: f64 = headers
        .get("Retry-After")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

fn snippet(body: &str) -> String {
    if body.chars().count() > BODY_SNIPPET_CHARS {
        let truncated: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Money arrives as a decimal string, occasionally as a number, sometimes null.
fn de_money<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_money(deserializer)?.unwrap_or(0.0))
}

fn de_opt_money<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("money out of range")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid money amount '{s}'"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid money amount {other}"
        ))),
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(id_from_value))
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    de_opt_id(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing order id"))
}

#[derive(Debug, Deserialize)]
struct ShopifyOrder {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    created_at: DateTime<FixedOffset>,
    processed_at: Option<DateTime<FixedOffset>>,
    updated_at: Option<DateTime<FixedOffset>>,
    financial_status: Option<String>,
    fulfillment_status: Option<String>,
    currency: Option<String>,
    #[serde(default, deserialize_with = "de_money")]
    subtotal_price: f64,
    #[serde(default, deserialize_with = "de_money")]
    total_tax: f64,
    #[serde(default, deserialize_with = "de_money")]
    total_discounts: f64,
    #[serde(default, deserialize_with = "de_money")]
    total_price: f64,
    customer: Option<ShopifyCustomer>,
    #[serde(default)]
    line_items: Vec<ShopifyLineItem>,
    #[serde(default)]
    refunds: Vec<ShopifyRefund>,
    #[serde(default)]
    shipping_lines: Vec<ShopifyShippingLine>,
}

#[derive(Debug, Deserialize)]
struct ShopifyCustomer {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShopifyLineItem {
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    product_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    variant_id: Option<String>,
    sku: Option<String>,
    title: Option<String>,
    quantity: i32,
    #[serde(default, deserialize_with = "de_money")]
    price: f64,
    /// Not part of the stock payload; populated by stores that expose unit cost
    #[serde(default, deserialize_with = "de_opt_money")]
    cost: Option<f64>,
    #[serde(default, deserialize_with = "de_money")]
    total_discount: f64,
    fulfillment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShopifyRefund {
    #[serde(default)]
    transactions: Vec<ShopifyTransaction>,
}

#[derive(Debug, Deserialize)]
struct ShopifyTransaction {
    kind: Option<String>,
    status: Option<String>,
    #[serde(default, deserialize_with = "de_money")]
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct ShopifyShippingLine {
    #[serde(default, deserialize_with = "de_money")]
    price: f64,
}

impl ShopifyOrder {
    fn normalize(self) -> Result<NormalizedOrder, String> {
        let total_refunded: f64 = self
            .refunds
            .iter()
            .flat_map(|r| r.transactions.iter())
            .filter(|t| t.kind.as_deref() == Some("refund"))
            .filter(|t| t.status.as_deref().is_none_or(|s| s == "success"))
            .map(|t| t.amount.abs())
            .sum();
        let total_shipping: f64 = self.shipping_lines.iter().map(|s| s.price).sum();

        let customer = match &self.customer {
            Some(c) => {
                let name = [c.first_name.as_deref(), c.last_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                CustomerIdentity {
                    name: Some(name).filter(|n| !n.is_empty()),
                    email: normalize_email(self.email.as_deref().or(c.email.as_deref())),
                    phone: self.phone.clone().or_else(|| c.phone.clone()),
                }
            }
            None => CustomerIdentity {
                name: None,
                email: normalize_email(self.email.as_deref()),
                phone: self.phone.clone(),
            },
        };

        let mut line_items = Vec::with_capacity(self.line_items.len());
        for item in self.line_items {
            if item.quantity <= 0 {
                return Err(format!(
                    "line {} has non-positive quantity {}",
                    item.id.as_deref().unwrap_or("?"),
                    item.quantity
                ));
            }
            line_items.push(NormalizedLineItem {
                external_line_id: item.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                sku: item.sku.filter(|s| !s.is_empty()),
                title: item.title,
                quantity: item.quantity,
                price: item.price,
                cost: item.cost,
                total_discount: item.total_discount.abs(),
                fulfillment_status: item
                    .fulfillment_status
                    .as_deref()
                    .map(|s| FulfillmentStatus::parse(Some(s))),
            });
        }

        Ok(NormalizedOrder {
            external_id: self.id,
            name: self.name,
            created_at: self.created_at,
            processed_at: self.processed_at,
            updated_at: self.updated_at,
            financial_status: FinancialStatus::parse(
                self.financial_status.as_deref().unwrap_or("pending"),
            ),
            fulfillment_status: FulfillmentStatus::parse(self.fulfillment_status.as_deref()),
            subtotal_price: self.subtotal_price,
            total_tax: self.total_tax,
            total_discounts: self.total_discounts.abs(),
            total_shipping,
            total_refunded,
            total_price: self.total_price,
            currency: self.currency,
            customer,
            line_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn parses_next_page_info() {
        let header = r#"<https://demo.myshopify.com/admin/api/2024-01/orders.json?limit=250&page_info=abc123>; rel="next""#;
        assert_eq!(parse_next_page_info(header), Some("abc123".to_string()));
    }

    #[test]
    fn ignores_previous_link() {
        let header = r#"<https://demo.myshopify.com/admin/api/2024-01/orders.json?page_info=prev>; rel="previous", <https://demo.myshopify.com/admin/api/2024-01/orders.json?page_info=nxt>; rel="next""#;
        assert_eq!(parse_next_page_info(header), Some("nxt".to_string()));

        let only_previous = r#"<https://demo.myshopify.com/admin/api/2024-01/orders.json?page_info=prev>; rel="previous""#;
        assert_eq!(parse_next_page_info(only_previous), None);
    }

    #[test]
    fn retry_after_accepts_fractions() {
        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", HeaderValue::from_static("2.0"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));

        headers.insert("Retry-After", HeaderValue::from_static("0.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(500)));

        headers.insert("Retry-After", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn normalizes_full_order() {
        let body = r##"{"orders":[{
            "id": 450789469,
            "name": "#1001",
            "email": "Bob.Norman@Example.com",
            "created_at": "2025-01-05T10:00:00-05:00",
            "updated_at": "2025-01-06T10:00:00-05:00",
            "financial_status": "partially_refunded",
            "fulfillment_status": null,
            "currency": "USD",
            "subtotal_price": "100.00",
            "total_tax": "10.00",
            "total_discounts": "5.00",
            "total_price": "112.00",
            "customer": {"first_name": "Bob", "last_name": "Norman", "phone": "+1555"},
            "line_items": [
                {"id": 1, "product_id": 632910392, "variant_id": 808950810, "sku": "IPOD",
                 "title": "IPod Nano", "quantity": 2, "price": "35.00", "total_discount": "5.00"},
                {"id": 2, "product_id": null, "title": "Gift wrap", "quantity": 1, "price": 30}
            ],
            "refunds": [{"transactions": [
                {"kind": "refund", "status": "success", "amount": "20.00"},
                {"kind": "refund", "status": "failure", "amount": "99.00"},
                {"kind": "sale", "status": "success", "amount": "112.00"}
            ]}],
            "shipping_lines": [{"price": "4.00"}, {"price": "3.00"}]
        }]}"##;

        let page = parse_orders_body(body).unwrap();
        assert!(page.rejected.is_empty());
        let order = &page.orders[0];
        assert_eq!(order.external_id, "450789469");
        assert_eq!(order.customer.email.as_deref(), Some("bob.norman@example.com"));
        assert_eq!(order.customer.name.as_deref(), Some("Bob Norman"));
        assert_eq!(order.financial_status, FinancialStatus::PartiallyRefunded);
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Unfulfilled);
        assert_eq!(order.total_refunded, 20.0);
        assert_eq!(order.total_shipping, 7.0);
        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.line_items[0].product_id.as_deref(), Some("632910392"));
        assert_eq!(order.line_items[0].price, 35.0);
        assert_eq!(order.line_items[1].product_id, None);
        assert_eq!(order.line_items[1].price, 30.0);
    }

    #[test]
    fn bad_order_is_rejected_without_failing_page() {
        let body = r#"{"orders":[
            {"id": 1, "created_at": "not-a-date"},
            {"id": 2, "created_at": "2025-01-05T10:00:00Z", "line_items": [{"quantity": 0, "price": "1.00"}]},
            {"id": 3, "created_at": "2025-01-05T10:00:00Z"}
        ]}"#;
        let page = parse_orders_body(body).unwrap();
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.rejected.len(), 2);
        assert_eq!(page.rejected[0].external_id.as_deref(), Some("1"));
        assert_eq!(page.len(), 3);
    }

    #[test]
    fn unparseable_body_is_malformed() {
        assert!(matches!(
            parse_orders_body("<html>"),
            Err(UpstreamError::Malformed(_))
        ));
    }
}
