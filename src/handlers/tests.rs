//! # Tests for Handlers
//!
//! This module contains unit tests for API handlers.

use crate::handlers::root;
use crate::models::ServiceInfo;
use axum::response::Json;
use serde_json::Value;

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "order-metrics");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_service_info_serialization() {
    let service_info = ServiceInfo::default();

    let json: Value = serde_json::to_value(&service_info).expect("serializes");

    assert_eq!(json["service"], "order-metrics");
    assert!(json["version"].is_string());
    assert_eq!(json.as_object().map(|o| o.len()), Some(2));
}
