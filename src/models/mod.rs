//! # Data Models
//!
//! SeaORM entities for raw orders, derived metrics and pipeline bookkeeping.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod customer_first_order;
pub mod daily_product_metric;
pub mod order;
pub mod order_item;
pub mod product_summary;
pub mod sync_lock;
pub mod sync_run;

pub use customer_first_order::Entity as CustomerFirstOrder;
pub use daily_product_metric::Entity as DailyProductMetric;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product_summary::Entity as ProductSummary;
pub use sync_lock::Entity as SyncLock;
pub use sync_run::Entity as SyncRun;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "order-metrics".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
