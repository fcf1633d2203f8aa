//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for raw
//! orders, derived metrics and pipeline bookkeeping.

pub mod customer_first_order;
pub mod daily_metric;
pub mod order;
pub mod summary;
pub mod sync_lock;
pub mod sync_run;

pub use customer_first_order::CustomerFirstOrderRepository;
pub use daily_metric::{DailyMetricRepository, ReplaceStats};
pub use order::{OrderRepository, OrderWithItems, UpsertOutcome};
pub use summary::SummaryRepository;
pub use sync_lock::{LockOutcome, SyncLockRepository};
pub use sync_run::{NewSyncRun, SyncRunRepository};
