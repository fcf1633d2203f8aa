//! Database migrations for the order metrics pipeline.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_01_000001_create_orders;
mod m2025_01_01_000002_create_order_items;
mod m2025_01_01_000003_create_product_performance_enhanced;
mod m2025_01_01_000004_create_product_analytics_summary;
mod m2025_01_01_000005_create_customer_first_orders;
mod m2025_01_01_000006_create_sync_locks;
mod m2025_01_01_000007_create_sync_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_01_000001_create_orders::Migration),
            Box::new(m2025_01_01_000002_create_order_items::Migration),
            Box::new(m2025_01_01_000003_create_product_performance_enhanced::Migration),
            Box::new(m2025_01_01_000004_create_product_analytics_summary::Migration),
            Box::new(m2025_01_01_000005_create_customer_first_orders::Migration),
            Box::new(m2025_01_01_000006_create_sync_locks::Migration),
            Box::new(m2025_01_01_000007_create_sync_runs::Migration),
        ]
    }
}
