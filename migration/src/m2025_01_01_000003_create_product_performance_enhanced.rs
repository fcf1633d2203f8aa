//! Migration to create the product_performance_enhanced table.
//!
//! Daily product metrics, one row per (product_id, metric_date). Discounts and
//! returns are stored as non-positive amounts so that
//! `net_sales = gross_sales + total_discounts + returns_amount`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductPerformanceEnhanced::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductPerformanceEnhanced::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProductPerformanceEnhanced::ProductId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductPerformanceEnhanced::MetricDate)
                            .date()
                            .not_null(),
                    )
                    .col(money(ProductPerformanceEnhanced::GrossSales))
                    .col(money(ProductPerformanceEnhanced::NetSales))
                    .col(money(ProductPerformanceEnhanced::TotalSales))
                    .col(count(ProductPerformanceEnhanced::UnitsSold))
                    .col(count(ProductPerformanceEnhanced::OrdersCount))
                    .col(money(ProductPerformanceEnhanced::TotalDiscounts))
                    .col(money(ProductPerformanceEnhanced::ReturnsAmount))
                    .col(count(ProductPerformanceEnhanced::ReturnsCount))
                    .col(money(ProductPerformanceEnhanced::Taxes))
                    .col(money(ProductPerformanceEnhanced::ShippingCharges))
                    .col(money(ProductPerformanceEnhanced::TotalCost))
                    .col(money(ProductPerformanceEnhanced::GrossProfit))
                    .col(money(ProductPerformanceEnhanced::NetProfit))
                    .col(money(ProductPerformanceEnhanced::MarginPercentage))
                    .col(count(ProductPerformanceEnhanced::UniqueCustomers))
                    .col(count(ProductPerformanceEnhanced::NewCustomers))
                    .col(money(ProductPerformanceEnhanced::AverageOrderValue))
                    .col(count(ProductPerformanceEnhanced::FulfilledOrders))
                    .col(count(ProductPerformanceEnhanced::UnfulfilledOrders))
                    .col(
                        ColumnDef::new(ProductPerformanceEnhanced::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_performance_product_date")
                    .table(ProductPerformanceEnhanced::Table)
                    .col(ProductPerformanceEnhanced::ProductId)
                    .col(ProductPerformanceEnhanced::MetricDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_performance_metric_date")
                    .table(ProductPerformanceEnhanced::Table)
                    .col(ProductPerformanceEnhanced::MetricDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_product_performance_metric_date")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_product_performance_product_date")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(ProductPerformanceEnhanced::Table)
                    .to_owned(),
            )
            .await
    }
}

fn money(column: ProductPerformanceEnhanced) -> ColumnDef {
    ColumnDef::new(column).double().not_null().default(0.0).to_owned()
}

fn count(column: ProductPerformanceEnhanced) -> ColumnDef {
    ColumnDef::new(column).big_integer().not_null().default(0).to_owned()
}

#[derive(DeriveIden, Clone, Copy)]
enum ProductPerformanceEnhanced {
    Table,
    Id,
    ProductId,
    MetricDate,
    GrossSales,
    NetSales,
    TotalSales,
    UnitsSold,
    OrdersCount,
    TotalDiscounts,
    ReturnsAmount,
    ReturnsCount,
    Taxes,
    ShippingCharges,
    TotalCost,
    GrossProfit,
    NetProfit,
    MarginPercentage,
    UniqueCustomers,
    NewCustomers,
    AverageOrderValue,
    FulfilledOrders,
    UnfulfilledOrders,
    ComputedAt,
}
