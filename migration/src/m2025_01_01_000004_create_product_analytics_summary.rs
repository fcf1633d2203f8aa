//! Migration to create the product_analytics_summary table.
//!
//! One row per product holding lifetime totals, trailing 7/30 day windows,
//! the composite ranking score and the weekly trend.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductAnalyticsSummary::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductAnalyticsSummary::ProductId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(money(ProductAnalyticsSummary::LifetimeRevenue))
                    .col(money(ProductAnalyticsSummary::LifetimeNetSales))
                    .col(count(ProductAnalyticsSummary::LifetimeUnits))
                    .col(count(ProductAnalyticsSummary::LifetimeOrders))
                    .col(money(ProductAnalyticsSummary::LifetimeCost))
                    .col(money(ProductAnalyticsSummary::LifetimeProfit))
                    .col(money(ProductAnalyticsSummary::LifetimeMarginPercentage))
                    .col(money(ProductAnalyticsSummary::Last7dRevenue))
                    .col(count(ProductAnalyticsSummary::Last7dUnits))
                    .col(count(ProductAnalyticsSummary::Last7dOrders))
                    .col(money(ProductAnalyticsSummary::Last7dProfit))
                    .col(money(ProductAnalyticsSummary::Last30dRevenue))
                    .col(count(ProductAnalyticsSummary::Last30dUnits))
                    .col(count(ProductAnalyticsSummary::Last30dOrders))
                    .col(money(ProductAnalyticsSummary::Last30dProfit))
                    .col(money(ProductAnalyticsSummary::Prev7dRevenue))
                    .col(money(ProductAnalyticsSummary::OverallScore))
                    .col(
                        ColumnDef::new(ProductAnalyticsSummary::TrendDirection)
                            .text()
                            .not_null()
                            .default("flat"),
                    )
                    .col(
                        ColumnDef::new(ProductAnalyticsSummary::TrendChangePct)
                            .double()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProductAnalyticsSummary::Rank)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductAnalyticsSummary::FirstSaleDate)
                            .date()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProductAnalyticsSummary::LastSaleDate)
                            .date()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProductAnalyticsSummary::ComputedAt)
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
                    .name("idx_product_analytics_summary_rank")
                    .table(ProductAnalyticsSummary::Table)
                    .col(ProductAnalyticsSummary::Rank)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_product_analytics_summary_rank")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ProductAnalyticsSummary::Table).to_owned())
            .await
    }
}

fn money(column: ProductAnalyticsSummary) -> ColumnDef {
    ColumnDef::new(column).double().not_null().default(0.0).to_owned()
}

fn count(column: ProductAnalyticsSummary) -> ColumnDef {
    ColumnDef::new(column).big_integer().not_null().default(0).to_owned()
}

#[derive(DeriveIden, Clone, Copy)]
enum ProductAnalyticsSummary {
    Table,
    ProductId,
    LifetimeRevenue,
    LifetimeNetSales,
    LifetimeUnits,
    LifetimeOrders,
    LifetimeCost,
    LifetimeProfit,
    LifetimeMarginPercentage,
    #[sea_orm(iden = "last_7d_revenue")]
    Last7dRevenue,
    #[sea_orm(iden = "last_7d_units")]
    Last7dUnits,
    #[sea_orm(iden = "last_7d_orders")]
    Last7dOrders,
    #[sea_orm(iden = "last_7d_profit")]
    Last7dProfit,
    #[sea_orm(iden = "last_30d_revenue")]
    Last30dRevenue,
    #[sea_orm(iden = "last_30d_units")]
    Last30dUnits,
    #[sea_orm(iden = "last_30d_orders")]
    Last30dOrders,
    #[sea_orm(iden = "last_30d_profit")]
    Last30dProfit,
    #[sea_orm(iden = "prev_7d_revenue")]
    Prev7dRevenue,
    OverallScore,
    TrendDirection,
    TrendChangePct,
    Rank,
    FirstSaleDate,
    LastSaleDate,
    ComputedAt,
}
