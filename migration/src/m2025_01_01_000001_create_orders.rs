//! Migration to create the orders table.
//!
//! One row per upstream commerce order, keyed by the upstream id. Monetary
//! columns hold the upstream magnitudes as reported (non-negative).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Orders::ExternalId).text().not_null())
                    .col(ColumnDef::new(Orders::Name).text().null())
                    .col(
                        ColumnDef::new(Orders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Orders::UpstreamUpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Orders::OrderDate).date().not_null())
                    .col(ColumnDef::new(Orders::FinancialStatus).text().not_null())
                    .col(ColumnDef::new(Orders::FulfillmentStatus).text().not_null())
                    .col(
                        ColumnDef::new(Orders::SubtotalPrice)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalTax)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalDiscounts)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalShipping)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalRefunded)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalPrice)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Orders::Currency).text().null())
                    .col(ColumnDef::new(Orders::CustomerName).text().null())
                    .col(ColumnDef::new(Orders::CustomerEmail).text().null())
                    .col(ColumnDef::new(Orders::CustomerPhone).text().null())
                    .col(
                        ColumnDef::new(Orders::IngestedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Orders::UpdatedAt)
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
                    .name("idx_orders_external_id")
                    .table(Orders::Table)
                    .col(Orders::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Aggregation window scans
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_order_date")
                    .table(Orders::Table)
                    .col(Orders::OrderDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_customer_email_created_at")
                    .table(Orders::Table)
                    .col(Orders::CustomerEmail)
                    .col(Orders::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_orders_customer_email_created_at").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_orders_order_date").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_orders_external_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    ExternalId,
    Name,
    CreatedAt,
    ProcessedAt,
    UpstreamUpdatedAt,
    OrderDate,
    FinancialStatus,
    FulfillmentStatus,
    SubtotalPrice,
    TotalTax,
    TotalDiscounts,
    TotalShipping,
    TotalRefunded,
    TotalPrice,
    Currency,
    CustomerName,
    CustomerEmail,
    CustomerPhone,
    IngestedAt,
    UpdatedAt,
}
