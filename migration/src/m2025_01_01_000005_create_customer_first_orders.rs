//! Migration to create the customer_first_orders table.
//!
//! Maintained index of the earliest order per customer email, used for
//! new-customer detection without a full-history join.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CustomerFirstOrders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomerFirstOrders::CustomerEmail)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CustomerFirstOrders::FirstOrderAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerFirstOrders::FirstOrderExternalId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerFirstOrders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CustomerFirstOrders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CustomerFirstOrders {
    Table,
    CustomerEmail,
    FirstOrderAt,
    FirstOrderExternalId,
    UpdatedAt,
}
