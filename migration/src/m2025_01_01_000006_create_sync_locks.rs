//! Migration to create the sync_locks table.
//!
//! A row per store key marks an in-flight pipeline run. The primary key makes
//! acquisition a plain insert that loses on conflict.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncLocks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncLocks::StoreKey)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncLocks::RunId).uuid().not_null())
                    .col(
                        ColumnDef::new(SyncLocks::AcquiredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncLocks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncLocks {
    Table,
    StoreKey,
    RunId,
    AcquiredAt,
}
