//! Sync lock entity model
//!
//! Advisory lock marking the in-flight pipeline run for a store.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_locks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub store_key: String,
    pub run_id: Uuid,
    pub acquired_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
