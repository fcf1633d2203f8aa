//! # Sync Run Repository
//!
//! Persists the structured report of every pipeline run.

use chrono::NaiveDate;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::sync_run::{ActiveModel, Column, Entity, Model};

/// Fields of a finished run, as written to `sync_runs`.
#[derive(Debug, Clone)]
pub struct NewSyncRun {
    pub id: Uuid,
    pub store_key: String,
    pub status: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub started_at: DateTimeWithTimeZone,
    pub finished_at: DateTimeWithTimeZone,
    pub report: JsonValue,
}

pub struct SyncRunRepository {
    db: DatabaseConnection,
}

impl SyncRunRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn record(&self, run: NewSyncRun) -> Result<Model, RepositoryError> {
        let id = run.id;
        let model = ActiveModel {
            id: Set(run.id),
            store_key: Set(run.store_key),
            status: Set(run.status),
            window_start: Set(run.window_start),
            window_end: Set(run.window_end),
            started_at: Set(run.started_at),
            finished_at: Set(run.finished_at),
            report: Set(run.report),
        }
        .insert(&self.db)
        .await
        .map_err(|e| RepositoryError::from_insert("sync_run", id.to_string(), e))?;

        tracing::info!(run_id = %model.id, status = %model.status, "Sync run recorded");
        Ok(model)
    }

    /// Most recent runs first, optionally for one store.
    pub async fn list_recent(
        &self,
        store_key: Option<&str>,
        limit: u64,
    ) -> Result<Vec<Model>, RepositoryError> {
        let mut query = Entity::find();
        if let Some(store_key) = store_key {
            query = query.filter(Column::StoreKey.eq(store_key));
        }
        Ok(query
            .order_by_desc(Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    pub async fn find(&self, id: Uuid) -> Result<Model, RepositoryError> {
        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "sync_run",
                key: id.to_string(),
            })
    }
}
