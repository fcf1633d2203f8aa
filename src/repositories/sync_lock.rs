//! # Sync Lock Repository
//!
//! A row per store key acts as an advisory lock: inserting it acquires the
//! lock, the primary key rejects a second holder. Locks older than the TTL are
//! treated as abandoned by a crashed run and may be taken over.

use std::time::Duration;

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::error::{RepositoryError, is_unique_violation};
use crate::models::sync_lock::{ActiveModel, Column, Entity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// A stale lock from another run was replaced
    TakenOver { previous_run_id: Uuid },
    Held {
        run_id: Uuid,
        acquired_at: DateTimeWithTimeZone,
    },
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        !matches!(self, Self::Held { .. })
    }
}

pub struct SyncLockRepository {
    db: DatabaseConnection,
}

impl SyncLockRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn try_acquire(
        &self,
        store_key: &str,
        run_id: Uuid,
        ttl: Duration,
    ) -> Result<LockOutcome, RepositoryError> {
        if self.insert(store_key, run_id).await? {
            return Ok(LockOutcome::Acquired);
        }

        let Some(current) = Entity::find_by_id(store_key.to_string())
            .one(&self.db)
            .await?
        else {
            // Released between our insert and read; one more attempt.
            return if self.insert(store_key, run_id).await? {
                Ok(LockOutcome::Acquired)
            } else {
                Err(RepositoryError::Conflict {
                    entity: "sync_lock",
                    key: store_key.to_string(),
                })
            };
        };

        let age = Utc::now().signed_duration_since(current.acquired_at);
        let stale = age.to_std().is_ok_and(|age| age > ttl);
        if !stale {
            return Ok(LockOutcome::Held {
                run_id: current.run_id,
                acquired_at: current.acquired_at,
            });
        }

        // Compare-and-delete so two contenders cannot both evict the same holder.
        let evicted = Entity::delete_many()
            .filter(Column::StoreKey.eq(store_key))
            .filter(Column::RunId.eq(current.run_id))
            .exec(&self.db)
            .await?
            .rows_affected;
        if evicted == 1 && self.insert(store_key, run_id).await? {
            tracing::warn!(
                store_key,
                previous_run_id = %current.run_id,
                "Took over stale sync lock"
            );
            return Ok(LockOutcome::TakenOver {
                previous_run_id: current.run_id,
            });
        }

        match Entity::find_by_id(store_key.to_string())
            .one(&self.db)
            .await?
        {
            Some(winner) => Ok(LockOutcome::Held {
                run_id: winner.run_id,
                acquired_at: winner.acquired_at,
            }),
            None => Err(RepositoryError::Conflict {
                entity: "sync_lock",
                key: store_key.to_string(),
            }),
        }
    }

    /// Release the lock if `run_id` still holds it. Returns whether a row was removed.
    pub async fn release(&self, store_key: &str, run_id: Uuid) -> Result<bool, RepositoryError> {
        let removed = Entity::delete_many()
            .filter(Column::StoreKey.eq(store_key))
            .filter(Column::RunId.eq(run_id))
            .exec(&self.db)
            .await?
            .rows_affected;
        Ok(removed > 0)
    }

    async fn insert(&self, store_key: &str, run_id: Uuid) -> Result<bool, RepositoryError> {
        let lock = ActiveModel {
            store_key: Set(store_key.to_string()),
            run_id: Set(run_id),
            acquired_at: Set(Utc::now().fixed_offset()),
        };
        match Entity::insert(lock).exec_without_returning(&self.db).await {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
