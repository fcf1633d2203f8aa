//! # Daily Product Metric Repository
//!
//! Range-scoped replacement of `product_performance_enhanced` rows and range
//! reads for summaries, analytics and reconciliation.

use chrono::NaiveDate;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};

use crate::error::RepositoryError;
use crate::models::daily_product_metric::{ActiveModel, Column, Entity, Model};

/// Rows per multi-row insert; keeps every backend under its bind-parameter limit.
const INSERT_CHUNK: usize = 500;

/// Counts from one range replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceStats {
    pub deleted: u64,
    pub inserted: u64,
}

pub struct DailyMetricRepository {
    db: DatabaseConnection,
}

impl DailyMetricRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Atomically replace every row dated within `[start, end]` with `rows`,
    /// except rows whose key is listed in `preserve`, which are left as they are.
    pub async fn replace_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        rows: Vec<ActiveModel>,
        preserve: &[(String, NaiveDate)],
    ) -> Result<ReplaceStats, RepositoryError> {
        let txn = self.db.begin().await?;

        let mut condition = Condition::all().add(Column::MetricDate.between(start, end));
        for (product_id, date) in preserve {
            condition = condition.add(
                Condition::any()
                    .add(Column::ProductId.ne(product_id.as_str()))
                    .add(Column::MetricDate.ne(*date)),
            );
        }
        let deleted = Entity::delete_many()
            .filter(condition)
            .exec(&txn)
            .await?
            .rows_affected;

        let inserted = rows.len() as u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            Entity::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(ReplaceStats { deleted, inserted })
    }

    /// Rows in `[start, end]`, optionally for one product, ordered by date then product.
    pub async fn find_range(
        &self,
        product_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Model>, RepositoryError> {
        let mut query = Entity::find().filter(Column::MetricDate.between(start, end));
        if let Some(product_id) = product_id {
            query = query.filter(Column::ProductId.eq(product_id));
        }
        let rows = query
            .order_by_asc(Column::MetricDate)
            .order_by_asc(Column::ProductId)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Every stored row, ordered by product then date.
    pub async fn find_all(&self) -> Result<Vec<Model>, RepositoryError> {
        let rows = Entity::find()
            .order_by_asc(Column::ProductId)
            .order_by_asc(Column::MetricDate)
            .all(&self.db)
            .await?;
        Ok(rows)
    }
}
