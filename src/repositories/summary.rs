//! # Product Summary Repository

use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};

use crate::error::RepositoryError;
use crate::models::product_summary::{ActiveModel, Column, Entity, Model};

const INSERT_CHUNK: usize = 500;

pub struct SummaryRepository {
    db: DatabaseConnection,
}

impl SummaryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Replace the whole summary table in one transaction.
    pub async fn replace_all(&self, rows: Vec<ActiveModel>) -> Result<u64, RepositoryError> {
        let txn = self.db.begin().await?;
        Entity::delete_many().exec(&txn).await?;
        let inserted = rows.len() as u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            Entity::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;
        Ok(inserted)
    }

    /// Summary rows ordered by rank.
    pub async fn list_ranked(&self, limit: Option<u64>) -> Result<Vec<Model>, RepositoryError> {
        let rows = Entity::find()
            .order_by_asc(Column::Rank)
            .order_by_asc(Column::ProductId)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn find_by_product(&self, product_id: &str) -> Result<Option<Model>, RepositoryError> {
        Ok(Entity::find()
            .filter(Column::ProductId.eq(product_id))
            .one(&self.db)
            .await?)
    }

    pub async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(Entity::find().count(&self.db).await?)
    }
}
