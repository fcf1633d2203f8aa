//! # Customer First-Order Repository
//!
//! Maintains the `email -> earliest order` index consulted when counting new
//! customers, so daily aggregation never scans order history per customer.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, Set, TransactionTrait,
};

use crate::error::RepositoryError;
use crate::models::customer_first_order::{ActiveModel, Column, Entity, Model};
use crate::models::order;

pub struct CustomerFirstOrderRepository {
    db: DatabaseConnection,
}

impl CustomerFirstOrderRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record an order for `email`, keeping whichever order is earliest.
    pub async fn record_in<C: ConnectionTrait>(
        conn: &C,
        email: &str,
        created_at: DateTimeWithTimeZone,
        external_id: &str,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now().fixed_offset();
        match Entity::find_by_id(email.to_string()).one(conn).await? {
            None => {
                ActiveModel {
                    customer_email: Set(email.to_string()),
                    first_order_at: Set(created_at),
                    first_order_external_id: Set(external_id.to_string()),
                    updated_at: Set(now),
                }
                .insert(conn)
                .await
                .map_err(|e| RepositoryError::from_insert("customer_first_order", email, e))?;
            }
            Some(current) if created_at < current.first_order_at => {
                let mut active = current.into_active_model();
                active.first_order_at = Set(created_at);
                active.first_order_external_id = Set(external_id.to_string());
                active.updated_at = Set(now);
                active.update(conn).await?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Index entries for the given emails.
    pub async fn find_many(
        &self,
        emails: &[String],
    ) -> Result<HashMap<String, Model>, RepositoryError> {
        if emails.is_empty() {
            return Ok(HashMap::new());
        }
        let mut found = HashMap::with_capacity(emails.len());
        // Bounded IN lists keep SQLite under its bind-parameter limit.
        for chunk in emails.chunks(500) {
            let rows = Entity::find()
                .filter(Column::CustomerEmail.is_in(chunk.iter().cloned()))
                .all(&self.db)
                .await?;
            found.extend(rows.into_iter().map(|m| (m.customer_email.clone(), m)));
        }
        Ok(found)
    }

    /// Rebuild the whole index from stored orders. Returns the number of customers indexed.
    pub async fn rebuild(&self) -> Result<u64, RepositoryError> {
        let txn = self.db.begin().await?;
        Entity::delete_many().exec(&txn).await?;

        let orders = order::Entity::find()
            .filter(order::Column::CustomerEmail.is_not_null())
            .all(&txn)
            .await?;

        let mut by_email: HashMap<String, Vec<order::Model>> = HashMap::new();
        for o in orders {
            if let Some(email) = o.customer_email.clone() {
                by_email.entry(email).or_default().push(o);
            }
        }

        let now = Utc::now().fixed_offset();
        let rows: Vec<ActiveModel> = by_email
            .into_iter()
            .filter_map(|(email, orders)| {
                earliest(&orders).map(|first| ActiveModel {
                    customer_email: Set(email),
                    first_order_at: Set(first.created_at),
                    first_order_external_id: Set(first.external_id.clone()),
                    updated_at: Set(now),
                })
            })
            .collect();
        let count = rows.len() as u64;
        for chunk in rows.chunks(500) {
            Entity::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(count)
    }

    /// Re-derive the entry for `email` from stored orders, removing it when
    /// no order carries the email any more. Used after an order is rewritten,
    /// since its email or creation time may have moved.
    pub async fn refresh_in<C: ConnectionTrait>(
        conn: &C,
        email: &str,
    ) -> Result<(), RepositoryError> {
        let orders = order::Entity::find()
            .filter(order::Column::CustomerEmail.eq(email))
            .all(conn)
            .await?;
        let current = Entity::find_by_id(email.to_string()).one(conn).await?;

        match (earliest(&orders), current) {
            (None, None) => {}
            (None, Some(_)) => {
                Entity::delete_by_id(email.to_string()).exec(conn).await?;
            }
            (Some(first), None) => {
                Self::record_in(conn, email, first.created_at, &first.external_id).await?;
            }
            (Some(first), Some(current)) => {
                if current.first_order_at != first.created_at
                    || current.first_order_external_id != first.external_id
                {
                    let mut active = current.into_active_model();
                    active.first_order_at = Set(first.created_at);
                    active.first_order_external_id = Set(first.external_id.clone());
                    active.updated_at = Set(Utc::now().fixed_offset());
                    active.update(conn).await?;
                }
            }
        }
        Ok(())
    }
}

/// Earliest order by creation instant; ties go to the smaller external id.
fn earliest(orders: &[order::Model]) -> Option<&order::Model> {
    orders.iter().min_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.external_id.cmp(&b.external_id))
    })
}
