//! # Order Repository
//!
//! Persists normalized orders (header, lines and the customer first-order
//! index) one order per transaction, and loads orders with their lines for
//! aggregation.

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::config::ExistingOrderPolicy;
use crate::error::RepositoryError;
use crate::models::order::{ActiveModel, Column, Entity, Model};
use crate::models::order_item;
use crate::normalization::{NormalizedLineItem, NormalizedOrder};
use crate::repositories::customer_first_order::CustomerFirstOrderRepository;

/// What happened to one incoming order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
    Skipped,
}

/// An order header together with its lines.
pub type OrderWithItems = (Model, Vec<order_item::Model>);

/// Repository for order database operations
pub struct OrderRepository {
    db: DatabaseConnection,
}

impl OrderRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Write one order atomically. Existing orders are replaced or left alone
    /// according to `policy`; an identical copy is reported as unchanged.
    pub async fn upsert(
        &self,
        incoming: &NormalizedOrder,
        policy: ExistingOrderPolicy,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let txn = self.db.begin().await?;

        let existing = Entity::find()
            .filter(Column::ExternalId.eq(incoming.external_id.as_str()))
            .one(&txn)
            .await?;

        let outcome = match existing {
            None => {
                let id = Uuid::new_v4();
                header_active_model(id, incoming, None)
                    .insert(&txn)
                    .await
                    .map_err(|e| {
                        RepositoryError::from_insert("order", incoming.external_id.clone(), e)
                    })?;
                insert_items(&txn, id, &incoming.line_items).await?;
                UpsertOutcome::Inserted
            }
            Some(_) if policy == ExistingOrderPolicy::Skip => UpsertOutcome::Skipped,
            Some(current) => {
                let items = order_item::Entity::find()
                    .filter(order_item::Column::OrderId.eq(current.id))
                    .all(&txn)
                    .await?;
                if header_matches(&current, incoming) && items_match(&items, &incoming.line_items)
                {
                    UpsertOutcome::Unchanged
                } else {
                    let previous_email = current.customer_email.clone();
                    header_active_model(current.id, incoming, Some(current.ingested_at))
                        .update(&txn)
                        .await?;
                    order_item::Entity::delete_many()
                        .filter(order_item::Column::OrderId.eq(current.id))
                        .exec(&txn)
                        .await?;
                    insert_items(&txn, current.id, &incoming.line_items).await?;
                    // The rewrite may move this order's email or creation time,
                    // so both affected entries are derived again.
                    let mut emails: Vec<&str> = previous_email
                        .as_deref()
                        .into_iter()
                        .chain(incoming.customer.email.as_deref())
                        .collect();
                    emails.dedup();
                    for email in emails {
                        CustomerFirstOrderRepository::refresh_in(&txn, email).await?;
                    }
                    UpsertOutcome::Updated
                }
            }
        };

        if outcome == UpsertOutcome::Inserted
            && let Some(email) = incoming.customer.email.as_deref()
        {
            CustomerFirstOrderRepository::record_in(
                &txn,
                email,
                incoming.created_at,
                &incoming.external_id,
            )
            .await?;
        }

        txn.commit().await?;
        Ok(outcome)
    }

    pub async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let found = Entity::find()
            .filter(Column::ExternalId.eq(external_id))
            .find_with_related(order_item::Entity)
            .all(&self.db)
            .await?;
        Ok(found.into_iter().next())
    }

    /// Orders whose calendar date falls in `[start, end]`, with their lines,
    /// ordered by creation time.
    pub async fn find_with_items_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let orders = Entity::find()
            .filter(Column::OrderDate.between(start, end))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .find_with_related(order_item::Entity)
            .all(&self.db)
            .await?;
        Ok(orders)
    }
}

fn header_active_model(
    id: Uuid,
    incoming: &NormalizedOrder,
    ingested_at: Option<sea_orm::prelude::DateTimeWithTimeZone>,
) -> ActiveModel {
    let now = Utc::now().fixed_offset();
    ActiveModel {
        id: Set(id),
        external_id: Set(incoming.external_id.clone()),
        name: Set(incoming.name.clone()),
        created_at: Set(incoming.created_at),
        processed_at: Set(incoming.processed_at),
        upstream_updated_at: Set(incoming.updated_at),
        order_date: Set(incoming.order_date()),
        financial_status: Set(incoming.financial_status.as_str().to_string()),
        fulfillment_status: Set(incoming.fulfillment_status.as_str().to_string()),
        subtotal_price: Set(incoming.subtotal_price),
        total_tax: Set(incoming.total_tax),
        total_discounts: Set(incoming.total_discounts),
        total_shipping: Set(incoming.total_shipping),
        total_refunded: Set(incoming.total_refunded),
        total_price: Set(incoming.total_price),
        currency: Set(incoming.currency.clone()),
        customer_name: Set(incoming.customer.name.clone()),
        customer_email: Set(incoming.customer.email.clone()),
        customer_phone: Set(incoming.customer.phone.clone()),
        ingested_at: Set(ingested_at.unwrap_or(now)),
        updated_at: Set(now),
    }
}

async fn insert_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    items: &[NormalizedLineItem],
) -> Result<(), RepositoryError> {
    if items.is_empty() {
        return Ok(());
    }
    let models = items.iter().map(|item| order_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        external_line_id: Set(item.external_line_id.clone()),
        product_id: Set(item.product_id.clone()),
        variant_id: Set(item.variant_id.clone()),
        sku: Set(item.sku.clone()),
        title: Set(item.title.clone()),
        quantity: Set(item.quantity),
        price: Set(item.price),
        cost: Set(item.cost),
        total_discount: Set(item.total_discount),
        fulfillment_status: Set(item.fulfillment_status.map(|s| s.as_str().to_string())),
    });
    order_item::Entity::insert_many(models)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

fn header_matches(current: &Model, incoming: &NormalizedOrder) -> bool {
    current.name == incoming.name
        && current.created_at == incoming.created_at
        && current.processed_at == incoming.processed_at
        && current.upstream_updated_at == incoming.updated_at
        && current.order_date == incoming.order_date()
        && current.financial_status == incoming.financial_status.as_str()
        && current.fulfillment_status == incoming.fulfillment_status.as_str()
        && current.subtotal_price == incoming.subtotal_price
        && current.total_tax == incoming.total_tax
        && current.total_discounts == incoming.total_discounts
        && current.total_shipping == incoming.total_shipping
        && current.total_refunded == incoming.total_refunded
        && current.total_price == incoming.total_price
        && current.currency == incoming.currency
        && current.customer_name == incoming.customer.name
        && current.customer_email == incoming.customer.email
        && current.customer_phone == incoming.customer.phone
}

/// Order-insensitive identity of a stored or incoming line.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct LineKey {
    external_line_id: Option<String>,
    product_id: Option<String>,
    variant_id: Option<String>,
    sku: Option<String>,
    title: Option<String>,
    quantity: i32,
    // Floats are compared through their bit patterns so keys can be sorted.
    price: u64,
    cost: Option<u64>,
    total_discount: u64,
    fulfillment_status: Option<String>,
}

impl From<&order_item::Model> for LineKey {
    fn from(item: &order_item::Model) -> Self {
        Self {
            external_line_id: item.external_line_id.clone(),
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            sku: item.sku.clone(),
            title: item.title.clone(),
            quantity: item.quantity,
            price: item.price.to_bits(),
            cost: item.cost.map(f64::to_bits),
            total_discount: item.total_discount.to_bits(),
            fulfillment_status: item.fulfillment_status.clone(),
        }
    }
}

impl From<&NormalizedLineItem> for LineKey {
    fn from(item: &NormalizedLineItem) -> Self {
        Self {
            external_line_id: item.external_line_id.clone(),
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            sku: item.sku.clone(),
            title: item.title.clone(),
            quantity: item.quantity,
            price: item.price.to_bits(),
            cost: item.cost.map(f64::to_bits),
            total_discount: item.total_discount.to_bits(),
            fulfillment_status: item.fulfillment_status.map(|s| s.as_str().to_string()),
        }
    }
}

fn items_match(current: &[order_item::Model], incoming: &[NormalizedLineItem]) -> bool {
    if current.len() != incoming.len() {
        return false;
    }
    let mut stored: Vec<LineKey> = current.iter().map(LineKey::from).collect();
    let mut fresh: Vec<LineKey> = incoming.iter().map(LineKey::from).collect();
    stored.sort();
    fresh.sort();
    stored == fresh
}
