//! Customer first-order index entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "customer_first_orders")]
pub struct Model {
    /// Lower-cased customer email
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_email: String,
    /// Creation timestamp of the earliest known order for this customer
    pub first_order_at: DateTimeWithTimeZone,
    pub first_order_external_id: String,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
