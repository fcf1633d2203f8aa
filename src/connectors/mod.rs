//! Upstream order sources
//!
//! - The `OrderSource` trait and the upstream error taxonomy
//! - The Shopify Admin REST implementation

pub mod shopify;
pub mod trait_;

pub use shopify::ShopifyOrderSource;
pub use trait_::{
    OrderPage, OrderQuery, OrderSource, PageCursor, PageRequest, RejectedOrder, UpstreamError,
};
