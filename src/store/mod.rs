//! Persistence seams.
//!
//! Route handlers and services only see these traits. `postgres` is the
//! production backend; `memory` backs tests and single-process demos.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::aggregates::{
    Order, OrderComment, OrderStatus, OrderStatusHistory, OrderView, Product, ProductDraft, StatusChange,
};
use crate::domain::value_objects::ProductId;
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Active products, optionally only those of one category.
    async fn list_active(&self, category: Option<&str>) -> Result<Vec<Product>>;
    async fn get(&self, id: ProductId) -> Result<Option<Product>>;
    /// Products for the given ids, active or not. Unknown ids are absent from the map.
    async fn find_many(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;
    async fn create(&self, draft: ProductDraft) -> Result<Product>;
    async fn update(&self, id: ProductId, draft: ProductDraft) -> Result<Option<Product>>;
    async fn set_active(&self, id: ProductId, is_active: bool) -> Result<Option<Product>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Order>>;
    /// Newest first.
    async fn list(&self, view: OrderView) -> Result<Vec<Order>>;
    /// Writes the mutable fields of `order` and appends `change`, as one unit.
    ///
    /// The write happens only if the stored status still normalizes to
    /// `expected`; otherwise nothing is written and
    /// [`WallcraftError::ConcurrentUpdate`](crate::WallcraftError::ConcurrentUpdate) is returned.
    async fn update(&self, order: &Order, expected: OrderStatus, change: Option<&StatusChange>) -> Result<()>;
    /// Oldest first.
    async fn history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>>;
    async fn add_comment(&self, order_id: Uuid, author: &str, body: &str) -> Result<OrderComment>;
    async fn comments(&self, order_id: Uuid) -> Result<Vec<OrderComment>>;
    /// Deletes comments, history and the order in one transaction. `false` if the order did not exist.
    async fn purge(&self, order_id: Uuid) -> Result<bool>;
}
