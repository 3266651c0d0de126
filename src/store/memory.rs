//! In-process store. Holds rows in the same shape as the SQL tables, raw
//! status text included, so legacy values go through the same normalization.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::domain::aggregates::{
    Order, OrderComment, OrderRecord, OrderStatus, OrderStatusHistory, OrderView, Product, ProductDraft, StatusChange,
};
use crate::domain::value_objects::ProductId;
use crate::store::{OrderStore, ProductStore};
use crate::{Result, WallcraftError};

#[derive(Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    next_product_id: ProductId,
    orders: HashMap<Uuid, OrderRecord>,
    history: Vec<OrderStatusHistory>,
    comments: Vec<OrderComment>,
    next_row_id: i64,
}

impl Tables {
    fn row_id(&mut self) -> i64 { self.next_row_id += 1; self.next_row_id }
}

#[derive(Default)]
pub struct MemoryStore { tables: Mutex<Tables> }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Inserts a raw order row as-is, e.g. one carrying a legacy status.
    pub async fn insert_record(&self, record: OrderRecord) { self.tables.lock().await.orders.insert(record.id, record); }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list_active(&self, category: Option<&str>) -> Result<Vec<Product>> {
        Ok(self.tables.lock().await.products.values()
            .filter(|p| p.is_active && category.map_or(true, |c| p.category.as_deref() == Some(c)))
            .cloned()
            .collect())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let tables = self.tables.lock().await;
        Ok(ids.iter().filter_map(|id| tables.products.get(id).map(|p| (*id, p.clone()))).collect())
    }

    async fn create(&self, draft: ProductDraft) -> Result<Product> {
        let draft = draft.checked()?;
        let mut tables = self.tables.lock().await;
        tables.next_product_id += 1;
        let now = Utc::now();
        let product = Product {
            id: tables.next_product_id, name: draft.name, description: draft.description, category: draft.category,
            price: draft.price, image: draft.image, is_active: draft.is_active, created_at: now, updated_at: now,
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(&self, id: ProductId, draft: ProductDraft) -> Result<Option<Product>> {
        let draft = draft.checked()?;
        let mut tables = self.tables.lock().await;
        Ok(tables.products.get_mut(&id).map(|p| {
            p.name = draft.name;
            p.description = draft.description;
            p.category = draft.category;
            p.price = draft.price;
            p.image = draft.image;
            p.is_active = draft.is_active;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn set_active(&self, id: ProductId, is_active: bool) -> Result<Option<Product>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.products.get_mut(&id).map(|p| {
            p.is_active = is_active;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        self.tables.lock().await.orders.insert(order.id(), order.to_record());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let tables = self.tables.lock().await;
        tables.orders.get(&id).cloned().map(Order::from_record).transpose().map_err(Into::into)
    }

    async fn list(&self, view: OrderView) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut orders = tables.orders.values().cloned().map(Order::from_record).collect::<std::result::Result<Vec<_>, _>>()?;
        orders.retain(|o| view.matches(o));
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn update(&self, order: &Order, expected: OrderStatus, change: Option<&StatusChange>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let row = tables.orders.get(&order.id()).ok_or(WallcraftError::OrderNotFound)?;
        if OrderStatus::normalize(&row.status) != Some(expected) { return Err(WallcraftError::ConcurrentUpdate); }
        tables.orders.insert(order.id(), order.to_record());
        if let Some(change) = change {
            let id = tables.row_id();
            tables.history.push(OrderStatusHistory {
                id, order_id: change.order_id, old_status: change.old_status, new_status: change.new_status,
                changed_by: change.changed_by.clone(), created_at: change.created_at,
            });
        }
        Ok(())
    }

    async fn history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>> {
        Ok(self.tables.lock().await.history.iter().filter(|h| h.order_id == order_id).cloned().collect())
    }

    async fn add_comment(&self, order_id: Uuid, author: &str, body: &str) -> Result<OrderComment> {
        let mut tables = self.tables.lock().await;
        if !tables.orders.contains_key(&order_id) { return Err(WallcraftError::OrderNotFound); }
        let comment = OrderComment { id: tables.row_id(), order_id, author: author.to_string(), body: body.to_string(), created_at: Utc::now() };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn comments(&self, order_id: Uuid) -> Result<Vec<OrderComment>> {
        Ok(self.tables.lock().await.comments.iter().filter(|c| c.order_id == order_id).cloned().collect())
    }

    async fn purge(&self, order_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if !tables.orders.contains_key(&order_id) { return Ok(false); }
        tables.comments.retain(|c| c.order_id != order_id);
        tables.history.retain(|h| h.order_id != order_id);
        tables.orders.remove(&order_id);
        Ok(true)
    }
}
