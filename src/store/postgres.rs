//! Postgres backend.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{
    Order, OrderComment, OrderRecord, OrderStatus, OrderStatusHistory, OrderView, Product, ProductDraft, StatusChange,
};
use crate::domain::value_objects::ProductId;
use crate::store::{OrderStore, ProductStore};
use crate::{Result, WallcraftError};

const ORDER_COLUMNS: &str = "id, user_id, name, contact, address, delivery_time, items, total, status, is_deleted, courier, tracking_code, created_at";

#[derive(sqlx::FromRow)]
struct HistoryRow { id: i64, order_id: Uuid, old_status: String, new_status: String, changed_by: String, created_at: chrono::DateTime<chrono::Utc> }

impl TryFrom<HistoryRow> for OrderStatusHistory {
    type Error = WallcraftError;
    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(Self {
            id: row.id, order_id: row.order_id, old_status: OrderStatus::try_from(row.old_status)?,
            new_status: OrderStatus::try_from(row.new_status)?, changed_by: row.changed_by, created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    /// Wraps a pool whose schema is already migrated.
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    /// Opens the pool and brings the schema up to date.
    #[instrument(skip(url))]
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database ready");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn list_active(&self, category: Option<&str>) -> Result<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE is_active AND ($1::TEXT IS NULL OR category = $1) ORDER BY id")
            .bind(category).fetch_all(&self.pool).await?)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids).fetch_all(&self.pool).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn create(&self, draft: ProductDraft) -> Result<Product> {
        let d = draft.checked()?;
        Ok(sqlx::query_as::<_, Product>("INSERT INTO products (name, description, category, price, image, is_active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING *")
            .bind(&d.name).bind(&d.description).bind(&d.category).bind(d.price).bind(&d.image).bind(d.is_active)
            .fetch_one(&self.pool).await?)
    }

    async fn update(&self, id: ProductId, draft: ProductDraft) -> Result<Option<Product>> {
        let d = draft.checked()?;
        Ok(sqlx::query_as::<_, Product>("UPDATE products SET name = $2, description = $3, category = $4, price = $5, image = $6, is_active = $7, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(&d.name).bind(&d.description).bind(&d.category).bind(d.price).bind(&d.image).bind(d.is_active)
            .fetch_optional(&self.pool).await?)
    }

    async fn set_active(&self, id: ProductId, is_active: bool) -> Result<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>("UPDATE products SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(is_active).fetch_optional(&self.pool).await?)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    #[instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn insert(&self, order: &Order) -> Result<()> {
        let r = order.to_record();
        sqlx::query(&format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"))
            .bind(r.id).bind(&r.user_id).bind(&r.name).bind(&r.contact).bind(&r.address).bind(&r.delivery_time)
            .bind(&r.items).bind(r.total).bind(&r.status).bind(r.is_deleted).bind(&r.courier).bind(&r.tracking_code).bind(r.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let record = sqlx::query_as::<_, OrderRecord>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(record.map(Order::from_record).transpose()?)
    }

    async fn list(&self, view: OrderView) -> Result<Vec<Order>> {
        let query = match view {
            OrderView::Active => format!("SELECT {ORDER_COLUMNS} FROM orders WHERE is_deleted = FALSE AND lower(trim(status)) = ANY($1) ORDER BY created_at DESC"),
            OrderView::Archive => format!("SELECT {ORDER_COLUMNS} FROM orders WHERE is_deleted = TRUE OR lower(trim(status)) = ANY($1) ORDER BY created_at DESC"),
        };
        let statuses = match view {
            OrderView::Active => OrderView::active_statuses(),
            OrderView::Archive => OrderView::terminal_statuses(),
        };
        let records = sqlx::query_as::<_, OrderRecord>(&query).bind(&statuses).fetch_all(&self.pool).await?;
        records.into_iter().map(|r| Order::from_record(r).map_err(Into::into)).collect()
    }

    #[instrument(skip(self, order, change), fields(order_id = %order.id(), expected = %expected))]
    async fn update(&self, order: &Order, expected: OrderStatus, change: Option<&StatusChange>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE orders SET status = $2, is_deleted = $3, courier = $4, tracking_code = $5 WHERE id = $1 AND lower(trim(status)) = ANY($6)")
            .bind(order.id()).bind(order.status().as_str()).bind(order.is_deleted()).bind(order.courier()).bind(order.tracking_code())
            .bind(OrderStatus::stored_values([expected]))
            .execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
                .bind(order.id()).fetch_one(&self.pool).await?;
            return Err(if exists { WallcraftError::ConcurrentUpdate } else { WallcraftError::OrderNotFound });
        }
        if let Some(c) = change {
            sqlx::query("INSERT INTO order_status_history (order_id, old_status, new_status, changed_by, created_at) VALUES ($1, $2, $3, $4, $5)")
                .bind(c.order_id).bind(c.old_status.as_str()).bind(c.new_status.as_str()).bind(&c.changed_by).bind(c.created_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!("order updated");
        Ok(())
    }

    async fn history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>> {
        let rows = sqlx::query_as::<_, HistoryRow>("SELECT id, order_id, old_status, new_status, changed_by, created_at FROM order_status_history WHERE order_id = $1 ORDER BY id")
            .bind(order_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(OrderStatusHistory::try_from).collect()
    }

    async fn add_comment(&self, order_id: Uuid, author: &str, body: &str) -> Result<OrderComment> {
        let comment = sqlx::query_as::<_, OrderComment>("INSERT INTO order_comments (order_id, author, body, created_at) SELECT id, $2, $3, NOW() FROM orders WHERE id = $1 RETURNING id, order_id, author, body, created_at")
            .bind(order_id).bind(author).bind(body).fetch_optional(&self.pool).await?;
        comment.ok_or(WallcraftError::OrderNotFound)
    }

    async fn comments(&self, order_id: Uuid) -> Result<Vec<OrderComment>> {
        Ok(sqlx::query_as::<_, OrderComment>("SELECT id, order_id, author, body, created_at FROM order_comments WHERE order_id = $1 ORDER BY id")
            .bind(order_id).fetch_all(&self.pool).await?)
    }

    #[instrument(skip(self))]
    async fn purge(&self, order_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM order_comments WHERE order_id = $1").bind(order_id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM order_status_history WHERE order_id = $1").bind(order_id).execute(&mut *tx).await?;
        let deleted = sqlx::query("DELETE FROM orders WHERE id = $1").bind(order_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Order, OrderStatus, OrderStore, OrderView, PgPool, PgStore, WallcraftError};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use crate::domain::aggregates::NewOrder;
    use crate::domain::value_objects::Contact;

    async fn placed(store: &PgStore) -> Order {
        let order = Order::place(NewOrder {
            user_id: Some("u-1".into()), name: "Anna".into(), contact: Contact::parse("anna@example.lv").unwrap(),
            address: "Riga".into(), delivery_time: None, items: "[]".into(), total: Decimal::new(2500, 2),
        }, Utc::now());
        store.insert(&order).await.unwrap();
        order
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_transition_writes_status_and_history(pool: PgPool) {
        let store = PgStore::new(pool);
        let order = placed(&store).await;

        let mut loaded = store.get(order.id()).await.unwrap().unwrap();
        let change = loaded.transition(OrderStatus::Confirmed, "ilze", Utc::now()).unwrap();
        store.update(&loaded, OrderStatus::New, Some(&change)).await.unwrap();

        let stored = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);
        let history = store.history(order.id()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].old_status, history[0].new_status, history[0].changed_by.as_str()), (OrderStatus::New, OrderStatus::Confirmed, "ilze"));
        assert_eq!(store.list(OrderView::Active).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_stale_update_writes_nothing(pool: PgPool) {
        let store = PgStore::new(pool);
        let order = placed(&store).await;
        let mut first = store.get(order.id()).await.unwrap().unwrap();
        let mut second = first.clone();

        let change = first.transition(OrderStatus::Confirmed, "ilze", Utc::now()).unwrap();
        store.update(&first, OrderStatus::New, Some(&change)).await.unwrap();

        let late = second.transition(OrderStatus::Canceled, "maris", Utc::now()).unwrap();
        let err = store.update(&second, OrderStatus::New, Some(&late)).await.unwrap_err();
        assert!(matches!(err, WallcraftError::ConcurrentUpdate));

        let stored = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);
        assert!(!stored.is_deleted());
        assert_eq!(store.history(order.id()).await.unwrap().len(), 1);

        let gone = placed(&store).await;
        store.purge(gone.id()).await.unwrap();
        assert!(matches!(store.update(&gone, OrderStatus::New, None).await, Err(WallcraftError::OrderNotFound)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_purge_removes_dependent_rows(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let order = placed(&store).await;
        let keep = placed(&store).await;
        let mut loaded = store.get(order.id()).await.unwrap().unwrap();
        let change = loaded.transition(OrderStatus::Canceled, "ilze", Utc::now()).unwrap();
        store.update(&loaded, OrderStatus::New, Some(&change)).await.unwrap();
        store.add_comment(order.id(), "ilze", "customer called").await.unwrap();
        store.add_comment(keep.id(), "ilze", "keep me").await.unwrap();

        assert!(store.purge(order.id()).await.unwrap());
        assert!(store.get(order.id()).await.unwrap().is_none());
        let orphans: i64 = sqlx::query_scalar("SELECT (SELECT COUNT(*) FROM order_comments WHERE order_id = $1) + (SELECT COUNT(*) FROM order_status_history WHERE order_id = $1)")
            .bind(order.id()).fetch_one(&pool).await.unwrap();
        assert_eq!(orphans, 0);
        assert_eq!(store.comments(keep.id()).await.unwrap().len(), 1);
        assert!(!store.purge(order.id()).await.unwrap());
        assert!(matches!(store.add_comment(order.id(), "ilze", "late").await, Err(WallcraftError::OrderNotFound)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_status_text_is_matched_case_insensitively(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let order = placed(&store).await;
        sqlx::query("UPDATE orders SET status = ' Completed' WHERE id = $1").bind(order.id()).execute(&pool).await.unwrap();

        assert!(store.list(OrderView::Active).await.unwrap().is_empty());
        assert_eq!(store.list(OrderView::Archive).await.unwrap().len(), 1);

        let mut loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), OrderStatus::Completed);
        let change = loaded.restore("ilze", Utc::now());
        store.update(&loaded, OrderStatus::Completed, change.as_ref()).await.unwrap();
        assert_eq!(store.get(order.id()).await.unwrap().unwrap().status(), OrderStatus::Confirmed);
        assert_eq!(store.list(OrderView::Active).await.unwrap().len(), 1);
    }
}
