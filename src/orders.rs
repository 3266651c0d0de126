//! Admin operations on placed orders.
//!
//! Every mutation loads the order, applies the rule on the aggregate, and
//! writes it back conditioned on the status it was loaded with. Two admins
//! racing on the same order therefore cannot silently overwrite each other:
//! the slower one gets [`WallcraftError::ConcurrentUpdate`].

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{check_comment, Order, OrderComment, OrderStatus, OrderStatusHistory, OrderView};
use crate::notify::{dispatch, Notifier};
use crate::store::OrderStore;
use crate::{Result, WallcraftError};

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub history: Vec<OrderStatusHistory>,
    pub comments: Vec<OrderComment>,
    pub allowed_next: Vec<OrderStatus>,
}

pub struct OrderAdmin {
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
}

impl OrderAdmin {
    pub fn new(store: Arc<dyn OrderStore>, notifier: Arc<dyn Notifier>) -> Self { Self { store, notifier } }

    pub async fn list(&self, view: OrderView) -> Result<Vec<Order>> { self.store.list(view).await }

    pub async fn details(&self, id: Uuid) -> Result<OrderDetails> {
        let order = self.load(id).await?;
        let history = self.store.history(id).await?;
        let comments = self.store.comments(id).await?;
        let allowed_next = order.status().allowed_next().to_vec();
        Ok(OrderDetails { order, history, comments, allowed_next })
    }

    #[instrument(skip(self))]
    pub async fn transition(&self, id: Uuid, to: OrderStatus, actor: &str) -> Result<Order> {
        let mut order = self.load(id).await?;
        let expected = order.status();
        let change = order.transition(to, actor, Utc::now())?;
        self.store.update(&order, expected, Some(&change)).await?;
        info!(from = %expected, to = %to, "order status changed");
        Ok(self.publish(order))
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, id: Uuid, actor: &str) -> Result<Order> {
        let mut order = self.load(id).await?;
        let expected = order.status();
        let change = order.restore(actor, Utc::now());
        self.store.update(&order, expected, change.as_ref()).await?;
        info!(status = %order.status(), "order restored");
        Ok(self.publish(order))
    }

    #[instrument(skip(self))]
    pub async fn archive(&self, id: Uuid) -> Result<Order> {
        let mut order = self.load(id).await?;
        let expected = order.status();
        order.archive();
        self.store.update(&order, expected, None).await?;
        Ok(self.publish(order))
    }

    #[instrument(skip(self))]
    pub async fn unarchive(&self, id: Uuid) -> Result<Order> {
        let mut order = self.load(id).await?;
        let expected = order.status();
        order.unarchive();
        self.store.update(&order, expected, None).await?;
        Ok(self.publish(order))
    }

    #[instrument(skip(self))]
    pub async fn set_delivery(&self, id: Uuid, courier: Option<String>, tracking_code: Option<String>) -> Result<Order> {
        let mut order = self.load(id).await?;
        let expected = order.status();
        order.set_delivery(courier, tracking_code);
        self.store.update(&order, expected, None).await?;
        Ok(order)
    }

    #[instrument(skip(self, body))]
    pub async fn add_comment(&self, id: Uuid, author: &str, body: &str) -> Result<OrderComment> {
        let body = check_comment(body)?;
        self.store.add_comment(id, author, &body).await
    }

    /// Irreversible. Comments and history go first, then the order row.
    #[instrument(skip(self))]
    pub async fn purge(&self, id: Uuid) -> Result<()> {
        let mut order = self.load(id).await?;
        if !self.store.purge(id).await? { return Err(WallcraftError::OrderNotFound); }
        order.mark_purged();
        info!("order purged");
        self.publish(order);
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Order> {
        self.store.get(id).await?.ok_or(WallcraftError::OrderNotFound)
    }

    fn publish(&self, mut order: Order) -> Order {
        for event in order.take_events() {
            dispatch(self.notifier.clone(), event);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{NewOrder, OrderError, OrderRecord};
    use crate::domain::events::{DomainEvent, OrderEvent};
    use crate::domain::value_objects::Contact;
    use crate::store::MemoryStore;
    use crate::test_utils::{init_test_tracing, RecordingNotifier};
    use rust_decimal::Decimal;

    struct Fixture { store: Arc<MemoryStore>, notifier: Arc<RecordingNotifier>, admin: OrderAdmin }

    fn fixture() -> Fixture {
        init_test_tracing();
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let admin = OrderAdmin::new(store.clone(), notifier.clone());
        Fixture { store, notifier, admin }
    }

    async fn placed(store: &MemoryStore) -> Uuid {
        let order = Order::place(NewOrder {
            user_id: None, name: "Anna".into(), contact: Contact::parse("anna@example.lv").unwrap(), address: "Riga".into(),
            delivery_time: None, items: "[]".into(), total: Decimal::new(2500, 2),
        }, Utc::now());
        store.insert(&order).await.unwrap();
        order.id()
    }

    async fn walk(admin: &OrderAdmin, id: Uuid, path: &[OrderStatus]) {
        for &status in path { admin.transition(id, status, "admin1").await.unwrap(); }
    }

    #[tokio::test]
    async fn test_transition_appends_one_history_row() {
        let f = fixture();
        let id = placed(&f.store).await;
        walk(&f.admin, id, &[OrderStatus::Confirmed]).await;
        let order = f.admin.transition(id, OrderStatus::CourierPicked, "admin1").await.unwrap();
        assert_eq!(order.status(), OrderStatus::CourierPicked);
        let history = f.store.history(id).await.unwrap();
        assert_eq!(history.len(), 2);
        let last = history.last().unwrap();
        assert_eq!((last.old_status, last.new_status, last.changed_by.as_str()), (OrderStatus::Confirmed, OrderStatus::CourierPicked, "admin1"));
        let events = f.notifier.wait_for(2).await;
        assert!(events.iter().all(|e| matches!(e, DomainEvent::Order(OrderEvent::StatusChanged { .. }))));
    }

    #[tokio::test]
    async fn test_rejected_transition_writes_nothing() {
        let f = fixture();
        let id = placed(&f.store).await;
        let err = f.admin.transition(id, OrderStatus::CourierOnWay, "admin1").await.unwrap_err();
        assert!(matches!(err, WallcraftError::Order(OrderError::InvalidTransition { .. })));
        let same = f.admin.transition(id, OrderStatus::New, "admin1").await.unwrap_err();
        assert!(matches!(same, WallcraftError::Order(OrderError::InvalidTransition { .. })));
        let details = f.admin.details(id).await.unwrap();
        assert_eq!(details.order.status(), OrderStatus::New);
        assert!(details.history.is_empty());
    }

    #[tokio::test]
    async fn test_completion_archives_and_restore_demotes() {
        let f = fixture();
        let id = placed(&f.store).await;
        walk(&f.admin, id, &[
            OrderStatus::Confirmed, OrderStatus::CourierPicked, OrderStatus::CourierOnWay,
            OrderStatus::CourierArrived, OrderStatus::Completed,
        ]).await;
        assert!(f.admin.list(OrderView::Active).await.unwrap().is_empty());
        let archived = f.admin.list(OrderView::Archive).await.unwrap();
        assert!(archived[0].is_deleted());

        let restored = f.admin.restore(id, "admin2").await.unwrap();
        assert_eq!(restored.status(), OrderStatus::Confirmed);
        assert!(!restored.is_deleted());
        assert_eq!(f.admin.list(OrderView::Active).await.unwrap().len(), 1);
        assert_eq!(f.store.history(id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_restore_keeps_canceled() {
        let f = fixture();
        let id = placed(&f.store).await;
        walk(&f.admin, id, &[OrderStatus::Canceled]).await;
        let restored = f.admin.restore(id, "admin1").await.unwrap();
        assert_eq!(restored.status(), OrderStatus::Canceled);
        assert!(!restored.is_deleted());
        // terminal status alone keeps it in the archive view
        assert_eq!(f.admin.list(OrderView::Archive).await.unwrap().len(), 1);
        assert!(f.admin.list(OrderView::Active).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_archive_toggle() {
        let f = fixture();
        let id = placed(&f.store).await;
        let order = f.admin.archive(id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::New);
        assert_eq!(f.admin.list(OrderView::Archive).await.unwrap().len(), 1);
        f.admin.unarchive(id).await.unwrap();
        assert_eq!(f.admin.list(OrderView::Active).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_write_is_refused() {
        let f = fixture();
        let id = placed(&f.store).await;
        let mut first = OrderStore::get(f.store.as_ref(), id).await.unwrap().unwrap();
        let mut second = first.clone();
        let c1 = first.transition(OrderStatus::Confirmed, "admin1", Utc::now()).unwrap();
        f.store.update(&first, OrderStatus::New, Some(&c1)).await.unwrap();
        let c2 = second.transition(OrderStatus::Canceled, "admin2", Utc::now()).unwrap();
        let err = f.store.update(&second, OrderStatus::New, Some(&c2)).await.unwrap_err();
        assert!(matches!(err, WallcraftError::ConcurrentUpdate));
        let details = f.admin.details(id).await.unwrap();
        assert_eq!(details.order.status(), OrderStatus::Confirmed);
        assert_eq!(details.history.len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_rows_are_normalized() {
        let f = fixture();
        let record = OrderRecord {
            id: Uuid::now_v7(), user_id: None, name: "Old".into(), contact: "+37120000000".into(), address: "Riga".into(),
            delivery_time: None, items: "Ocean x1".into(), total: Decimal::new(2500, 2), status: "shipped".into(),
            is_deleted: false, courier: None, tracking_code: None, created_at: Utc::now(),
        };
        let id = record.id;
        f.store.insert_record(record).await;
        assert_eq!(f.admin.list(OrderView::Active).await.unwrap()[0].status(), OrderStatus::CourierOnWay);
        let order = f.admin.transition(id, OrderStatus::CourierArrived, "admin1").await.unwrap();
        assert_eq!(order.status(), OrderStatus::CourierArrived);
    }

    #[tokio::test]
    async fn test_purge_removes_dependents() {
        let f = fixture();
        let id = placed(&f.store).await;
        walk(&f.admin, id, &[OrderStatus::Confirmed]).await;
        f.admin.add_comment(id, "admin1", "  called the customer  ").await.unwrap();
        f.admin.purge(id).await.unwrap();
        assert!(f.store.history(id).await.unwrap().is_empty());
        assert!(f.store.comments(id).await.unwrap().is_empty());
        assert!(matches!(f.admin.details(id).await, Err(WallcraftError::OrderNotFound)));
        assert!(matches!(f.admin.purge(id).await, Err(WallcraftError::OrderNotFound)));
    }

    #[tokio::test]
    async fn test_comments_and_delivery() {
        let f = fixture();
        let id = placed(&f.store).await;
        let comment = f.admin.add_comment(id, "admin1", "  leave at the door ").await.unwrap();
        assert_eq!(comment.body, "leave at the door");
        assert!(f.admin.add_comment(id, "admin1", "   ").await.is_err());
        assert!(matches!(f.admin.add_comment(Uuid::now_v7(), "admin1", "hi").await, Err(WallcraftError::OrderNotFound)));
        let order = f.admin.set_delivery(id, Some("DPD".into()), Some("LV123".into())).await.unwrap();
        assert_eq!((order.courier(), order.tracking_code()), (Some("DPD"), Some("LV123")));
        let details = f.admin.details(id).await.unwrap();
        assert_eq!(details.comments.len(), 1);
        assert_eq!(details.allowed_next, vec![OrderStatus::Confirmed, OrderStatus::Canceled]);
    }
}
