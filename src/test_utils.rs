use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use crate::domain::aggregates::{Product, ProductDraft};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::ProductId;
use crate::notify::Notifier;
use crate::store::{MemoryStore, ProductStore};

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

pub(crate) fn product(id: ProductId, price: Decimal, is_active: bool) -> Product {
    Product {
        id, name: format!("Product {id}"), description: String::new(), category: Some("walls".into()), price,
        image: None, is_active, created_at: Utc::now(), updated_at: Utc::now(),
    }
}

pub(crate) fn draft(name: &str, price: Decimal) -> ProductDraft {
    ProductDraft { name: name.into(), description: String::new(), category: Some("walls".into()), price, image: None, is_active: true }
}

/// Store with product 1 "Ocean" at 10.00 and product 2 "Golden" at 5.00.
pub(crate) async fn seeded_store() -> MemoryStore {
    init_test_tracing();
    let store = MemoryStore::new();
    store.create(draft("Ocean", Decimal::new(1000, 2))).await.unwrap();
    store.create(draft("Golden", Decimal::new(500, 2))).await.unwrap();
    store
}

#[derive(Default)]
pub(crate) struct RecordingNotifier { events: Mutex<Vec<DomainEvent>> }

impl RecordingNotifier {
    pub(crate) async fn events(&self) -> Vec<DomainEvent> { self.events.lock().await.clone() }

    /// Yields until at least `n` events arrived from background dispatch.
    pub(crate) async fn wait_for(&self, n: usize) -> Vec<DomainEvent> {
        for _ in 0..100 {
            let events = self.events().await;
            if events.len() >= n { return events; }
            tokio::task::yield_now().await;
        }
        self.events().await
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &DomainEvent) -> crate::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
