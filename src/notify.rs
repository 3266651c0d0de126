//! Operator notifications.
//!
//! Delivery is fire-and-forget: [`dispatch`] spawns the send and only logs a
//! failure. Nothing that placed or changed an order waits on it.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::pricing::SnapshotLine;
use crate::{Result, WallcraftError};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &DomainEvent) -> Result<()>;
}

/// Sends `event` in the background.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: DomainEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            warn!(error = %e, subject = event.subject(), "notification failed");
        }
    })
}

/// Writes events to the log. Used when no sink is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &DomainEvent) -> Result<()> {
        info!(subject = event.subject(), ?event, "order event");
        Ok(())
    }
}

/// Telegram bot API `sendMessage` sink.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self> {
        Self::with_api_base("https://api.telegram.org", bot_token, chat_id)
    }

    pub fn with_api_base(api_base: &str, bot_token: &str, chat_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WallcraftError::Notification(e.to_string()))?;
        Ok(Self { client, endpoint: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), bot_token), chat_id: chat_id.to_string() })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &DomainEvent) -> Result<()> {
        let Some(text) = message_text(event) else { return Ok(()) };
        self.client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WallcraftError::Notification(e.to_string()))?;
        debug!("telegram message sent");
        Ok(())
    }
}

/// Human-readable message for the operator chat; `None` for events the chat does not need.
pub fn message_text(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::Order(OrderEvent::Placed { order_id, name, contact, address, items, total }) => {
            let lines = serde_json::from_str::<Vec<SnapshotLine>>(items)
                .map(|lines| lines.iter().map(|l| format!("- {} x{} = {:.2}", l.name, l.quantity, l.total.round_dp(2))).collect::<Vec<_>>().join("\n"))
                .unwrap_or_else(|_| items.clone());
            Some(format!("New order {order_id}\nName: {name}\nContact: {contact}\nAddress: {address}\n{lines}\nTotal: {:.2}", total.round_dp(2)))
        }
        DomainEvent::Order(OrderEvent::StatusChanged { order_id, from, to, actor }) => {
            Some(format!("Order {order_id}: {from} -> {to} ({actor})"))
        }
        _ => None,
    }
}

/// Publishes every event as JSON on its NATS subject.
pub struct NatsNotifier { client: async_nats::Client }

impl NatsNotifier {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url).await.map_err(|e| WallcraftError::Notification(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, event: &DomainEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(event.subject().to_string(), payload.into())
            .await
            .map_err(|e| WallcraftError::Notification(e.to_string()))
    }
}

/// Sends to every sink; one failing sink does not stop the others.
pub struct FanOut(pub Vec<Arc<dyn Notifier>>);

#[async_trait]
impl Notifier for FanOut {
    async fn notify(&self, event: &DomainEvent) -> Result<()> {
        let mut failures = Vec::new();
        for sink in &self.0 {
            if let Err(e) = sink.notify(event).await { failures.push(e.to_string()); }
        }
        if failures.is_empty() { Ok(()) } else { Err(WallcraftError::Notification(failures.join("; "))) }
    }
}
