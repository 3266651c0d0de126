//! Domain events
use crate::domain::aggregates::order::OrderStatus;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, name: String, contact: String, address: String, items: String, total: Decimal },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus, actor: String },
    Restored { order_id: Uuid, status: OrderStatus },
    Archived { order_id: Uuid },
    Unarchived { order_id: Uuid },
    Purged { order_id: Uuid },
}

impl DomainEvent {
    /// NATS subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::Order(OrderEvent::Placed { .. }) => "wallcraft.order.placed",
            DomainEvent::Order(OrderEvent::StatusChanged { .. }) => "wallcraft.order.status_changed",
            DomainEvent::Order(OrderEvent::Restored { .. }) => "wallcraft.order.restored",
            DomainEvent::Order(OrderEvent::Archived { .. }) => "wallcraft.order.archived",
            DomainEvent::Order(OrderEvent::Unarchived { .. }) => "wallcraft.order.unarchived",
            DomainEvent::Order(OrderEvent::Purged { .. }) => "wallcraft.order.purged",
        }
    }
}
