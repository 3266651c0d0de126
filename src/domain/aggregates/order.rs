//! Order Aggregate
//!
//! An order is an immutable snapshot of a checkout. After creation only the
//! fulfilment fields (`status`, `is_deleted`, `courier`, `tracking_code`)
//! move, and status moves only along [`OrderStatus::allowed_next`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{collapse_whitespace, Contact};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum OrderStatus { New, Confirmed, CourierPicked, CourierOnWay, CourierArrived, Completed, Canceled }

/// Values written by the earlier `new / in_progress / shipped / completed`
/// workflow, and a spelling variant, mapped onto the current vocabulary.
const LEGACY_ALIASES: [(&str, OrderStatus); 3] = [
    ("in_progress", OrderStatus::Confirmed),
    ("shipped", OrderStatus::CourierOnWay),
    ("cancelled", OrderStatus::Canceled),
];

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::New, OrderStatus::Confirmed, OrderStatus::CourierPicked, OrderStatus::CourierOnWay,
        OrderStatus::CourierArrived, OrderStatus::Completed, OrderStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::CourierPicked => "courier_picked",
            OrderStatus::CourierOnWay => "courier_on_way",
            OrderStatus::CourierArrived => "courier_arrived",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }

    /// Maps a stored or submitted value, current or legacy, to the canonical status.
    pub fn normalize(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
            .or_else(|| LEGACY_ALIASES.iter().find(|(alias, _)| *alias == raw).map(|&(_, s)| s))
    }

    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            New => &[Confirmed, Canceled],
            Confirmed => &[CourierPicked, Canceled],
            CourierPicked => &[CourierOnWay, Canceled],
            CourierOnWay => &[CourierArrived, Canceled],
            CourierArrived => &[Completed, Canceled],
            Completed | Canceled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool { self.allowed_next().contains(&next) }
    pub fn is_terminal(&self) -> bool { matches!(self, OrderStatus::Completed | OrderStatus::Canceled) }

    /// Every value that may be stored for the given statuses, aliases included.
    pub fn stored_values(statuses: impl IntoIterator<Item = OrderStatus>) -> Vec<String> {
        let mut values = Vec::new();
        for status in statuses {
            values.push(status.as_str().to_string());
            values.extend(LEGACY_ALIASES.iter().filter(|(_, s)| *s == status).map(|(alias, _)| alias.to_string()));
        }
        values
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl TryFrom<String> for OrderStatus {
    type Error = OrderError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value).ok_or(OrderError::UnknownStatus(value))
    }
}

/// Admin listing filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderView { #[default] Active, Archive }

impl OrderView {
    /// Active: not archived and not terminal. Archive: archived OR terminal,
    /// so a completed order shows there even if nobody archived it.
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderView::Active => !order.is_deleted && !order.status.is_terminal(),
            OrderView::Archive => order.is_deleted || order.status.is_terminal(),
        }
    }

    pub fn active_statuses() -> Vec<String> {
        OrderStatus::stored_values(OrderStatus::ALL.into_iter().filter(|s| !s.is_terminal()))
    }
    pub fn terminal_statuses() -> Vec<String> {
        OrderStatus::stored_values(OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal))
    }
}

/// Row shape of the `orders` table. Status is still raw text here.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub name: String,
    pub contact: String,
    pub address: String,
    pub delivery_time: Option<String>,
    pub items: String,
    pub total: Decimal,
    pub status: String,
    pub is_deleted: bool,
    pub courier: Option<String>,
    pub tracking_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    id: Uuid,
    user_id: Option<String>,
    name: String,
    contact: String,
    address: String,
    delivery_time: Option<String>,
    items: String,
    total: Decimal,
    status: OrderStatus,
    is_deleted: bool,
    courier: Option<String>,
    tracking_code: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Validated checkout data an order is created from.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: Option<String>,
    pub name: String,
    pub contact: Contact,
    pub address: String,
    pub delivery_time: Option<String>,
    pub items: String,
    pub total: Decimal,
}

/// One accepted status change, appended to the order's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub order_id: Uuid,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub changed_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: Uuid,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub changed_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrderComment {
    pub id: i64,
    pub order_id: Uuid,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

pub const MAX_COMMENT_LEN: usize = 2000;

impl Order {
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Self {
        let mut order = Self {
            id: Uuid::now_v7(), user_id: new.user_id, name: new.name, contact: new.contact.as_str().to_string(),
            address: new.address, delivery_time: new.delivery_time, items: new.items, total: new.total,
            status: OrderStatus::New, is_deleted: false, courier: None, tracking_code: None, created_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, name: order.name.clone(), contact: order.contact.clone(),
            address: order.address.clone(), items: order.items.clone(), total: order.total,
        }));
        order
    }

    pub fn from_record(record: OrderRecord) -> Result<Self, OrderError> {
        let status = OrderStatus::try_from(record.status)?;
        Ok(Self {
            id: record.id, user_id: record.user_id, name: record.name, contact: record.contact, address: record.address,
            delivery_time: record.delivery_time, items: record.items, total: record.total, status,
            is_deleted: record.is_deleted, courier: record.courier, tracking_code: record.tracking_code,
            created_at: record.created_at, events: vec![],
        })
    }

    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id, user_id: self.user_id.clone(), name: self.name.clone(), contact: self.contact.clone(),
            address: self.address.clone(), delivery_time: self.delivery_time.clone(), items: self.items.clone(),
            total: self.total, status: self.status.as_str().to_string(), is_deleted: self.is_deleted,
            courier: self.courier.clone(), tracking_code: self.tracking_code.clone(), created_at: self.created_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Option<&str> { self.user_id.as_deref() }
    pub fn name(&self) -> &str { &self.name }
    pub fn contact(&self) -> &str { &self.contact }
    pub fn address(&self) -> &str { &self.address }
    pub fn delivery_time(&self) -> Option<&str> { self.delivery_time.as_deref() }
    pub fn items(&self) -> &str { &self.items }
    pub fn total(&self) -> Decimal { self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn is_deleted(&self) -> bool { self.is_deleted }
    pub fn courier(&self) -> Option<&str> { self.courier.as_deref() }
    pub fn tracking_code(&self) -> Option<&str> { self.tracking_code.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn transition(&mut self, to: OrderStatus, actor: &str, now: DateTime<Utc>) -> Result<StatusChange, OrderError> {
        let from = self.status;
        if !from.can_transition_to(to) { return Err(OrderError::InvalidTransition { from, to }); }
        self.status = to;
        if to.is_terminal() { self.is_deleted = true; }
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to, actor: actor.to_string() }));
        Ok(StatusChange { order_id: self.id, old_status: from, new_status: to, changed_by: actor.to_string(), created_at: now })
    }

    /// Brings the order back into the active view. A completed order is
    /// demoted to `confirmed`; a canceled one keeps its status.
    pub fn restore(&mut self, actor: &str, now: DateTime<Utc>) -> Option<StatusChange> {
        self.is_deleted = false;
        let change = (self.status == OrderStatus::Completed).then(|| {
            self.status = OrderStatus::Confirmed;
            StatusChange { order_id: self.id, old_status: OrderStatus::Completed, new_status: OrderStatus::Confirmed, changed_by: actor.to_string(), created_at: now }
        });
        self.raise_event(DomainEvent::Order(OrderEvent::Restored { order_id: self.id, status: self.status }));
        change
    }

    pub fn archive(&mut self) {
        self.is_deleted = true;
        self.raise_event(DomainEvent::Order(OrderEvent::Archived { order_id: self.id }));
    }

    pub fn unarchive(&mut self) {
        self.is_deleted = false;
        self.raise_event(DomainEvent::Order(OrderEvent::Unarchived { order_id: self.id }));
    }

    pub fn set_delivery(&mut self, courier: Option<String>, tracking_code: Option<String>) {
        let clean = |v: Option<String>| v.map(|s| collapse_whitespace(&s)).filter(|s| !s.is_empty());
        self.courier = clean(courier);
        self.tracking_code = clean(tracking_code);
    }

    pub fn mark_purged(&mut self) { self.raise_event(DomainEvent::Order(OrderEvent::Purged { order_id: self.id })); }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

/// Trims a comment body and enforces its bounds.
pub fn check_comment(body: &str) -> Result<String, OrderError> {
    let body = body.trim();
    if body.is_empty() { return Err(OrderError::EmptyComment); }
    if body.chars().count() > MAX_COMMENT_LEN { return Err(OrderError::CommentTooLong); }
    Ok(body.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Status change {from} -> {to} is not allowed")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
    #[error("Comment is empty")]
    EmptyComment,
    #[error("Comment is longer than 2000 characters")]
    CommentTooLong,
}
