//! Cart Aggregate
//!
//! The cart lives in the visitor's session. It is never persisted on its own
//! and never shared between sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::value_objects::{ProductId, Quantity};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredCart")]
pub struct Cart {
    lines: BTreeMap<ProductId, Quantity>,
    checkout_token: Option<String>,
    last_order_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    dirty: bool,
}

/// Wire form of a cart. Quantities are taken as plain integers so a stale
/// session holding zero lines still loads; those lines are dropped.
#[derive(Deserialize)]
struct StoredCart {
    #[serde(default)]
    lines: BTreeMap<ProductId, u32>,
    #[serde(default)]
    checkout_token: Option<String>,
    #[serde(default)]
    last_order_at: Option<DateTime<Utc>>,
}

impl From<StoredCart> for Cart {
    fn from(stored: StoredCart) -> Self {
        let lines = stored.lines.into_iter().filter_map(|(id, qty)| Quantity::new(qty).map(|q| (id, q))).collect();
        Self { lines, checkout_token: stored.checkout_token, last_order_at: stored.last_order_at, dirty: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction { Increase, Decrease }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOutcome {
    Updated(Quantity),
    Removed,
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CartLine { pub product_id: ProductId, pub quantity: Quantity }

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn lines(&self) -> impl Iterator<Item = CartLine> + '_ {
        self.lines.iter().map(|(&product_id, &quantity)| CartLine { product_id, quantity })
    }
    pub fn product_ids(&self) -> Vec<ProductId> { self.lines.keys().copied().collect() }
    pub fn quantity_of(&self, product_id: ProductId) -> Option<Quantity> { self.lines.get(&product_id).copied() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line_count(&self) -> usize { self.lines.len() }
    pub fn total_item_count(&self) -> u64 { self.lines.values().map(|q| u64::from(q.value())).sum() }

    pub fn add(&mut self, product_id: ProductId) -> Quantity {
        let qty = self.lines.get(&product_id).map_or(Quantity::ONE, Quantity::increment);
        self.lines.insert(product_id, qty);
        self.dirty = true;
        qty
    }

    pub fn change(&mut self, product_id: ProductId, direction: Direction) -> ChangeOutcome {
        let Some(current) = self.lines.get(&product_id).copied() else { return ChangeOutcome::NotFound };
        self.dirty = true;
        let next = match direction {
            Direction::Increase => Some(current.increment()),
            Direction::Decrease => current.decrement(),
        };
        match next {
            Some(qty) => { self.lines.insert(product_id, qty); ChangeOutcome::Updated(qty) }
            None => { self.lines.remove(&product_id); ChangeOutcome::Removed }
        }
    }

    /// Empties the lines. The throttle marker survives so that a cleared cart
    /// cannot be used to skip the checkout cool-down.
    pub fn clear(&mut self) {
        if !self.lines.is_empty() { self.dirty = true; }
        self.lines.clear();
    }

    pub fn checkout_token(&self) -> Option<&str> { self.checkout_token.as_deref() }

    /// Replaces any unconsumed token with a fresh one.
    pub fn issue_checkout_token(&mut self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.checkout_token = Some(token.clone());
        self.dirty = true;
        token
    }

    pub fn consume_checkout_token(&mut self) -> Option<String> {
        self.dirty = true;
        self.checkout_token.take()
    }

    pub fn last_order_at(&self) -> Option<DateTime<Utc>> { self.last_order_at }
    pub fn record_order(&mut self, at: DateTime<Utc>) { self.last_order_at = Some(at); self.dirty = true; }

    pub fn is_dirty(&self) -> bool { self.dirty }
    pub fn mark_clean(&mut self) { self.dirty = false; }
}
