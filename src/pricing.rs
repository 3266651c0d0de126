//! Pricing of a cart against the current catalog.
//!
//! Prices are always read live; nothing is cached in the cart. A product that
//! disappeared or was deactivated after it went into a cart contributes zero
//! and is reported in [`PricedCart::skipped`] instead of failing the request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use crate::domain::aggregates::{Cart, Product};
use crate::domain::value_objects::{Money, ProductId, Quantity};
use crate::store::ProductStore;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub skipped: Vec<ProductId>,
    pub total: Decimal,
    pub item_count: u64,
}

/// Immutable text + total pair stored on an order.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderSnapshot {
    pub items: String,
    pub total: Decimal,
}

/// One entry of the serialized `items` column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

pub fn line_total(product: Option<&Product>, quantity: Quantity) -> Decimal {
    match product {
        Some(p) if p.is_purchasable() => p.price * Decimal::from(quantity.value()),
        _ => Decimal::ZERO,
    }
}

pub fn price_cart(cart: &Cart, products: &HashMap<ProductId, Product>) -> PricedCart {
    let mut priced = PricedCart::default();
    for line in cart.lines() {
        match products.get(&line.product_id).filter(|p| p.is_purchasable()) {
            Some(product) => {
                let total = line_total(Some(product), line.quantity);
                priced.total += total;
                priced.item_count += u64::from(line.quantity.value());
                priced.lines.push(PricedLine {
                    product_id: product.id, name: product.name.clone(), unit_price: product.price,
                    quantity: line.quantity.value(), total,
                });
            }
            None => priced.skipped.push(line.product_id),
        }
    }
    priced
}

/// Loads every product the cart references in one lookup, then prices it.
pub async fn resolve(products: &dyn ProductStore, cart: &Cart) -> crate::Result<PricedCart> {
    if cart.is_empty() { return Ok(PricedCart::default()); }
    let found = products.find_many(&cart.product_ids()).await?;
    let priced = price_cart(cart, &found);
    if !priced.skipped.is_empty() { debug!(skipped = ?priced.skipped, "cart references unavailable products"); }
    Ok(priced)
}

impl PricedCart {
    /// A cart can be ordered only if something in it has a price.
    pub fn is_payable(&self) -> bool { !self.lines.is_empty() && self.total > Decimal::ZERO }

    pub fn money(&self, currency: &str) -> Money { Money::new(self.total, currency) }

    pub fn snapshot(&self) -> Result<OrderSnapshot, serde_json::Error> {
        let lines: Vec<SnapshotLine> = self.lines.iter().map(|l| SnapshotLine {
            product_id: l.product_id, name: l.name.clone(), quantity: l.quantity, unit_price: l.unit_price, total: l.total,
        }).collect();
        Ok(OrderSnapshot { items: serde_json::to_string(&lines)?, total: self.total })
    }
}
