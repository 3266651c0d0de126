//! Wallcraft storefront
//!
//! Cart, checkout and order fulfilment for the Wallcraft wall-coating shop.
//!
//! ## Features
//! - Session cart with add / increase / decrease / clear
//! - Pricing against the live catalog, tolerant of retired products
//! - One-shot checkout tokens, contact validation and a per-session cool-down
//! - Order fulfilment workflow with status history and archiving
//! - Operator notifications (Telegram, NATS)

pub mod api;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod notify;
pub mod orders;
pub mod pricing;
pub mod rate_limit;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

use thiserror::Error;
use domain::aggregates::{OrderError, ProductError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum WallcraftError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error("Order was changed by someone else, reload and try again")]
    ConcurrentUpdate,

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WallcraftError>;
