//! Product Aggregate
//!
//! Products are owned by the catalog admin. The cart and pricing code only
//! read them, and treat inactive products as if they did not exist.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::domain::value_objects::ProductId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub image: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Inactive products are invisible to the cart and to pricing.
    pub fn is_purchasable(&self) -> bool { self.is_active }
}

/// Admin input for creating or replacing a product.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ProductDraft {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    pub image: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

fn validate_price(price: &Decimal) -> Result<(), validator::ValidationError> {
    if price.is_sign_negative() {
        let mut err = validator::ValidationError::new("price");
        err.message = Some("Price cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProductError {
    #[error("Invalid product: {0}")]
    Invalid(String),
}

impl ProductDraft {
    pub fn checked(mut self) -> Result<Self, ProductError> {
        self.name = self.name.trim().to_string();
        self.category = self.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        self.validate().map_err(|e| ProductError::Invalid(e.to_string()))?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, price: Decimal) -> ProductDraft {
        ProductDraft { name: name.into(), description: String::new(), category: Some(" walls ".into()), price, image: None, is_active: true }
    }

    #[test]
    fn test_draft_normalizes() {
        let d = draft("  Ocean ", Decimal::new(2500, 2)).checked().unwrap();
        assert_eq!(d.name, "Ocean");
        assert_eq!(d.category.as_deref(), Some("walls"));
    }

    #[test]
    fn test_draft_rejects_negative_price_and_blank_name() {
        assert!(draft("Ocean", Decimal::new(-1, 0)).checked().is_err());
        assert!(draft("   ", Decimal::ONE).checked().is_err());
    }
}
