//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog identifier of a product.
pub type ProductId = i64;

/// Money value object
///
/// Amounts keep full precision; rounding to two places happens only when the
/// value is formatted for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn currency(&self) -> &str { &self.currency }
    /// Amount rounded half-away-from-zero to cents.
    pub fn rounded(&self) -> Decimal {
        self.amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2} {}", self.rounded(), self.currency) }
}

/// Quantity of a cart line. Never zero while stored in a cart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    /// `None` for zero: a line with nothing in it does not exist.
    pub fn new(value: u32) -> Option<Self> { (value > 0).then_some(Self(value)) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn increment(&self) -> Self { Self(self.0.saturating_add(1)) }
    pub fn decrement(&self) -> Option<Self> { Self::new(self.0 - 1) }
}

/// Customer contact, either an email address or a phone number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact(String);

impl Contact {
    /// Collapses whitespace. Input made only of phone characters (digits,
    /// `+`, spaces, brackets, `-` and `.`) is reduced to digits and `+`;
    /// anything else is left as typed.
    pub fn normalize(raw: &str) -> String {
        let collapsed = collapse_whitespace(raw);
        if !collapsed.contains('@') && collapsed.chars().all(is_phone_char) {
            collapsed.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect()
        } else {
            collapsed
        }
    }

    pub fn is_valid(normalized: &str) -> bool {
        if normalized.contains('@') {
            validator::validate_email(normalized)
        } else {
            is_phone(normalized)
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ContactError> {
        let normalized = Self::normalize(raw);
        if Self::is_valid(&normalized) { Ok(Self(normalized)) } else { Err(ContactError::Invalid) }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

fn is_phone_char(c: char) -> bool { c.is_ascii_digit() || matches!(c, '+' | ' ' | '(' | ')' | '-' | '.') }

/// `+` only in leading position, then 7 to 15 digits.
fn is_phone(value: &str) -> bool {
    let digits = value.strip_prefix('+').unwrap_or(value);
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ContactError {
    #[error("Enter a valid email or phone number")]
    Invalid,
}

/// Collapses runs of whitespace and trims the ends.
pub fn collapse_whitespace(raw: &str) -> String { raw.split_whitespace().collect::<Vec<_>>().join(" ") }
