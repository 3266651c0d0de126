//! Checkout: the single step that turns a session cart into a stored order.
//!
//! Showing the form issues a one-shot token. A submission is checked in a
//! fixed order (cart, token, fields, cool-down) and only a fully valid one
//! creates an order. Only success consumes the token, so a form that failed
//! validation can be corrected and sent again, while a second send of an
//! accepted form finds no token and is turned away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use validator::{Validate, ValidationError, ValidationErrors};
use crate::domain::aggregates::{Cart, NewOrder, Order};
use crate::domain::value_objects::{collapse_whitespace, Contact};
use crate::notify::{dispatch, Notifier};
use crate::pricing::{self, PricedCart};
use crate::session::{tokens_match, VisitorSession};
use crate::store::{OrderStore, ProductStore};
use crate::Result;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CheckoutForm {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    #[validate(length(min = 2, message = "Please enter your name"))]
    pub name: String,
    #[serde(default)]
    #[validate(custom = "validate_contact")]
    pub contact: String,
    #[serde(default)]
    #[validate(length(min = 3, message = "Please enter a delivery address"))]
    pub address: String,
    #[serde(default)]
    pub delivery_time: Option<String>,
}

fn validate_contact(contact: &str) -> std::result::Result<(), ValidationError> {
    if Contact::is_valid(contact) { return Ok(()); }
    let mut err = ValidationError::new("contact");
    err.message = Some("Enter a valid email or phone number".into());
    Err(err)
}

impl CheckoutForm {
    /// Whitespace collapsed everywhere, contact reduced to its canonical form.
    pub fn normalized(self) -> Self {
        Self {
            token: self.token.trim().to_string(),
            name: collapse_whitespace(&self.name),
            contact: Contact::normalize(&self.contact),
            address: collapse_whitespace(&self.address),
            delivery_time: self.delivery_time.map(|t| collapse_whitespace(&t)).filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors.field_errors().into_iter().flat_map(|(field, errs)| {
        errs.iter().map(move |e| FieldError {
            field: field.to_string(),
            message: e.message.as_ref().map_or_else(|| format!("{field} is invalid"), |m| m.to_string()),
        })
    }).collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    /// Nothing with a price in the cart.
    EmptyCart,
    /// Token missing, already used, or from another form rendering.
    StaleToken,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    Placed(Order),
    Redirect(RedirectReason),
    /// The form is shown again with the same items and token.
    Invalid { errors: Vec<FieldError>, token: Option<String>, cart: PricedCart },
    Throttled { retry_after: Duration },
}

/// What the checkout page shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutPage {
    pub token: String,
    pub cart: PricedCart,
}

pub struct Checkout {
    products: Arc<dyn ProductStore>,
    orders: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    throttle: Duration,
}

impl Checkout {
    pub fn new(products: Arc<dyn ProductStore>, orders: Arc<dyn OrderStore>, notifier: Arc<dyn Notifier>, throttle: Duration) -> Self {
        Self { products, orders, notifier, throttle }
    }

    /// Renders the form: prices the cart and issues a fresh token.
    pub async fn begin(&self, cart: &mut Cart) -> Result<CheckoutPage> {
        let priced = pricing::resolve(self.products.as_ref(), cart).await?;
        Ok(CheckoutPage { token: cart.issue_checkout_token(), cart: priced })
    }

    #[instrument(skip_all)]
    pub async fn submit(&self, session: &mut VisitorSession, form: CheckoutForm, user_id: Option<String>, now: DateTime<Utc>) -> Result<CheckoutOutcome> {
        let cart = &mut session.cart;
        let priced = pricing::resolve(self.products.as_ref(), cart).await?;
        if !priced.is_payable() {
            return Ok(CheckoutOutcome::Redirect(RedirectReason::EmptyCart));
        }

        let form = form.normalized();
        if !cart.checkout_token().is_some_and(|t| tokens_match(t, &form.token)) {
            info!("checkout with stale token rejected");
            return Ok(CheckoutOutcome::Redirect(RedirectReason::StaleToken));
        }

        if let Err(errors) = form.validate() {
            return Ok(CheckoutOutcome::Invalid { errors: field_errors(&errors), token: cart.checkout_token().map(str::to_string), cart: priced });
        }
        let contact = match Contact::parse(&form.contact) {
            Ok(contact) => contact,
            Err(e) => {
                let errors = vec![FieldError { field: "contact".into(), message: e.to_string() }];
                return Ok(CheckoutOutcome::Invalid { errors, token: cart.checkout_token().map(str::to_string), cart: priced });
            }
        };

        if let Some(retry_after) = self.cooldown_left(cart, now) {
            info!(retry_after_secs = retry_after.as_secs(), "checkout throttled");
            return Ok(CheckoutOutcome::Throttled { retry_after });
        }

        let snapshot = priced.snapshot()?;
        let mut order = Order::place(NewOrder {
            user_id, name: form.name, contact, address: form.address, delivery_time: form.delivery_time,
            items: snapshot.items, total: snapshot.total,
        }, now);
        self.orders.insert(&order).await?;

        cart.consume_checkout_token();
        cart.record_order(now);
        cart.clear();
        info!(order_id = %order.id(), total = %order.total().round_dp(2), "order placed");

        for event in order.take_events() {
            dispatch(self.notifier.clone(), event);
        }
        Ok(CheckoutOutcome::Placed(order))
    }

    fn cooldown_left(&self, cart: &Cart, now: DateTime<Utc>) -> Option<Duration> {
        let last = cart.last_order_at()?;
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        self.throttle.checked_sub(elapsed).filter(|left| !left.is_zero())
    }
}
