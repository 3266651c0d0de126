//! Catalog, cart and checkout routes. The session key travels in the path.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::debug;
use uuid::Uuid;
use crate::api::{load_session, reject, save_if_dirty, ApiResult, AppState};
use crate::checkout::{CheckoutForm, CheckoutOutcome};
use crate::domain::aggregates::{ChangeOutcome, Direction, Product};
use crate::domain::value_objects::ProductId;
use crate::pricing::{self, PricedCart, PricedLine};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/cart/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/add", post(add_to_cart))
        .route("/api/v1/cart/:session/change", post(change_cart))
        .route("/api/v1/session/:session/logout", post(logout))
        .route("/api/v1/checkout/:session", get(checkout_page).post(submit_checkout))
}

#[derive(Debug, Serialize)]
struct CartView { lines: Vec<PricedLine>, unavailable: Vec<ProductId>, total: String, currency: String, cart_total_items: u64 }

impl CartView {
    fn new(priced: PricedCart, currency: &str, cart_total_items: u64) -> Self {
        let money = priced.money(currency);
        Self { total: format!("{:.2}", money.rounded()), currency: money.currency().to_string(), lines: priced.lines, unavailable: priced.skipped, cart_total_items }
    }
}

#[derive(Debug, Serialize)] struct CartBadge { product_id: ProductId, quantity: u32, cart_total_items: u64 }
#[derive(Debug, Deserialize)] struct CatalogQuery { category: Option<String> }
#[derive(Debug, Deserialize)] struct AddToCartRequest { product_id: ProductId }
#[derive(Debug, Deserialize)] struct ChangeRequest { product_id: ProductId, direction: Direction }

fn too_many() -> (StatusCode, String) { (StatusCode::TOO_MANY_REQUESTS, "Too many requests, slow down".to_string()) }

async fn list_products(State(s): State<AppState>, Query(q): Query<CatalogQuery>) -> ApiResult<Json<Vec<Product>>> {
    let category = q.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
    s.products.list_active(category).await.map(Json).map_err(reject)
}

async fn get_product(State(s): State<AppState>, Path(id): Path<ProductId>) -> ApiResult<Json<Product>> {
    s.products.get(id).await.map_err(reject)?
        .filter(Product::is_purchasable)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Product not found".to_string()))
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<CartView>> {
    let visitor = load_session(&s, &session).await?;
    let priced = pricing::resolve(s.products.as_ref(), &visitor.cart).await.map_err(reject)?;
    Ok(Json(CartView::new(priced, &s.currency, visitor.cart.total_item_count())))
}

async fn add_to_cart(State(s): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, Path(session): Path<String>, Json(r): Json<AddToCartRequest>) -> ApiResult<Json<CartBadge>> {
    if !s.limiter.allow("cart", &addr.ip().to_string()) { return Err(too_many()); }
    s.products.get(r.product_id).await.map_err(reject)?
        .filter(Product::is_purchasable)
        .ok_or((StatusCode::NOT_FOUND, "Product not found".to_string()))?;
    let _guard = s.locks.lock(&session).await;
    let mut visitor = load_session(&s, &session).await?;
    let quantity = visitor.cart.add(r.product_id);
    save_if_dirty(&s, &session, &mut visitor).await?;
    Ok(Json(CartBadge { product_id: r.product_id, quantity: quantity.value(), cart_total_items: visitor.cart.total_item_count() }))
}

async fn change_cart(State(s): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, Path(session): Path<String>, Json(r): Json<ChangeRequest>) -> ApiResult<Json<serde_json::Value>> {
    if !s.limiter.allow("cart", &addr.ip().to_string()) { return Err(too_many()); }
    let _guard = s.locks.lock(&session).await;
    let mut visitor = load_session(&s, &session).await?;
    let outcome = visitor.cart.change(r.product_id, r.direction);
    save_if_dirty(&s, &session, &mut visitor).await?;
    let (found, quantity) = match outcome {
        ChangeOutcome::Updated(q) => (true, q.value()),
        ChangeOutcome::Removed => (true, 0),
        ChangeOutcome::NotFound => (false, 0),
    };
    Ok(Json(serde_json::json!({
        "product_id": r.product_id, "found": found, "quantity": quantity,
        "cart_total_items": visitor.cart.total_item_count(),
    })))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<StatusCode> {
    let _guard = s.locks.lock(&session).await;
    let mut visitor = load_session(&s, &session).await?;
    visitor.cart.clear();
    save_if_dirty(&s, &session, &mut visitor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn logout(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<StatusCode> {
    let _guard = s.locks.lock(&session).await;
    let mut visitor = load_session(&s, &session).await?;
    visitor.logout();
    s.sessions.save(&session, &visitor).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn checkout_page(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Response> {
    let _guard = s.locks.lock(&session).await;
    let mut visitor = load_session(&s, &session).await?;
    let page = s.checkout.begin(&mut visitor.cart).await.map_err(reject)?;
    // nothing to pay for: the fresh token is dropped with the unsaved session
    if !page.cart.is_payable() {
        return Ok(Redirect::to(&format!("/api/v1/cart/{session}")).into_response());
    }
    save_if_dirty(&s, &session, &mut visitor).await?;
    let count = visitor.cart.total_item_count();
    Ok(Json(serde_json::json!({ "token": page.token, "cart": CartView::new(page.cart, &s.currency, count) })).into_response())
}

async fn submit_checkout(State(s): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, Path(session): Path<String>, headers: HeaderMap, Json(form): Json<CheckoutForm>) -> ApiResult<Response> {
    if !s.limiter.allow("checkout", &addr.ip().to_string()) { return Err(too_many()); }
    let user_id = headers.get("x-user-id").and_then(|v| v.to_str().ok()).map(str::to_string);
    let _guard = s.locks.lock(&session).await;
    let mut visitor = load_session(&s, &session).await?;
    let outcome = s.checkout.submit(&mut visitor, form, user_id, Utc::now()).await.map_err(reject)?;
    save_if_dirty(&s, &session, &mut visitor).await?;

    let response = match outcome {
        CheckoutOutcome::Placed(order) => {
            let body = PlacedView { order_id: order.id(), status: order.status().as_str(), total: format!("{:.2}", order.total().round_dp(2)) };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        CheckoutOutcome::Redirect(reason) => {
            debug!(?reason, "checkout redirected to cart");
            Redirect::to(&format!("/api/v1/cart/{session}")).into_response()
        }
        CheckoutOutcome::Invalid { errors, token, cart } => {
            let count = visitor.cart.total_item_count();
            let body = serde_json::json!({ "errors": errors, "token": token, "cart": CartView::new(cart, &s.currency, count) });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
        CheckoutOutcome::Throttled { retry_after } => {
            let secs = retry_after.as_secs().max(1);
            let body = serde_json::json!({ "message": format!("You have just placed an order. Please wait {secs} seconds and try again."), "retry_after": secs });
            (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, secs.to_string())], Json(body)).into_response()
        }
    };
    Ok(response)
}

#[derive(Debug, Serialize)] struct PlacedView { order_id: Uuid, status: &'static str, total: String }
