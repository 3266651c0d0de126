//! Back-office routes. The operator name comes from `x-admin-user` and every
//! mutation must echo the session's CSRF token in `x-csrf-token`.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use crate::api::{load_session, reject, ApiResult, AppState};
use crate::domain::aggregates::{Order, OrderComment, OrderStatus, OrderView, Product, ProductDraft};
use crate::domain::value_objects::ProductId;
use crate::orders::OrderDetails;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/:session/csrf", get(csrf_token))
        .route("/api/v1/admin/:session/orders", get(list_orders))
        .route("/api/v1/admin/:session/orders/:id", get(order_details).delete(purge_order))
        .route("/api/v1/admin/:session/orders/:id/status", post(change_status))
        .route("/api/v1/admin/:session/orders/:id/restore", post(restore_order))
        .route("/api/v1/admin/:session/orders/:id/archive", post(archive_order))
        .route("/api/v1/admin/:session/orders/:id/unarchive", post(unarchive_order))
        .route("/api/v1/admin/:session/orders/:id/delivery", post(set_delivery))
        .route("/api/v1/admin/:session/orders/:id/comments", post(add_comment))
        .route("/api/v1/admin/:session/products", post(create_product))
        .route("/api/v1/admin/:session/products/:id", put(update_product))
        .route("/api/v1/admin/:session/products/:id/active", post(set_product_active))
}

#[derive(Debug, Deserialize)]
struct ListQuery { #[serde(default)] view: OrderView }
#[derive(Debug, Deserialize)] struct StatusRequest { status: String }
#[derive(Debug, Deserialize)] struct DeliveryRequest { courier: Option<String>, tracking_code: Option<String> }
#[derive(Debug, Deserialize)] struct CommentRequest { body: String }
#[derive(Debug, Deserialize)] struct ActiveRequest { is_active: bool }

fn operator(headers: &HeaderMap) -> ApiResult<String> {
    headers.get("x-admin-user")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or((StatusCode::UNAUTHORIZED, "Admin sign-in required".to_string()))
}

/// Operator name for a mutating request, after the CSRF check.
async fn authorize(s: &AppState, session: &str, headers: &HeaderMap) -> ApiResult<String> {
    let actor = operator(headers)?;
    let presented = headers.get("x-csrf-token").and_then(|v| v.to_str().ok()).unwrap_or_default();
    if !load_session(s, session).await?.csrf_matches(presented) {
        return Err((StatusCode::FORBIDDEN, "Invalid CSRF token".to_string()));
    }
    Ok(actor)
}

async fn csrf_token(State(s): State<AppState>, Path(session): Path<String>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    operator(&headers)?;
    let _guard = s.locks.lock(&session).await;
    let mut visitor = load_session(&s, &session).await?;
    let token = visitor.csrf_token();
    s.sessions.save(&session, &visitor).await.map_err(reject)?;
    Ok(Json(serde_json::json!({ "csrf_token": token })))
}

async fn list_orders(State(s): State<AppState>, headers: HeaderMap, Query(q): Query<ListQuery>) -> ApiResult<Json<Vec<Order>>> {
    operator(&headers)?;
    s.orders.list(q.view).await.map(Json).map_err(reject)
}

async fn order_details(State(s): State<AppState>, Path((_, id)): Path<(String, Uuid)>, headers: HeaderMap) -> ApiResult<Json<OrderDetails>> {
    operator(&headers)?;
    s.orders.details(id).await.map(Json).map_err(reject)
}

async fn change_status(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, headers: HeaderMap, Json(r): Json<StatusRequest>) -> ApiResult<Json<Order>> {
    let actor = authorize(&s, &session, &headers).await?;
    let to = OrderStatus::normalize(&r.status)
        .ok_or((StatusCode::UNPROCESSABLE_ENTITY, format!("Unknown status: {}", r.status)))?;
    s.orders.transition(id, to, &actor).await.map(Json).map_err(reject)
}

async fn restore_order(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, headers: HeaderMap) -> ApiResult<Json<Order>> {
    let actor = authorize(&s, &session, &headers).await?;
    s.orders.restore(id, &actor).await.map(Json).map_err(reject)
}

async fn archive_order(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, headers: HeaderMap) -> ApiResult<Json<Order>> {
    authorize(&s, &session, &headers).await?;
    s.orders.archive(id).await.map(Json).map_err(reject)
}

async fn unarchive_order(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, headers: HeaderMap) -> ApiResult<Json<Order>> {
    authorize(&s, &session, &headers).await?;
    s.orders.unarchive(id).await.map(Json).map_err(reject)
}

async fn set_delivery(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, headers: HeaderMap, Json(r): Json<DeliveryRequest>) -> ApiResult<Json<Order>> {
    authorize(&s, &session, &headers).await?;
    let clean = |v: Option<String>| v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    s.orders.set_delivery(id, clean(r.courier), clean(r.tracking_code)).await.map(Json).map_err(reject)
}

async fn add_comment(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, headers: HeaderMap, Json(r): Json<CommentRequest>) -> ApiResult<(StatusCode, Json<OrderComment>)> {
    let actor = authorize(&s, &session, &headers).await?;
    let comment = s.orders.add_comment(id, &actor, &r.body).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn purge_order(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, headers: HeaderMap) -> ApiResult<StatusCode> {
    authorize(&s, &session, &headers).await?;
    s.orders.purge(id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_product(State(s): State<AppState>, Path(session): Path<String>, headers: HeaderMap, Json(draft): Json<ProductDraft>) -> ApiResult<(StatusCode, Json<Product>)> {
    authorize(&s, &session, &headers).await?;
    let product = s.products.create(draft).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(State(s): State<AppState>, Path((session, id)): Path<(String, ProductId)>, headers: HeaderMap, Json(draft): Json<ProductDraft>) -> ApiResult<Json<Product>> {
    authorize(&s, &session, &headers).await?;
    s.products.update(id, draft).await.map_err(reject)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Product not found".to_string()))
}

async fn set_product_active(State(s): State<AppState>, Path((session, id)): Path<(String, ProductId)>, headers: HeaderMap, Json(r): Json<ActiveRequest>) -> ApiResult<Json<Product>> {
    authorize(&s, &session, &headers).await?;
    s.products.set_active(id, r.is_active).await.map_err(reject)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Product not found".to_string()))
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, Router};
    use serde_json::{json, Value};
    use crate::api::tests::{app, json, send};

    /// Places an order through the storefront and returns its id.
    async fn place_order(app: &Router) -> String {
        send(app, "POST", "/api/v1/cart/buyer/add", Some(json!({ "product_id": 1 })), &[]).await;
        let page = json(send(app, "GET", "/api/v1/checkout/buyer", None, &[]).await).await;
        let form = json!({ "token": page["token"], "name": "Anna", "contact": "+371 2000 0000", "address": "Riga, Brivibas 1" });
        let placed = json(send(app, "POST", "/api/v1/checkout/buyer", Some(form), &[]).await).await;
        placed["order_id"].as_str().unwrap().to_string()
    }

    async fn csrf(app: &Router) -> String {
        let body = json(send(app, "GET", "/api/v1/admin/ops/csrf", None, &[("x-admin-user", "ilze")]).await).await;
        body["csrf_token"].as_str().unwrap().to_string()
    }

    async fn post_as_admin(app: &Router, token: &str, uri: &str, body: Value) -> axum::response::Response {
        send(app, "POST", uri, Some(body), &[("x-admin-user", "ilze"), ("x-csrf-token", token)]).await
    }

    #[tokio::test]
    async fn test_requires_operator_and_csrf() {
        let app = app().await;
        let id = place_order(&app).await;
        assert_eq!(send(&app, "GET", "/api/v1/admin/ops/orders", None, &[]).await.status(), StatusCode::UNAUTHORIZED);

        let uri = format!("/api/v1/admin/ops/orders/{id}/status");
        let resp = send(&app, "POST", &uri, Some(json!({ "status": "confirmed" })), &[("x-admin-user", "ilze")]).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let resp = post_as_admin(&app, "wrong", &uri, json!({ "status": "confirmed" })).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_status_workflow() {
        let app = app().await;
        let id = place_order(&app).await;
        let token = csrf(&app).await;
        let status_uri = format!("/api/v1/admin/ops/orders/{id}/status");

        let resp = post_as_admin(&app, &token, &status_uri, json!({ "status": "courier_arrived" })).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let resp = post_as_admin(&app, &token, &status_uri, json!({ "status": "teleported" })).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        for status in ["confirmed", "courier_picked", "courier_on_way", "courier_arrived", "completed"] {
            let resp = post_as_admin(&app, &token, &status_uri, json!({ "status": status })).await;
            assert_eq!(resp.status(), StatusCode::OK, "{status}");
        }

        let active = json(send(&app, "GET", "/api/v1/admin/ops/orders", None, &[("x-admin-user", "ilze")]).await).await;
        assert!(active.as_array().unwrap().is_empty());
        let archive = json(send(&app, "GET", "/api/v1/admin/ops/orders?view=archive", None, &[("x-admin-user", "ilze")]).await).await;
        assert_eq!(archive.as_array().unwrap().len(), 1);

        let restored = json(post_as_admin(&app, &token, &format!("/api/v1/admin/ops/orders/{id}/restore"), json!({})).await).await;
        assert_eq!(restored["status"], "confirmed");

        let details = json(send(&app, "GET", &format!("/api/v1/admin/ops/orders/{id}"), None, &[("x-admin-user", "ilze")]).await).await;
        assert_eq!(details["history"].as_array().unwrap().len(), 6);
        assert_eq!(details["history"][0]["changed_by"], "ilze");
        assert_eq!(details["allowed_next"], json!(["courier_picked", "canceled"]));
    }

    #[tokio::test]
    async fn test_comments_delivery_and_purge() {
        let app = app().await;
        let id = place_order(&app).await;
        let token = csrf(&app).await;

        let resp = post_as_admin(&app, &token, &format!("/api/v1/admin/ops/orders/{id}/comments"), json!({ "body": "  call first  " })).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json(resp).await["body"], "call first");
        let resp = post_as_admin(&app, &token, &format!("/api/v1/admin/ops/orders/{id}/comments"), json!({ "body": "   " })).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let order = json(post_as_admin(&app, &token, &format!("/api/v1/admin/ops/orders/{id}/delivery"), json!({ "courier": "DPD", "tracking_code": " " })).await).await;
        assert_eq!(order["courier"], "DPD");
        assert!(order["tracking_code"].is_null());

        let headers = [("x-admin-user", "ilze"), ("x-csrf-token", token.as_str())];
        assert_eq!(send(&app, "DELETE", &format!("/api/v1/admin/ops/orders/{id}"), None, &headers).await.status(), StatusCode::NO_CONTENT);
        assert_eq!(send(&app, "GET", &format!("/api/v1/admin/ops/orders/{id}"), None, &headers).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_product_admin() {
        let app = app().await;
        let token = csrf(&app).await;

        let resp = post_as_admin(&app, &token, "/api/v1/admin/ops/products", json!({ "name": "Sand", "price": "7.50" })).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let id = json(resp).await["id"].as_i64().unwrap();

        let resp = post_as_admin(&app, &token, "/api/v1/admin/ops/products", json!({ "name": "Bad", "price": "-1" })).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let headers = [("x-admin-user", "ilze"), ("x-csrf-token", token.as_str())];
        let body = json!({ "name": "Sand Deluxe", "price": "9.00" });
        let resp = send(&app, "PUT", &format!("/api/v1/admin/ops/products/{id}"), Some(body), &headers).await;
        assert_eq!(json(resp).await["name"], "Sand Deluxe");

        let resp = post_as_admin(&app, &token, &format!("/api/v1/admin/ops/products/{id}/active"), json!({ "is_active": false })).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(send(&app, "GET", &format!("/api/v1/products/{id}"), None, &[]).await.status(), StatusCode::NOT_FOUND);
        let resp = post_as_admin(&app, &token, "/api/v1/admin/ops/products/999/active", json!({ "is_active": true })).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
