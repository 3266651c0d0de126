//! HTTP surface: storefront and admin JSON routes.

mod admin;
mod storefront;

use axum::{http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;
use crate::checkout::Checkout;
use crate::notify::Notifier;
use crate::orders::OrderAdmin;
use crate::rate_limit::RateLimiter;
use crate::session::{SessionLocks, SessionStore, VisitorSession};
use crate::store::{OrderStore, ProductStore};
use crate::WallcraftError;

pub type ApiResult<T> = Result<T, (StatusCode, String)>;

#[derive(Clone)]
pub struct AppState {
    pub products: Arc<dyn ProductStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub locks: Arc<SessionLocks>,
    pub checkout: Arc<Checkout>,
    pub orders: Arc<OrderAdmin>,
    pub limiter: Arc<dyn RateLimiter>,
    pub currency: Arc<str>,
}

/// Collaborators the HTTP state is assembled from.
pub struct Services {
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn Notifier>,
    pub limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    pub fn new(services: Services, currency: &str, checkout_throttle: std::time::Duration) -> Self {
        let checkout = Checkout::new(services.products.clone(), services.orders.clone(), services.notifier.clone(), checkout_throttle);
        Self {
            products: services.products,
            sessions: services.sessions,
            locks: Arc::new(SessionLocks::new()),
            checkout: Arc::new(checkout),
            orders: Arc::new(OrderAdmin::new(services.orders, services.notifier)),
            limiter: services.limiter,
            currency: Arc::from(currency),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "wallcraft"})) }))
        .merge(storefront::routes())
        .merge(admin::routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Maps a failure to a status and a message fit to show the user. Faults
/// that are not the user's are logged and answered generically.
pub(crate) fn reject(e: WallcraftError) -> (StatusCode, String) {
    match e {
        WallcraftError::ProductNotFound | WallcraftError::OrderNotFound => (StatusCode::NOT_FOUND, e.to_string()),
        WallcraftError::Order(_) | WallcraftError::Product(_) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        WallcraftError::ConcurrentUpdate => (StatusCode::CONFLICT, e.to_string()),
        other => {
            error!(error = %other, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong, please try again later".to_string())
        }
    }
}

pub(crate) async fn load_session(s: &AppState, key: &str) -> ApiResult<VisitorSession> {
    s.sessions.load(key).await.map_err(reject)
}

/// Writes the session back if its cart changed.
pub(crate) async fn save_if_dirty(s: &AppState, key: &str, session: &mut VisitorSession) -> ApiResult<()> {
    if session.cart.is_dirty() {
        s.sessions.save(key, session).await.map_err(reject)?;
        session.cart.mark_clean();
    }
    Ok(())
}
