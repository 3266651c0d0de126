//! Wallcraft storefront - cart, checkout and order fulfilment service

use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallcraft::api::{router, AppState, Services};
use wallcraft::config::Config;
use wallcraft::notify::{FanOut, LogNotifier, NatsNotifier, Notifier, TelegramNotifier};
use wallcraft::rate_limit::SlidingWindowLimiter;
use wallcraft::session::MemorySessionStore;
use wallcraft::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let store = Arc::new(PgStore::connect(&config.database_url, config.max_connections).await?);
    let notifier = build_notifier(&config).await?;
    let state = AppState::new(Services {
        products: store.clone(),
        orders: store,
        sessions: Arc::new(MemorySessionStore::new(config.session_idle)),
        notifier,
        limiter: Arc::new(SlidingWindowLimiter::new(config.rate_limit_max, config.rate_limit_window)),
    }, &config.currency, config.checkout_throttle);

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Wallcraft listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// Order events always go to the log; Telegram and NATS join when configured.
async fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let mut sinks: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if let Some(tg) = &config.telegram {
        sinks.push(Arc::new(TelegramNotifier::new(&tg.bot_token, &tg.chat_id)?));
    }
    if let Some(url) = &config.nats_url {
        match NatsNotifier::connect(url).await {
            Ok(nats) => sinks.push(Arc::new(nats)),
            Err(e) => warn!(error = %e, "NATS unavailable, continuing without it"),
        }
    }
    Ok(Arc::new(FanOut(sinks)))
}
