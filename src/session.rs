//! Visitor session state and its store.
//!
//! The session is a typed structure serialized to JSON, not an open map. The
//! transport that carries the session key (cookie, path segment) is the
//! caller's business.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;
use crate::domain::aggregates::Cart;
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitorSession {
    #[serde(default)]
    pub cart: Cart,
    #[serde(default)]
    csrf_token: Option<String>,
}

impl VisitorSession {
    /// Drops everything tied to the signed-in visitor except the checkout cool-down.
    pub fn logout(&mut self) {
        self.cart.clear();
        self.csrf_token = None;
    }

    /// Returns the admin CSRF token, creating it on first use.
    pub fn csrf_token(&mut self) -> String {
        self.csrf_token.get_or_insert_with(|| Uuid::new_v4().simple().to_string()).clone()
    }

    pub fn csrf_matches(&self, presented: &str) -> bool {
        self.csrf_token.as_deref().is_some_and(|expected| tokens_match(expected, presented))
    }
}

/// Constant-time comparison of two tokens.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    let (a, b) = (expected.as_bytes(), presented.as_bytes());
    if a.len() != b.len() { return false; }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// A missing session loads as a fresh one.
    async fn load(&self, key: &str) -> Result<VisitorSession>;
    async fn save(&self, key: &str, session: &VisitorSession) -> Result<()>;
}

/// Upper bound on sessions held at once; the least recently used go first.
const MAX_SESSIONS: u64 = 100_000;

/// Keeps serialized sessions in memory. A session nobody touched for the
/// idle timeout is dropped and loads as a fresh one afterwards.
pub struct MemorySessionStore { sessions: Cache<String, String> }

impl MemorySessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { sessions: Cache::builder().max_capacity(MAX_SESSIONS).time_to_idle(idle_timeout).build() }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<VisitorSession> {
        let Some(raw) = self.sessions.get(key).await else { return Ok(VisitorSession::default()) };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!(error = %e, "discarding unreadable session");
                Ok(VisitorSession::default())
            }
        }
    }

    async fn save(&self, key: &str, session: &VisitorSession) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        self.sessions.insert(key.to_string(), raw).await;
        Ok(())
    }
}

/// Serializes requests that mutate the same session, so a double-clicked
/// checkout cannot read the same token twice.
#[derive(Default)]
pub struct SessionLocks { locks: Mutex<HashMap<String, Arc<Mutex<()>>>> }

impl SessionLocks {
    pub fn new() -> Self { Self::default() }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
