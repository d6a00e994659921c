//! Optional tracking of issued refresh tokens.
//!
//! Without a store the refresh flow is stateless: a refresh token stays valid
//! until it expires. With one, every recorded `jti` can be consumed exactly once,
//! so a rotated-out token cannot be replayed.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn record(&self, jti: &str, user_id: i64, expires_at: i64) -> anyhow::Result<()>;
    /// Removes `jti` and reports whether it was recorded and unexpired at `now`.
    /// Of two concurrent calls for the same `jti`, at most one sees `true`.
    async fn consume(&self, jti: &str, now: i64) -> anyhow::Result<bool>;
}

/// Process-local store; expired entries are purged on every write.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    /// jti -> expiry (unix seconds)
    active: RwLock<HashMap<String, i64>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn record(&self, jti: &str, user_id: i64, expires_at: i64) -> anyhow::Result<()> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let mut active = self.active.write().await;
        active.retain(|_, exp| *exp > now);
        active.insert(jti.to_string(), expires_at);
        debug!(user_id, jti, "refresh token recorded");
        Ok(())
    }

    async fn consume(&self, jti: &str, now: i64) -> anyhow::Result<bool> {
        let mut active = self.active.write().await;
        Ok(matches!(active.remove(jti), Some(exp) if exp > now))
    }
}
