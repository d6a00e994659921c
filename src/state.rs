use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{
    cookie::CookieManager,
    jwt::JwtKeys,
    password,
    repo::{MemoryUserStore, PgUserStore, UserStore},
    store::{MemoryTokenStore, TokenStore},
};
use crate::config::{AppConfig, TokenStoreKind, UserStoreKind};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub cookies: CookieManager,
    pub users: Arc<dyn UserStore>,
    pub tokens: Option<Arc<dyn TokenStore>>,
}

impl AppState {
    /// Builds the configured user store. For postgres this connects and runs
    /// pending migrations.
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let users: Arc<dyn UserStore> = match config.user_store {
            UserStoreKind::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is not set")?;
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgUserStore::new(db))
            }
            UserStoreKind::Memory => Arc::new(seeded_memory_store(&config.seed_users).await?),
        };

        let ready = tokio::task::spawn_blocking(password::prepare_dummy_hash)
            .await
            .context("prepare dummy password hash")?;
        if !ready {
            tracing::warn!("dummy password hash unavailable; unknown-user logins skip verification");
        }

        Ok(Self::from_parts(config, users))
    }

    pub fn from_parts(config: AppConfig, users: Arc<dyn UserStore>) -> Self {
        let keys = JwtKeys::from(&config.jwt);
        let cookies = CookieManager::new(&config.cookie, keys.refresh_ttl);
        let tokens = match config.token_store {
            TokenStoreKind::None => None,
            TokenStoreKind::Memory => {
                Some(Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>)
            }
        };
        Self {
            config: Arc::new(config),
            keys,
            cookies,
            users,
            tokens,
        }
    }
}

async fn seeded_memory_store(seed: &[(String, String)]) -> anyhow::Result<MemoryUserStore> {
    let store = MemoryUserStore::new();
    for (name, password) in seed {
        store.insert(name, password).await?;
    }
    tracing::info!(users = seed.len(), "memory user store seeded");
    Ok(store)
}

#[cfg(test)]
impl AppState {
    /// State over an in-memory user store seeded from the config
    /// (`alice` / `secret` for the test config).
    pub async fn fake() -> (Self, Arc<MemoryUserStore>) {
        Self::fake_with(crate::config::tests::test_config()).await
    }

    pub async fn fake_with(config: AppConfig) -> (Self, Arc<MemoryUserStore>) {
        let users = Arc::new(
            seeded_memory_store(&config.seed_users)
                .await
                .expect("seed users"),
        );
        let state = Self::from_parts(config, users.clone());
        (state, users)
    }
}
