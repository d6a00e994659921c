use anyhow::Context;

use crate::auth::{
    cookie::{self, SameSite},
    handlers::{LOGOUT_ROUTE, REFRESH_ROUTE},
};

/// Upper bound for either token lifetime.
const MAX_TTL_MINUTES: u64 = 60 * 24 * 366 * 10;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: u64,
    pub refresh_ttl_minutes: u64,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStoreKind {
    None,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub user_store: UserStoreKind,
    /// Required for the postgres user store.
    pub database_url: Option<String>,
    /// `name:password` pairs loaded into the memory user store at startup.
    pub seed_users: Vec<(String, String)>,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    /// Answer a cookie-less refresh with 204 instead of 401.
    pub refresh_silent_when_missing: bool,
    pub token_store: TokenStoreKind,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{name}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_seed_users(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, password) = entry
                .split_once(':')
                .with_context(|| format!("SEED_USERS: expected name:password, got {entry:?}"))?;
            Ok((name.trim().to_string(), password.to_string()))
        })
        .collect()
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let user_store = match var_or("USER_STORE", "postgres").to_ascii_lowercase().as_str() {
            "postgres" => UserStoreKind::Postgres,
            "memory" => UserStoreKind::Memory,
            other => anyhow::bail!("USER_STORE: unknown store {other:?}"),
        };
        let database_url = match user_store {
            UserStoreKind::Postgres => {
                Some(std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?)
            }
            UserStoreKind::Memory => std::env::var("DATABASE_URL").ok(),
        };
        let seed_users = parse_seed_users(&var_or("SEED_USERS", ""))?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: var_or("JWT_ISSUER", "forum-auth"),
            audience: var_or("JWT_AUDIENCE", "forum-users"),
            ttl_minutes: parse_var("JWT_TTL_MINUTES", 15)?,
            refresh_ttl_minutes: parse_var("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };
        let cookie = CookieConfig {
            path: var_or("COOKIE_PATH", "/auth"),
            domain: std::env::var("COOKIE_DOMAIN").ok().filter(|d| !d.is_empty()),
            secure: parse_var("COOKIE_SECURE", true)?,
            same_site: parse_var("COOKIE_SAME_SITE", SameSite::Strict)?,
        };
        let token_store = match var_or("TOKEN_STORE", "none").to_ascii_lowercase().as_str() {
            "none" => TokenStoreKind::None,
            "memory" => TokenStoreKind::Memory,
            other => anyhow::bail!("TOKEN_STORE: unknown store {other:?}"),
        };

        let config = Self {
            user_store,
            database_url,
            seed_users,
            jwt,
            cookie,
            refresh_silent_when_missing: parse_var("REFRESH_SILENT_WHEN_MISSING", false)?,
            token_store,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.jwt.secret.is_empty(), "JWT_SECRET must not be empty");
        anyhow::ensure!(self.jwt.ttl_minutes > 0, "JWT_TTL_MINUTES must be positive");
        anyhow::ensure!(
            self.jwt.refresh_ttl_minutes > 0,
            "JWT_REFRESH_TTL_MINUTES must be positive"
        );
        // keep token and cookie expiry arithmetic well inside OffsetDateTime's range
        anyhow::ensure!(
            self.jwt.ttl_minutes <= MAX_TTL_MINUTES,
            "JWT_TTL_MINUTES must not exceed ten years"
        );
        anyhow::ensure!(
            self.jwt.refresh_ttl_minutes <= MAX_TTL_MINUTES,
            "JWT_REFRESH_TTL_MINUTES must not exceed ten years"
        );
        anyhow::ensure!(
            self.jwt.ttl_minutes < self.jwt.refresh_ttl_minutes,
            "JWT_TTL_MINUTES must be shorter than JWT_REFRESH_TTL_MINUTES"
        );
        anyhow::ensure!(
            self.cookie.path.starts_with('/'),
            "COOKIE_PATH must start with '/'"
        );
        for route in [REFRESH_ROUTE, LOGOUT_ROUTE] {
            anyhow::ensure!(
                cookie::path_matches(&self.cookie.path, route),
                "COOKIE_PATH {:?} does not cover {route}",
                self.cookie.path
            );
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> AppConfig {
        AppConfig {
            user_store: UserStoreKind::Memory,
            database_url: None,
            seed_users: vec![("alice".into(), "secret".into())],
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            cookie: CookieConfig {
                path: "/auth".into(),
                domain: None,
                secure: true,
                same_site: SameSite::Strict,
            },
            refresh_silent_when_missing: false,
            token_store: TokenStoreKind::None,
        }
    }

    #[test]
    fn test_config_is_valid() {
        test_config().validate().unwrap();
    }

    #[test]
    fn rejects_empty_secret_and_zero_ttl() {
        let mut cfg = test_config();
        cfg.jwt.secret.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.jwt.ttl_minutes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn seed_users_parse() {
        let users = parse_seed_users(" alice:secret , bob:pa:ss,").unwrap();
        assert_eq!(
            users,
            vec![
                ("alice".to_string(), "secret".to_string()),
                ("bob".to_string(), "pa:ss".to_string()),
            ]
        );
        assert!(parse_seed_users("").unwrap().is_empty());
        assert!(parse_seed_users("nopassword").is_err());
    }

    #[test]
    fn rejects_relative_cookie_path() {
        let mut cfg = test_config();
        cfg.cookie.path = "refresh".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cookie_path_must_reach_refresh_and_logout() {
        let mut cfg = test_config();
        cfg.cookie.path = "/auth/refresh".into();
        assert!(cfg.validate().is_err());

        cfg.cookie.path = "/".into();
        cfg.validate().unwrap();
    }

    #[test]
    fn ttl_bounds() {
        let mut cfg = test_config();
        cfg.jwt.ttl_minutes = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.jwt.ttl_minutes = cfg.jwt.refresh_ttl_minutes;
        assert!(cfg.validate().is_err());
    }
}
