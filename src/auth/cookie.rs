//! Refresh-token cookie: building `Set-Cookie` values and reading request cookies.

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use axum::http::{header, header::InvalidHeaderValue, HeaderMap, HeaderValue};
use time::{macros::format_description, Duration as TimeDuration, OffsetDateTime, UtcOffset};

use crate::config::CookieConfig;

/// Name shared by the issue and expire paths.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => anyhow::bail!("unknown SameSite policy {other:?}"),
        }
    }
}

/// A cookie the server sends back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    /// Seconds; anything `<= 0` tells the client to drop the cookie.
    pub max_age: i64,
    pub expires: OffsetDateTime,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SessionCookie {
    pub fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expires = self
            .expires
            .to_offset(UtcOffset::UTC)
            .format(format_description!(
                "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
            ))
            .map_err(|_| fmt::Error)?;

        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        write!(f, "; Max-Age={}; Expires={}", self.max_age.max(0), expires)?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        write!(f, "; SameSite={}", self.same_site.as_str())
    }
}

/// Cookie path matching from RFC 6265 section 5.1.4: would a cookie scoped to
/// `cookie_path` be sent with a request for `request_path`?
pub fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => rest.is_empty() || cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Builds the refresh cookie. Holds no state beyond configuration.
#[derive(Debug, Clone)]
pub struct CookieManager {
    path: String,
    domain: Option<String>,
    secure: bool,
    same_site: SameSite,
    lifetime: Duration,
}

impl CookieManager {
    /// `lifetime` should be the refresh token's validity window.
    pub fn new(cfg: &CookieConfig, lifetime: Duration) -> Self {
        Self {
            path: cfg.path.clone(),
            domain: cfg.domain.clone(),
            secure: cfg.secure,
            same_site: cfg.same_site,
            lifetime,
        }
    }

    fn base(&self, value: String, max_age: i64, expires: OffsetDateTime) -> SessionCookie {
        SessionCookie {
            name: REFRESH_COOKIE_NAME,
            value,
            path: self.path.clone(),
            domain: self.domain.clone(),
            max_age,
            expires,
            http_only: true,
            secure: self.secure,
            same_site: self.same_site,
        }
    }

    pub fn issue_at(&self, refresh_token: &str, now: OffsetDateTime) -> SessionCookie {
        let max_age = self.lifetime.as_secs() as i64;
        self.base(
            refresh_token.to_string(),
            max_age,
            now + TimeDuration::seconds(max_age),
        )
    }

    pub fn issue(&self, refresh_token: &str) -> SessionCookie {
        self.issue_at(refresh_token, OffsetDateTime::now_utc())
    }

    /// Expiry is a full validity window in the past so clock skew cannot keep it alive.
    pub fn expire_at(&self, now: OffsetDateTime) -> SessionCookie {
        let window = self.lifetime.as_secs() as i64;
        self.base(String::new(), -1, now - TimeDuration::seconds(window))
    }

    pub fn expire(&self) -> SessionCookie {
        self.expire_at(OffsetDateTime::now_utc())
    }
}

/// Request cookies by name. When a name repeats, the first occurrence wins.
#[derive(Debug, Default)]
pub struct RequestCookies(HashMap<String, String>);

impl RequestCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = HashMap::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for part in value.split(';') {
                if let Some((name, value)) = part.trim().split_once('=') {
                    cookies
                        .entry(name.trim().to_string())
                        .or_insert_with(|| value.trim().to_string());
                }
            }
        }
        Self(cookies)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.get(REFRESH_COOKIE_NAME).filter(|v| !v.is_empty())
    }
}
