use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::{Claims, Identity, TokenKind},
        error::TokenError,
        tokens::{self, ClaimsEncoder, TokenPair, VerifiedToken},
    },
    config::JwtConfig,
    error::AuthError,
    state::AppState,
};

/// Signing and verification keys plus the claim values this service issues.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs(cfg.ttl_minutes.saturating_mul(60)),
            refresh_ttl: Duration::from_secs(cfg.refresh_ttl_minutes.saturating_mul(60)),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    /// Signs a claims set for `identity` valid from `now` for `ttl`.
    pub fn sign_at(
        &self,
        identity: &Identity,
        kind: TokenKind,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        if ttl.is_zero() {
            return Err(TokenError::Signing("token lifetime must be positive".into()));
        }
        let ttl = TimeDuration::try_from(ttl).map_err(|e| TokenError::Signing(e.to_string()))?;
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| TokenError::Signing("token expiry out of range".into()))?;
        let claims = Claims {
            sub: identity.id.to_string(),
            name: identity.username.clone(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            kind,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id = identity.id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    /// Checks signature, then expiry against `now`, then issuer and audience.
    pub fn decode_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // signature only; exp, iss and aud are checked below in that order
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;

        if claims.exp <= now.unix_timestamp() {
            return Err(TokenError::Expired);
        }
        if claims.iss != self.issuer || claims.aud != self.audience {
            return Err(TokenError::InvalidClaims);
        }
        debug!(sub = %claims.sub, kind = ?claims.kind, "jwt verified");
        Ok(claims)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_at(token, OffsetDateTime::now_utc())
    }

    /// Mints a fresh access/refresh pair at the current instant.
    pub fn generate(&self, identity: &Identity) -> Result<TokenPair, TokenError> {
        tokens::generate_pair(
            self,
            identity,
            self.access_ttl,
            self.refresh_ttl,
            OffsetDateTime::now_utc(),
        )
    }

    pub fn verify_access(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        tokens::verify(self, token, TokenKind::Access, OffsetDateTime::now_utc())
    }

    pub fn verify_refresh(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        tokens::verify(self, token, TokenKind::Refresh, OffsetDateTime::now_utc())
    }
}

impl ClaimsEncoder for JwtKeys {
    fn encode_at(
        &self,
        identity: &Identity,
        kind: TokenKind,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        self.sign_at(identity, kind, ttl, now)
    }
}

/// Extracts and validates a bearer access token, returning the user ID.
pub struct AuthUser(pub i64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or(AuthError::Unauthorized)?;

        match keys.verify_access(token) {
            Ok(verified) => Ok(AuthUser(verified.user_id)),
            Err(e) => {
                warn!(error = %e, "access token rejected");
                Err(AuthError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
impl JwtKeys {
    pub fn sign_access(&self, identity: &Identity) -> Result<String, TokenError> {
        self.sign_at(identity, TokenKind::Access, self.access_ttl, OffsetDateTime::now_utc())
    }

    pub fn sign_refresh(&self, identity: &Identity) -> Result<String, TokenError> {
        self.sign_at(identity, TokenKind::Refresh, self.refresh_ttl, OffsetDateTime::now_utc())
    }
}
