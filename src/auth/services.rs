//! Login, refresh-token rotation and logout.

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{
        claims::Identity,
        cookie::{RequestCookies, SessionCookie},
        password,
        tokens::TokenPair,
    },
    error::AuthError,
    state::AppState,
};

/// A freshly minted pair and the cookie carrying its refresh half.
#[derive(Debug, Clone)]
pub struct Session {
    pub tokens: TokenPair,
    pub cookie: SessionCookie,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Rotated(Session),
    /// No refresh cookie and silence was requested; nothing issued.
    Unauthenticated,
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

async fn issue(state: &AppState, identity: &Identity) -> Result<Session, AuthError> {
    let tokens = state.keys.generate(identity)?;

    if let Some(store) = &state.tokens {
        let claims = state.keys.decode(&tokens.refresh_token)?;
        store.record(&claims.jti, identity.id, claims.exp).await?;
    }

    let cookie = state.cookies.issue(&tokens.refresh_token);
    Ok(Session { tokens, cookie })
}

#[instrument(skip(state, password))]
pub async fn login(state: &AppState, username: &str, password: &str) -> Result<Session, AuthError> {
    let username = username.trim();
    if !is_valid_username(username) {
        warn!("invalid username");
        return Err(AuthError::BadRequest("invalid username".into()));
    }
    if password.is_empty() {
        return Err(AuthError::BadRequest("password is required".into()));
    }

    let user = match state.users.find_by_username(username).await? {
        Some(u) => u,
        None => {
            password::burn_verification(password.to_string()).await;
            warn!("login unknown user");
            return Err(AuthError::InvalidCredentials);
        }
    };

    match password::verify_blocking(password.to_string(), user.password_hash.clone()).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(user_id = user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }
        Err(e) => {
            warn!(user_id = user.id, error = %e, "stored password hash unusable");
            return Err(AuthError::InvalidCredentials);
        }
    }

    let session = issue(state, &user.identity()).await?;
    info!(user_id = user.id, "user logged in");
    Ok(session)
}

#[instrument(skip_all)]
pub async fn refresh(state: &AppState, cookies: &RequestCookies) -> Result<RefreshOutcome, AuthError> {
    let Some(token) = cookies.refresh_token() else {
        if state.config.refresh_silent_when_missing {
            debug!("refresh without cookie");
            return Ok(RefreshOutcome::Unauthenticated);
        }
        warn!("refresh without cookie");
        return Err(AuthError::Unauthorized);
    };

    let verified = state.keys.verify_refresh(token).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        AuthError::from(e)
    })?;

    // consume before the user lookup so a jti rotates at most once
    if let Some(store) = &state.tokens {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if !store.consume(&verified.claims.jti, now).await? {
            warn!(user_id = verified.user_id, "refresh token not active");
            return Err(AuthError::Unauthorized);
        }
    }

    let user = state
        .users
        .find_by_id(verified.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = verified.user_id, "refresh for unknown user");
            AuthError::Unauthorized
        })?;

    let session = issue(state, &user.identity()).await?;
    info!(user_id = user.id, "refresh token rotated");
    Ok(RefreshOutcome::Rotated(session))
}

/// Always succeeds. A presented refresh token is revoked when a token store is
/// configured, but it is never required.
#[instrument(skip_all)]
pub async fn logout(state: &AppState, cookies: &RequestCookies) -> SessionCookie {
    if let (Some(store), Some(token)) = (&state.tokens, cookies.refresh_token()) {
        match state.keys.verify_refresh(token) {
            Ok(verified) => {
                let now = OffsetDateTime::now_utc().unix_timestamp();
                if let Err(e) = store.consume(&verified.claims.jti, now).await {
                    warn!(error = %e, "revoke on logout failed");
                }
            }
            Err(e) => debug!(error = %e, "logout with unusable refresh token"),
        }
    }
    state.cookies.expire()
}
