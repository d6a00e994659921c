use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        cookie::{RequestCookies, SessionCookie},
        dto::{LoginRequest, PublicUser},
        jwt::AuthUser,
        services::{self, RefreshOutcome},
    },
    error::AuthError,
    state::AppState,
};

/// Both routes sit under the refresh cookie's default path.
pub const REFRESH_ROUTE: &str = "/auth/refresh";
pub const LOGOUT_ROUTE: &str = "/auth/logout";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route(REFRESH_ROUTE, post(refresh))
        .route(LOGOUT_ROUTE, post(logout))
        // also at the root path; clears the cookie without revoking it
        .route("/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn with_cookie(
    status: StatusCode,
    cookie: &SessionCookie,
    body: impl IntoResponse,
) -> Result<Response, AuthError> {
    let value = cookie
        .header_value()
        .map_err(|e| AuthError::Internal(e.into()))?;
    Ok((status, [(header::SET_COOKIE, value)], body).into_response())
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e.body_text(), "malformed login body");
        AuthError::BadRequest("invalid request body".into())
    })?;

    let session = services::login(&state, &payload.username, &payload.password).await?;
    with_cookie(StatusCode::ACCEPTED, &session.cookie, Json(session.tokens))
}

#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let cookies = RequestCookies::from_headers(&headers);
    match services::refresh(&state, &cookies).await? {
        RefreshOutcome::Rotated(session) => {
            with_cookie(StatusCode::OK, &session.cookie, Json(session.tokens))
        }
        RefreshOutcome::Unauthenticated => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let cookies = RequestCookies::from_headers(&headers);
    let cookie = services::logout(&state, &cookies).await;
    with_cookie(StatusCode::ACCEPTED, &cookie, ())
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(user_id, "token for unknown user");
        AuthError::Unauthorized
    })?;

    Ok(Json(PublicUser {
        id: user.id,
        username: user.username,
    }))
}
