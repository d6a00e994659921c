use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::error::TokenError;

/// Errors leaving the auth subsystem. Only a short, generic message reaches the client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Signing(msg) => AuthError::Signing(msg),
            _ => AuthError::Unauthorized,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_) | AuthError::InvalidCredentials => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Signing(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::BadRequest(msg) => msg.as_str(),
            AuthError::InvalidCredentials => "invalid credentials",
            AuthError::Unauthorized => "unauthorized",
            AuthError::Signing(_) | AuthError::Internal(_) => {
                error!(error = %self, "internal error");
                "internal server error"
            }
        };
        (self.status_code(), Json(ErrorResponse { error: message })).into_response()
    }
}
