use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use super::{
    claims::{Claims, Identity, TokenKind},
    error::TokenError,
    jwt::JwtKeys,
};

/// Anything that can turn an identity into a signed token.
pub trait ClaimsEncoder {
    fn encode_at(
        &self,
        identity: &Identity,
        kind: TokenKind,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<String, TokenError>;
}

/// Access and refresh token minted together.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs both halves for the same identity and instant. Either both tokens are
/// returned or the error of the first half that failed.
pub fn generate_pair<E: ClaimsEncoder + ?Sized>(
    encoder: &E,
    identity: &Identity,
    access_ttl: Duration,
    refresh_ttl: Duration,
    now: OffsetDateTime,
) -> Result<TokenPair, TokenError> {
    let access_token = encoder.encode_at(identity, TokenKind::Access, access_ttl, now)?;
    let refresh_token = encoder.encode_at(identity, TokenKind::Refresh, refresh_ttl, now)?;
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// A token whose signature and claims checked out.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub user_id: i64,
    pub claims: Claims,
}

pub fn verify(
    keys: &JwtKeys,
    token: &str,
    expected: TokenKind,
    now: OffsetDateTime,
) -> Result<VerifiedToken, TokenError> {
    let claims = keys.decode_at(token, now)?;
    if claims.kind != expected {
        return Err(TokenError::WrongKind);
    }
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| TokenError::MalformedSubject)?;
    Ok(VerifiedToken { user_id, claims })
}
