use thiserror::Error;

/// Failures of the token codec and verifier.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token issuer or audience not recognised")]
    InvalidClaims,
    #[error("token is malformed")]
    Malformed,
    #[error("token subject is not a user id")]
    MalformedSubject,
    #[error("unexpected token kind")]
    WrongKind,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature => TokenError::InvalidClaims,
            _ => TokenError::Malformed,
        }
    }
}
