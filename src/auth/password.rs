use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;

lazy_static! {
    /// Burned on unknown usernames so both login failures cost one argon2 verify.
    static ref DUMMY_HASH: Option<String> = hash_password("forum-auth-dummy-password").ok();
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash cannot be parsed.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("argon2 parse hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Computes the dummy hash up front so the first unknown-user login is not
/// slower than the rest.
pub fn prepare_dummy_hash() -> bool {
    DUMMY_HASH.is_some()
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .context("password verification task")?
}

/// One throwaway verification against the dummy hash, on the blocking pool.
pub async fn burn_verification(plain: String) {
    let burned = tokio::task::spawn_blocking(move || {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = verify_password(&plain, hash);
        }
    })
    .await;
    if let Err(e) = burned {
        tracing::warn!(error = %e, "dummy password verification task failed");
    }
}
