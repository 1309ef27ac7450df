use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use wayfare_shared::Masked;

use crate::{CoreError, CoreResult};

/// Hashes a password into an Argon2 PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> CoreResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(CoreError::persistence)?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(CoreError::persistence)?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(CoreError::persistence)?
        .to_string();
    Ok(phc)
}

/// Unparseable hashes never verify.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// `hash_password` on the blocking pool, keeping Argon2 off the async
/// workers.
pub async fn spawn_hash(password: Masked<String>) -> CoreResult<String> {
    tokio::task::spawn_blocking(move || hash_password(password.expose()))
        .await
        .map_err(CoreError::persistence)?
}

/// `verify_password` on the blocking pool. A panicked task never verifies.
pub async fn spawn_verify(hash: String, password: Masked<String>) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&hash, password.expose()))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "battery staple"));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_spawned_hashing_leaves_runtime_free() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::task::yield_now().await;
                }
            }
        });

        let hash = spawn_hash(Masked::from("correct horse")).await.unwrap();
        assert!(ticks.load(Ordering::Relaxed) > 0);

        assert!(spawn_verify(hash.clone(), Masked::from("correct horse")).await);
        assert!(!spawn_verify(hash, Masked::from("battery staple")).await);
        ticker.abort();
    }

    #[test]
    fn test_garbage_hash_rejected() {
        assert!(!verify_password("not-a-phc-string", "anything"));
    }
}
