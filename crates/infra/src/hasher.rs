//! Bcrypt password hashing.

use async_trait::async_trait;
use tracing::debug;

use warden_auth::PasswordHasher;
use warden_core::{AuthError, AuthResult};

/// Bcrypt hasher. Work runs on the blocking pool so it never stalls the
/// async runtime.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

#[async_trait]
impl PasswordHasher for BcryptHasher {
    async fn hash(&self, plaintext: &str) -> AuthResult<String> {
        let plaintext = plaintext.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || {
            bcrypt::hash(plaintext, cost)
                .map_err(|e| AuthError::persistence("password hashing failed").with_source(e))
        })
        .await
        .map_err(|e| AuthError::persistence("password hashing task failed").with_source(e))?
    }

    async fn compare(&self, plaintext: &str, hash: &str) -> bool {
        let plaintext = plaintext.to_string();
        let hash = hash.to_string();

        let verdict = tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash)).await;
        match verdict {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                debug!(error = %e, "stored password hash is malformed");
                false
            }
            Err(e) => {
                debug!(error = %e, "password compare task failed");
                false
            }
        }
    }
}
