//! Deterministic capabilities for tests and local tooling.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use warden_auth::{ActorRef, IssuedToken, PasswordHasher, TokenIssuer};
use warden_core::{AuthResult, SessionId};

const PLAIN_PREFIX: &str = "plain:";

/// Reversible "hash" with no work factor. Never use outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHasher;

#[async_trait]
impl PasswordHasher for PlainHasher {
    async fn hash(&self, plaintext: &str) -> AuthResult<String> {
        Ok(format!("{PLAIN_PREFIX}{plaintext}"))
    }

    async fn compare(&self, plaintext: &str, hash: &str) -> bool {
        hash.strip_prefix(PLAIN_PREFIX) == Some(plaintext)
    }
}

/// Counter-based token issuer with configurable lifetimes.
///
/// Negative lifetimes produce already-expired tokens.
#[derive(Debug)]
pub struct SequentialTokenIssuer {
    next: AtomicU64,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SequentialTokenIssuer {
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            next: AtomicU64::new(1),
            access_ttl,
            refresh_ttl,
        }
    }

    fn seq(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequentialTokenIssuer {
    fn default() -> Self {
        Self::new(Duration::minutes(15), Duration::days(30))
    }
}

impl TokenIssuer for SequentialTokenIssuer {
    fn generate_access_token(&self, session_id: SessionId, actor: &ActorRef) -> AuthResult<IssuedToken> {
        Ok(IssuedToken {
            token: format!("access-{}-{session_id}-{actor}", self.seq()),
            expires_at: Utc::now() + self.access_ttl,
        })
    }

    fn generate_refresh_token(&self) -> AuthResult<IssuedToken> {
        Ok(IssuedToken {
            token: format!("refresh-{}", self.seq()),
            expires_at: Utc::now() + self.refresh_ttl,
        })
    }
}
