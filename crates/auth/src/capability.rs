//! Injected capabilities: password hashing and token issuing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{AuthResult, SessionId};

use crate::ActorRef;

#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> AuthResult<String>;

    /// `false` for a mismatch and for a malformed hash alike.
    async fn compare(&self, plaintext: &str, hash: &str) -> bool;
}

/// A freshly issued token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub trait TokenIssuer: Send + Sync {
    /// Access token bound to `session_id` and the owning actor.
    fn generate_access_token(&self, session_id: SessionId, actor: &ActorRef) -> AuthResult<IssuedToken>;

    fn generate_refresh_token(&self) -> AuthResult<IssuedToken>;
}
