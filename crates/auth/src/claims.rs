use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::SessionId;

use crate::{ActorRef, ActorType};

/// Access-token claims (transport-agnostic).
///
/// Timestamps are unix seconds so the struct maps 1:1 onto registered JWT
/// claims. An access token is always bound to exactly one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the actor id.
    pub sub: String,

    pub actor_type: ActorType,

    /// Session the token is bound to.
    pub sid: SessionId,

    /// Unique token id; makes tokens issued within the same second distinct.
    pub jti: String,

    pub iat: i64,

    pub exp: i64,
}

impl AccessClaims {
    pub fn new(
        session_id: SessionId,
        actor: &ActorRef,
        jti: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: actor.actor_id.to_string(),
            actor_type: actor.actor_type,
            sid: session_id,
            jti: jti.into(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    pub fn actor(&self) -> ActorRef {
        ActorRef::new(self.actor_type, self.sub.as_str())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate access-token claims.
///
/// Only the claims are checked here; signature verification belongs to the
/// token issuer.
pub fn validate_claims(claims: &AccessClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
