//! Actors: any principal that can hold permissions.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use warden_core::{AdminId, AuthError, AuthResult, codes};

/// Kind of principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Admin,
    ServiceAccount,
}

impl ActorType {
    pub const ALL: [ActorType; 3] = [ActorType::User, ActorType::Admin, ActorType::ServiceAccount];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Admin => "admin",
            ActorType::ServiceAccount => "service_account",
        }
    }

    /// Parse a transport-supplied tag. Unknown values are rejected, never coerced.
    ///
    /// `service_acc` is accepted as a legacy spelling of `service_account`.
    pub fn parse(raw: &str) -> AuthResult<Self> {
        match raw {
            "user" => Ok(ActorType::User),
            "admin" => Ok(ActorType::Admin),
            "service_account" | "service_acc" => Ok(ActorType::ServiceAccount),
            other => Err(AuthError::invalid_input(
                codes::INVALID_ACTOR_TYPE,
                format!("invalid actor type '{other}'"),
            )),
        }
    }
}

impl core::fmt::Display for ActorType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Opaque actor identifier, unique within an [`ActorType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ActorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<AdminId> for ActorId {
    fn from(value: AdminId) -> Self {
        Self(value.to_string())
    }
}

/// A concrete actor: `(actor_type, actor_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub actor_type: ActorType,
    pub actor_id: ActorId,
}

impl ActorRef {
    pub fn new(actor_type: ActorType, actor_id: impl Into<ActorId>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
        }
    }

    pub fn admin(id: AdminId) -> Self {
        Self::new(ActorType::Admin, id)
    }

    /// Validate a raw `(actor_type, actor_id)` pair from the transport layer.
    pub fn parse(actor_type: &str, actor_id: &str) -> AuthResult<Self> {
        let actor_type = ActorType::parse(actor_type)?;
        if actor_id.trim().is_empty() {
            return Err(AuthError::validation("actor_id must not be empty"));
        }
        Ok(Self::new(actor_type, ActorId::new(actor_id)))
    }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl core::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.actor_type, self.actor_id)
    }
}
