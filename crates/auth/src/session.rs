//! Sessions: one row per authenticated login.
//!
//! A session has no persisted state column. It is ACTIVE while the row exists
//! and its tokens are unexpired, ROTATED implicitly when refresh overwrites both
//! tokens, and TERMINATED once the row is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::SessionId;

use crate::capability::IssuedToken;
use crate::repo::Page;
use crate::{ActorId, ActorRef, ActorType, EntityFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// `None` until the store assigns one.
    pub id: Option<SessionId>,
    pub actor_type: ActorType,
    pub actor_id: ActorId,
    /// Bound after the row exists, since the token embeds the session id.
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A not-yet-persisted session carrying only its refresh token.
    pub fn open(
        actor: &ActorRef,
        refresh: IssuedToken,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            actor_type: actor.actor_type,
            actor_id: actor.actor_id.clone(),
            access_token: None,
            access_token_expires_at: None,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            last_used_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn actor(&self) -> ActorRef {
        ActorRef::new(self.actor_type, self.actor_id.clone())
    }

    pub fn is_owned_by(&self, actor: &ActorRef) -> bool {
        self.actor_type == actor.actor_type && self.actor_id == actor.actor_id
    }

    /// Attach the first access token of a freshly created session.
    pub fn bind_access_token(&mut self, access: IssuedToken) {
        self.access_token = Some(access.token);
        self.access_token_expires_at = Some(access.expires_at);
    }

    /// Replace both tokens together and bump `last_used_at`.
    pub fn rotate(&mut self, access: IssuedToken, refresh: IssuedToken, now: DateTime<Utc>) {
        self.access_token = Some(access.token);
        self.access_token_expires_at = Some(access.expires_at);
        self.refresh_token = refresh.token;
        self.refresh_token_expires_at = refresh.expires_at;
        self.last_used_at = now;
    }

    pub fn refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token_expires_at <= now
    }

    /// A session without an access token is treated as expired.
    pub fn access_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_token_expires_at.is_none_or(|exp| exp <= now)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub id: Option<SessionId>,
    pub actor_type: Option<ActorType>,
    pub actor_id: Option<ActorId>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub page: Page,
}

impl SessionFilter {
    pub fn by_id(id: SessionId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_actor(actor: &ActorRef) -> Self {
        Self {
            actor_type: Some(actor.actor_type),
            actor_id: Some(actor.actor_id.clone()),
            ..Default::default()
        }
    }

    pub fn by_access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn by_refresh_token(token: impl Into<String>) -> Self {
        Self {
            refresh_token: Some(token.into()),
            ..Default::default()
        }
    }
}

impl EntityFilter<Session> for SessionFilter {
    fn matches(&self, e: &Session) -> bool {
        self.id.is_none_or(|id| e.id == Some(id))
            && self.actor_type.is_none_or(|t| e.actor_type == t)
            && self.actor_id.as_ref().is_none_or(|a| &e.actor_id == a)
            && self
                .access_token
                .as_ref()
                .is_none_or(|t| e.access_token.as_ref() == Some(t))
            && self.refresh_token.as_ref().is_none_or(|t| &e.refresh_token == t)
    }

    fn page(&self) -> Page {
        self.page
    }
}
