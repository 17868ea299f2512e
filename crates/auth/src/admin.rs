//! Administrative accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::AdminId;

use crate::repo::Page;
use crate::{ActorRef, EntityFilter};

/// Administrative account.
///
/// Admins are never hard-deleted; disabling flips `is_active` and terminates
/// their sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: AdminId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_superadmin: bool,
    pub is_active: bool,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admin {
    /// A fresh, active admin. Timestamps are overwritten by the store.
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>, is_superadmin: bool) -> Self {
        let now = Utc::now();
        Self {
            id: AdminId::new(),
            username: username.into(),
            password_hash: password_hash.into(),
            is_superadmin,
            is_active: true,
            last_active_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn actor(&self) -> ActorRef {
        ActorRef::admin(self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminFilter {
    pub id: Option<AdminId>,
    pub username: Option<String>,
    pub is_superadmin: Option<bool>,
    pub is_active: Option<bool>,
    pub page: Page,
}

impl AdminFilter {
    pub fn by_id(id: AdminId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Default::default()
        }
    }

    /// Active admins holding the superadmin flag.
    pub fn active_superadmins() -> Self {
        Self {
            is_superadmin: Some(true),
            is_active: Some(true),
            ..Default::default()
        }
    }
}

impl EntityFilter<Admin> for AdminFilter {
    fn matches(&self, e: &Admin) -> bool {
        self.id.is_none_or(|id| e.id == id)
            && self.username.as_ref().is_none_or(|u| &e.username == u)
            && self.is_superadmin.is_none_or(|v| e.is_superadmin == v)
            && self.is_active.is_none_or(|v| e.is_active == v)
    }

    fn page(&self) -> Page {
        self.page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_never_serialized() {
        let admin = Admin::new("alice", "secret-hash", false);
        let json = serde_json::to_value(&admin).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn populated_filter_fields_are_anded() {
        let mut admin = Admin::new("root", "h", true);
        assert!(AdminFilter::active_superadmins().matches(&admin));

        admin.is_active = false;
        assert!(!AdminFilter::active_superadmins().matches(&admin));
        assert!(AdminFilter::by_username("root").matches(&admin));
        assert!(AdminFilter::default().matches(&admin));
    }
}
