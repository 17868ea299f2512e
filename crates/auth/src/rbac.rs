//! RBAC entities: roles, their permissions, and actor assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::RoleId;

use crate::repo::Page;
use crate::{ActorId, ActorRef, ActorType, EntityFilter, Permission};

/// How role-name uniqueness is enforced.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleNameScope {
    /// Names are unique across every actor type.
    #[default]
    Global,
    /// Names are unique per actor type.
    ActorType,
}

/// Named group of permissions for one actor type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Option<RoleId>,
    pub actor_type: ActorType,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(actor_type: ActorType, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            actor_type,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub id: Option<i64>,
    pub role_id: RoleId,
    pub permission: Permission,
    pub created_at: DateTime<Utc>,
}

impl RolePermission {
    pub fn new(role_id: RoleId, permission: Permission) -> Self {
        Self {
            id: None,
            role_id,
            permission,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRole {
    pub id: Option<i64>,
    pub actor_type: ActorType,
    pub actor_id: ActorId,
    pub role_id: RoleId,
    pub created_at: DateTime<Utc>,
}

impl ActorRole {
    pub fn new(actor: &ActorRef, role_id: RoleId) -> Self {
        Self {
            id: None,
            actor_type: actor.actor_type,
            actor_id: actor.actor_id.clone(),
            role_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorPermission {
    pub id: Option<i64>,
    pub actor_type: ActorType,
    pub actor_id: ActorId,
    pub permission: Permission,
    pub created_at: DateTime<Utc>,
}

impl ActorPermission {
    pub fn new(actor: &ActorRef, permission: Permission) -> Self {
        Self {
            id: None,
            actor_type: actor.actor_type,
            actor_id: actor.actor_id.clone(),
            permission,
            created_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilter {
    pub id: Option<RoleId>,
    pub ids: Option<Vec<RoleId>>,
    pub name: Option<String>,
    pub actor_type: Option<ActorType>,
    pub page: Page,
}

impl RoleFilter {
    pub fn by_id(id: RoleId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_ids(ids: Vec<RoleId>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    /// Roles whose name collides with `name` under the given scope.
    pub fn by_name(name: impl Into<String>, actor_type: ActorType, scope: RoleNameScope) -> Self {
        Self {
            name: Some(name.into()),
            actor_type: match scope {
                RoleNameScope::Global => None,
                RoleNameScope::ActorType => Some(actor_type),
            },
            ..Default::default()
        }
    }
}

impl EntityFilter<Role> for RoleFilter {
    fn matches(&self, e: &Role) -> bool {
        self.id.is_none_or(|id| e.id == Some(id))
            && self
                .ids
                .as_ref()
                .is_none_or(|ids| e.id.is_some_and(|id| ids.contains(&id)))
            && self.name.as_ref().is_none_or(|n| &e.name == n)
            && self.actor_type.is_none_or(|t| e.actor_type == t)
    }

    fn page(&self) -> Page {
        self.page
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePermissionFilter {
    pub id: Option<i64>,
    pub role_id: Option<RoleId>,
    pub page: Page,
}

impl RolePermissionFilter {
    pub fn by_role(role_id: RoleId) -> Self {
        Self {
            role_id: Some(role_id),
            ..Default::default()
        }
    }
}

impl EntityFilter<RolePermission> for RolePermissionFilter {
    fn matches(&self, e: &RolePermission) -> bool {
        self.id.is_none_or(|id| e.id == Some(id)) && self.role_id.is_none_or(|r| e.role_id == r)
    }

    fn page(&self) -> Page {
        self.page
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorRoleFilter {
    pub id: Option<i64>,
    pub actor_type: Option<ActorType>,
    pub actor_id: Option<ActorId>,
    pub role_id: Option<RoleId>,
    pub page: Page,
}

impl ActorRoleFilter {
    pub fn by_actor(actor: &ActorRef) -> Self {
        Self {
            actor_type: Some(actor.actor_type),
            actor_id: Some(actor.actor_id.clone()),
            ..Default::default()
        }
    }

    pub fn by_role(role_id: RoleId) -> Self {
        Self {
            role_id: Some(role_id),
            ..Default::default()
        }
    }
}

impl EntityFilter<ActorRole> for ActorRoleFilter {
    fn matches(&self, e: &ActorRole) -> bool {
        self.id.is_none_or(|id| e.id == Some(id))
            && self.actor_type.is_none_or(|t| e.actor_type == t)
            && self.actor_id.as_ref().is_none_or(|a| &e.actor_id == a)
            && self.role_id.is_none_or(|r| e.role_id == r)
    }

    fn page(&self) -> Page {
        self.page
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorPermissionFilter {
    pub id: Option<i64>,
    pub actor_type: Option<ActorType>,
    pub actor_id: Option<ActorId>,
    pub permission: Option<Permission>,
    pub page: Page,
}

impl ActorPermissionFilter {
    pub fn by_actor(actor: &ActorRef) -> Self {
        Self {
            actor_type: Some(actor.actor_type),
            actor_id: Some(actor.actor_id.clone()),
            ..Default::default()
        }
    }
}

impl EntityFilter<ActorPermission> for ActorPermissionFilter {
    fn matches(&self, e: &ActorPermission) -> bool {
        self.id.is_none_or(|id| e.id == Some(id))
            && self.actor_type.is_none_or(|t| e.actor_type == t)
            && self.actor_id.as_ref().is_none_or(|a| &e.actor_id == a)
            && self.permission.as_ref().is_none_or(|p| &e.permission == p)
    }

    fn page(&self) -> Page {
        self.page
    }
}
