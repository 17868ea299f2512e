use std::collections::BTreeSet;

use serde::Serialize;

use warden_core::{AuthError, AuthResult, codes};

use crate::{ActorRef, Permission};

/// Resolved permission view of one actor.
///
/// Keeps the role-derived and direct sets apart for auditing; `effective` is
/// their union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermissions {
    pub actor: ActorRef,
    pub from_roles: BTreeSet<Permission>,
    pub direct: BTreeSet<Permission>,
    pub effective: BTreeSet<Permission>,
}

impl EffectivePermissions {
    pub fn resolve(
        actor: ActorRef,
        from_roles: impl IntoIterator<Item = Permission>,
        direct: impl IntoIterator<Item = Permission>,
    ) -> Self {
        let from_roles: BTreeSet<Permission> = from_roles.into_iter().collect();
        let direct: BTreeSet<Permission> = direct.into_iter().collect();
        let effective = from_roles.union(&direct).cloned().collect();
        Self {
            actor,
            from_roles,
            direct,
            effective,
        }
    }

    pub fn is_superadmin(&self) -> bool {
        self.effective.contains(&Permission::SUPERADMIN)
    }

    /// The reserved superadmin permission satisfies every requirement.
    pub fn allows(&self, required: &Permission) -> bool {
        self.is_superadmin() || self.effective.contains(required)
    }
}

/// Pure policy check over an already-resolved permission set.
pub fn authorize(perms: &EffectivePermissions, required: &Permission) -> AuthResult<()> {
    if perms.allows(required) {
        Ok(())
    } else {
        Err(AuthError::unauthorized(
            codes::PERMISSION_DENIED,
            format!("{} lacks permission '{}'", perms.actor, required),
        ))
    }
}
