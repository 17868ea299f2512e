//! Use-case services built on the Unit-of-Work contract.
//!
//! Every service holds an [`AuthDeps`] bundle assembled once at process start;
//! there is no global state. Each public operation opens its own Unit of Work.

mod admin_lifecycle;
mod bootstrap;
mod rbac_resolver;
mod session_manager;

use std::sync::Arc;

use serde::Serialize;

use crate::rbac::RoleNameScope;
use crate::{PasswordHasher, TokenIssuer, UowFactory};

pub use admin_lifecycle::{
    AdminLifecycle, CreateAdminInput, DisableAdminOutput, ListAdminsInput, UpdateAdminInput,
};
pub use bootstrap::{Bootstrap, CreateSuperadminInput};
pub use rbac_resolver::{
    ActorPermissionsOutput, ActorRolesOutput, CreateRoleInput, ListRolesInput, RbacResolver,
    RolePermissionsOutput, SetActorPermissionsInput, SetActorRolesInput, UpdateRoleInput,
};
pub use session_manager::{LoginInput, LoginOutput, SessionManager};

/// Explicit dependencies shared by every service.
#[derive(Clone)]
pub struct AuthDeps {
    pub uow: Arc<dyn UowFactory>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub role_name_scope: RoleNameScope,
}

impl AuthDeps {
    pub fn new(
        uow: Arc<dyn UowFactory>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            uow,
            hasher,
            tokens,
            role_name_scope: RoleNameScope::default(),
        }
    }

    pub fn with_role_name_scope(mut self, scope: RoleNameScope) -> Self {
        self.role_name_scope = scope;
        self
    }
}

/// Every service, wired from one [`AuthDeps`].
#[derive(Clone)]
pub struct AuthServices {
    pub sessions: SessionManager,
    pub rbac: RbacResolver,
    pub admins: AdminLifecycle,
    pub bootstrap: Bootstrap,
}

impl AuthServices {
    pub fn new(deps: AuthDeps) -> Self {
        Self {
            sessions: SessionManager::new(deps.clone()),
            rbac: RbacResolver::new(deps.clone()),
            admins: AdminLifecycle::new(deps.clone()),
            bootstrap: Bootstrap::new(deps),
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}
