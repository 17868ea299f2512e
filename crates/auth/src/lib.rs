//! `warden-auth`: authorization core with entities, the store and Unit-of-Work
//! contracts, and the session/RBAC/admin services built on them.
//!
//! This crate is decoupled from HTTP and from any storage engine; concrete
//! stores and capabilities live in `warden-infra`.

pub mod actor;
pub mod admin;
pub mod authorize;
pub mod capability;
pub mod claims;
pub mod permissions;
pub mod rbac;
pub mod repo;
pub mod service;
pub mod session;
pub mod uow;
pub mod validate;

pub use actor::{ActorId, ActorRef, ActorType};
pub use admin::{Admin, AdminFilter};
pub use authorize::{EffectivePermissions, authorize};
pub use capability::{IssuedToken, PasswordHasher, TokenIssuer};
pub use claims::{AccessClaims, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use rbac::{
    ActorPermission, ActorPermissionFilter, ActorRole, ActorRoleFilter, Role, RoleFilter,
    RoleNameScope, RolePermission, RolePermissionFilter,
};
pub use repo::{AdminRepo, EntityFilter, Page, Repo, RoleRepo, StoreSpec};
pub use service::{AuthDeps, AuthServices, Paged};
pub use session::{Session, SessionFilter};
pub use uow::{UnitOfWork, UowFactory, finish};
