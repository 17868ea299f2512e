//! Unit of Work: one transactional scope exposing every entity store.
//!
//! Calling convention: open a scope, run every read and write through its
//! accessors, then hand the result to [`finish`], which applies on success and
//! discards on failure. Dropping a scope without applying it rolls back.

use async_trait::async_trait;

use warden_core::{AuthResult, RequestContext};

use crate::repo::{AdminRepo, Repo, RoleRepo};
use crate::{
    ActorPermission, ActorPermissionFilter, ActorRole, ActorRoleFilter, RolePermission,
    RolePermissionFilter, Session, SessionFilter,
};

/// Opens Units of Work.
#[async_trait]
pub trait UowFactory: Send + Sync {
    /// Open a scope governed by `ctx`: once it is cancelled or past its
    /// deadline, every store call and the final commit fail with `Cancelled`
    /// and the scope rolls back.
    async fn new_uow(&self, ctx: &RequestContext) -> AuthResult<Box<dyn UnitOfWork>>;
}

/// A transactional scope.
///
/// Accessors return stores constructed once when the scope was opened, all bound
/// to the same transaction. One scope serves one logical operation.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn admins(&self) -> &dyn AdminRepo;

    fn sessions(&self) -> &dyn Repo<Session, SessionFilter>;

    fn roles(&self) -> &dyn RoleRepo;

    fn role_permissions(&self) -> &dyn Repo<RolePermission, RolePermissionFilter>;

    fn actor_roles(&self) -> &dyn Repo<ActorRole, ActorRoleFilter>;

    fn actor_permissions(&self) -> &dyn Repo<ActorPermission, ActorPermissionFilter>;

    /// Commit using the context given at creation. A failed apply has already
    /// rolled the scope back.
    async fn apply_changes(&mut self) -> AuthResult<()>;

    /// Roll back. After an apply or a previous discard this only logs a
    /// warning; it never fails.
    async fn discard_unapplied(&mut self);
}

/// Apply on `Ok`, discard on `Err`.
pub async fn finish<T>(mut uow: Box<dyn UnitOfWork>, result: AuthResult<T>) -> AuthResult<T> {
    match result {
        Ok(value) => {
            uow.apply_changes()
                .await
                .map_err(|err| err.context("apply unit of work"))?;
            Ok(value)
        }
        Err(err) => {
            uow.discard_unapplied().await;
            Err(err)
        }
    }
}
