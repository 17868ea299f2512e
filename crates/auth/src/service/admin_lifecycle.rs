//! Admin create/update/disable with last-superadmin protection.
//!
//! The guard count and the mutation it protects always run in the same Unit of
//! Work, and the count takes row locks (`count_for_update`), so two concurrent
//! disables or demotions cannot both pass the check.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use warden_core::{AdminId, AuthError, AuthResult, RequestContext, ResultExt, codes};

use super::session_manager::terminate_sessions;
use super::{AuthDeps, Paged};
use crate::uow::finish;
use crate::{ActorPermissionFilter, Admin, AdminFilter, Permission, UnitOfWork, validate};

#[derive(Clone, Deserialize)]
pub struct CreateAdminInput {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_superadmin: bool,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Clone, Default, Deserialize)]
pub struct UpdateAdminInput {
    pub id: AdminId,
    pub username: Option<String>,
    pub password: Option<String>,
    pub is_superadmin: Option<bool>,
}

impl core::fmt::Debug for CreateAdminInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CreateAdminInput")
            .field("username", &self.username)
            .field("is_superadmin", &self.is_superadmin)
            .finish_non_exhaustive()
    }
}

impl core::fmt::Debug for UpdateAdminInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UpdateAdminInput")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_changed", &self.password.is_some())
            .field("is_superadmin", &self.is_superadmin)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAdminsInput {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisableAdminOutput {
    pub admin: Admin,
    pub terminated_sessions: u64,
}

fn admin_not_found(id: AdminId) -> AuthError {
    AuthError::not_found(codes::ADMIN_NOT_FOUND, format!("admin {id} not found"))
}

fn username_exists() -> AuthError {
    AuthError::conflict(
        codes::USERNAME_EXISTS,
        "admin with this username already exists",
    )
}

#[derive(Clone)]
pub struct AdminLifecycle {
    deps: AuthDeps,
}

impl AdminLifecycle {
    pub fn new(deps: AuthDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self, ctx, input), fields(username = %input.username), err)]
    pub async fn create_admin(&self, ctx: &RequestContext, input: CreateAdminInput) -> AuthResult<Admin> {
        validate::username(&input.username)?;
        validate::password(&input.password)?;

        let password_hash = self.deps.hasher.hash(&input.password).await.context("hash password")?;
        let admin = Admin::new(input.username, password_hash, input.is_superadmin);

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            if uow
                .admins()
                .exists(&AdminFilter::by_username(&admin.username))
                .await?
            {
                return Err(username_exists());
            }
            uow.admins().create(admin).await
        }
        .await;
        finish(uow, result).await.context("create admin")
    }

    #[instrument(skip(self, ctx), err)]
    pub async fn get_admin(&self, ctx: &RequestContext, id: AdminId) -> AuthResult<Admin> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = load_admin(&*uow, id).await;
        finish(uow, result).await.context("get admin")
    }

    #[instrument(skip(self, ctx), err)]
    pub async fn list_admins(&self, ctx: &RequestContext, input: ListAdminsInput) -> AuthResult<Paged<Admin>> {
        let paging = validate::paging(input.page, input.page_size)?;
        let filter = AdminFilter {
            is_active: input.is_active,
            page: paging.window(),
            ..Default::default()
        };

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = uow.admins().list_with_count(&filter).await;
        let (items, total) = finish(uow, result).await.context("list admins")?;
        Ok(Paged {
            items,
            total,
            page: paging.page,
            page_size: paging.page_size,
        })
    }

    /// Partial update. Username uniqueness is re-checked, a new password is
    /// re-hashed, and demoting the last active superadmin is refused.
    #[instrument(skip(self, ctx, input), fields(admin_id = %input.id), err)]
    pub async fn update_admin(&self, ctx: &RequestContext, input: UpdateAdminInput) -> AuthResult<Admin> {
        if let Some(username) = &input.username {
            validate::username(username)?;
        }
        let password_hash = match &input.password {
            Some(password) => {
                validate::password(password)?;
                Some(self.deps.hasher.hash(password).await.context("hash password")?)
            }
            None => None,
        };

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = update_in(&*uow, input, password_hash).await;
        finish(uow, result).await.context("update admin")
    }

    /// Deactivate an admin and terminate all of its sessions.
    #[instrument(skip(self, ctx), err)]
    pub async fn disable_admin(&self, ctx: &RequestContext, id: AdminId) -> AuthResult<DisableAdminOutput> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = disable_in(&*uow, id).await;
        let out = finish(uow, result).await.context("disable admin")?;

        info!(
            admin_id = %id,
            terminated_sessions = out.terminated_sessions,
            "admin disabled"
        );
        Ok(out)
    }
}

async fn load_admin(uow: &dyn UnitOfWork, id: AdminId) -> AuthResult<Admin> {
    uow.admins()
        .first_or_nil(&AdminFilter::by_id(id))
        .await?
        .ok_or_else(|| admin_not_found(id))
}

/// Fails unless some other active superadmin remains.
///
/// `code` names the refused mutation.
async fn guard_last_superadmin(uow: &dyn UnitOfWork, code: &'static str) -> AuthResult<()> {
    let active = uow
        .admins()
        .count_for_update(&AdminFilter::active_superadmins())
        .await
        .context("count active superadmins")?;
    if active <= 1 {
        warn!(code, "refused to remove the last active superadmin");
        return Err(AuthError::invariant(
            code,
            "at least one active superadmin must remain",
        ));
    }
    Ok(())
}

async fn update_in(
    uow: &dyn UnitOfWork,
    input: UpdateAdminInput,
    password_hash: Option<String>,
) -> AuthResult<Admin> {
    let mut admin = load_admin(uow, input.id).await?;

    if let Some(username) = input.username.filter(|u| *u != admin.username) {
        if let Some(existing) = uow
            .admins()
            .first_or_nil(&AdminFilter::by_username(&username))
            .await?
        {
            if existing.id != admin.id {
                return Err(username_exists());
            }
        }
        admin.username = username;
    }

    if let Some(hash) = password_hash {
        admin.password_hash = hash;
    }

    let changed = input.is_superadmin.filter(|f| *f != admin.is_superadmin);
    if changed == Some(false) && admin.is_active {
        // Demoting an inactive superadmin does not change the active count.
        guard_last_superadmin(uow, codes::CANNOT_DEMOTE_LAST_SUPERADMIN).await?;
    }
    if let Some(flag) = changed {
        admin.is_superadmin = flag;
    }

    let admin = uow.admins().update(admin).await?;

    // Only Bootstrap grants the reserved permission; a demotion takes it away.
    if changed == Some(false) {
        let grants = uow
            .actor_permissions()
            .list(&ActorPermissionFilter {
                permission: Some(Permission::SUPERADMIN),
                ..ActorPermissionFilter::by_actor(&admin.actor())
            })
            .await?;
        if !grants.is_empty() {
            uow.actor_permissions()
                .bulk_delete(&grants)
                .await
                .context("revoke superadmin permission")?;
        }
    }

    Ok(admin)
}

async fn disable_in(uow: &dyn UnitOfWork, id: AdminId) -> AuthResult<DisableAdminOutput> {
    let mut admin = load_admin(uow, id).await?;
    if !admin.is_active {
        return Err(AuthError::conflict(
            codes::ADMIN_ALREADY_DISABLED,
            format!("admin {id} is already disabled"),
        ));
    }
    if admin.is_superadmin {
        guard_last_superadmin(uow, codes::CANNOT_DISABLE_LAST_SUPERADMIN).await?;
    }

    admin.is_active = false;
    let admin = uow.admins().update(admin).await?;
    let terminated_sessions = terminate_sessions(uow, &admin.actor())
        .await
        .context("terminate sessions")?;

    Ok(DisableAdminOutput {
        admin,
        terminated_sessions,
    })
}
