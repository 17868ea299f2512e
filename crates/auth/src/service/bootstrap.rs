use serde::Deserialize;
use tracing::{info, instrument};

use warden_core::{AuthError, AuthResult, RequestContext, ResultExt, codes};

use super::AuthDeps;
use crate::uow::finish;
use crate::{ActorPermission, Admin, AdminFilter, Permission, UnitOfWork, validate};

#[derive(Clone, Deserialize)]
pub struct CreateSuperadminInput {
    pub username: String,
    pub password: String,
}

impl core::fmt::Debug for CreateSuperadminInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CreateSuperadminInput")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Creates the first administrative actor.
#[derive(Clone)]
pub struct Bootstrap {
    deps: AuthDeps,
}

impl Bootstrap {
    pub fn new(deps: AuthDeps) -> Self {
        Self { deps }
    }

    /// Create an admin flagged as superadmin and grant it the reserved
    /// superadmin permission, atomically: either both rows exist afterwards or
    /// neither does.
    #[instrument(skip(self, ctx, input), fields(username = %input.username), err)]
    pub async fn create_superadmin(
        &self,
        ctx: &RequestContext,
        input: CreateSuperadminInput,
    ) -> AuthResult<Admin> {
        validate::username(&input.username)?;
        if input.password.is_empty() {
            return Err(AuthError::validation("password must not be empty"));
        }

        let password_hash = self
            .deps
            .hasher
            .hash(&input.password)
            .await
            .context("hash password")?;

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = create_in(&*uow, Admin::new(input.username, password_hash, true)).await;
        let admin = finish(uow, result).await.context("create superadmin")?;

        info!(admin_id = %admin.id, "superadmin created");
        Ok(admin)
    }
}

async fn create_in(uow: &dyn UnitOfWork, admin: Admin) -> AuthResult<Admin> {
    if uow
        .admins()
        .exists(&AdminFilter::by_username(&admin.username))
        .await?
    {
        return Err(AuthError::conflict(
            codes::USERNAME_EXISTS,
            "admin with this username already exists",
        ));
    }

    let admin = uow.admins().create(admin).await.context("create admin")?;
    uow.actor_permissions()
        .create(ActorPermission::new(&admin.actor(), Permission::SUPERADMIN))
        .await
        .context("grant superadmin permission")?;
    Ok(admin)
}
