//! Role CRUD, replace-all assignments, and effective-permission resolution.
//!
//! Actor-scoped operations parse the raw actor type before opening a Unit of
//! Work, so an unknown type never reaches storage.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use warden_core::{AuthError, AuthResult, RequestContext, ResultExt, RoleId, codes};

use super::{AuthDeps, Paged};
use crate::authorize::{EffectivePermissions, authorize};
use crate::uow::finish;
use crate::{
    ActorPermission, ActorPermissionFilter, ActorRef, ActorRole, ActorRoleFilter, ActorType,
    Permission, Role, RoleFilter, RolePermission, RolePermissionFilter, UnitOfWork, validate,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleInput {
    pub name: String,
    pub actor_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRoleInput {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRolesInput {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub actor_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetActorRolesInput {
    pub actor_type: String,
    pub actor_id: String,
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetActorPermissionsInput {
    pub actor_type: String,
    pub actor_id: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RolePermissionsOutput {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorRolesOutput {
    pub actor: ActorRef,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorPermissionsOutput {
    pub actor: ActorRef,
    pub permissions: Vec<Permission>,
}

fn role_not_found(id: RoleId) -> AuthError {
    AuthError::not_found(codes::ROLE_NOT_FOUND, format!("role {id} not found"))
}

fn role_name_exists(name: &str) -> AuthError {
    AuthError::conflict(
        codes::ROLE_NAME_EXISTS,
        format!("role '{name}' already exists"),
    )
}

fn reserved_permission() -> AuthError {
    AuthError::unauthorized(
        codes::PERMISSION_DENIED,
        format!("'{}' can only be granted by bootstrap", Permission::SUPERADMIN),
    )
}

/// Validate, reject the reserved tag, and drop duplicates keeping first-seen
/// order so a replace-all never trips a unique constraint.
fn normalize_permissions(raw: Vec<String>) -> AuthResult<Vec<Permission>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for p in raw {
        let p = Permission::from(p);
        validate::permission(&p)?;
        if p.is_superadmin() {
            return Err(reserved_permission());
        }
        if seen.insert(p.clone()) {
            out.push(p);
        }
    }
    Ok(out)
}

fn dedup_role_ids(ids: Vec<RoleId>) -> Vec<RoleId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[derive(Clone)]
pub struct RbacResolver {
    deps: AuthDeps,
}

impl RbacResolver {
    pub fn new(deps: AuthDeps) -> Self {
        Self { deps }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, ctx), err)]
    pub async fn create_role(&self, ctx: &RequestContext, input: CreateRoleInput) -> AuthResult<Role> {
        let actor_type = ActorType::parse(&input.actor_type)?;
        validate::role_name(&input.name)?;
        let scope = self.deps.role_name_scope;

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            uow.roles().lock_name(&input.name).await?;
            if uow
                .roles()
                .exists(&RoleFilter::by_name(&input.name, actor_type, scope))
                .await?
            {
                return Err(role_name_exists(&input.name));
            }
            uow.roles().create(Role::new(actor_type, &input.name)).await
        }
        .await;
        finish(uow, result).await.context("create role")
    }

    /// Rename a role. Uniqueness is re-checked excluding the role itself.
    #[instrument(skip(self, ctx), err)]
    pub async fn update_role(&self, ctx: &RequestContext, input: UpdateRoleInput) -> AuthResult<Role> {
        validate::role_name(&input.name)?;
        let scope = self.deps.role_name_scope;

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let mut role = load_role(&*uow, input.id).await?;
            if role.name == input.name {
                return Ok(role);
            }
            uow.roles().lock_name(&input.name).await?;
            let clash = uow
                .roles()
                .list(&RoleFilter::by_name(&input.name, role.actor_type, scope))
                .await?
                .into_iter()
                .any(|r| r.id != role.id);
            if clash {
                return Err(role_name_exists(&input.name));
            }
            role.name = input.name.clone();
            uow.roles().update(role).await
        }
        .await;
        finish(uow, result).await.context("update role")
    }

    /// Delete a role together with its permission rows and actor assignments.
    #[instrument(skip(self, ctx), fields(role_id = id.get()), err)]
    pub async fn delete_role(&self, ctx: &RequestContext, id: RoleId) -> AuthResult<()> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let role = load_role(&*uow, id).await?;

            let perms = uow.role_permissions().list(&RolePermissionFilter::by_role(id)).await?;
            if !perms.is_empty() {
                uow.role_permissions().bulk_delete(&perms).await?;
            }
            let assignments = uow.actor_roles().list(&ActorRoleFilter::by_role(id)).await?;
            if !assignments.is_empty() {
                uow.actor_roles().bulk_delete(&assignments).await?;
            }
            debug!(
                permissions = perms.len(),
                assignments = assignments.len(),
                "cascaded role delete"
            );

            uow.roles().delete(&role).await
        }
        .await;
        finish(uow, result).await.context("delete role")
    }

    #[instrument(skip(self, ctx), err)]
    pub async fn list_roles(&self, ctx: &RequestContext, input: ListRolesInput) -> AuthResult<Paged<Role>> {
        let actor_type = input.actor_type.as_deref().map(ActorType::parse).transpose()?;
        let paging = validate::paging(input.page, input.page_size)?;
        let filter = RoleFilter {
            actor_type,
            page: paging.window(),
            ..Default::default()
        };

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = uow.roles().list_with_count(&filter).await;
        let (items, total) = finish(uow, result).await.context("list roles")?;
        Ok(Paged {
            items,
            total,
            page: paging.page,
            page_size: paging.page_size,
        })
    }

    #[instrument(skip(self, ctx), fields(role_id = role_id.get()), err)]
    pub async fn get_role_permissions(
        &self,
        ctx: &RequestContext,
        role_id: RoleId,
    ) -> AuthResult<RolePermissionsOutput> {
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let role = load_role(&*uow, role_id).await?;
            let permissions = role_permission_set(&*uow, role_id).await?;
            Ok(RolePermissionsOutput { role, permissions })
        }
        .await;
        finish(uow, result).await.context("get role permissions")
    }

    // ─────────────────────────────────────────────────────────────────────
    // Replace-all assignments
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the permission set of a role. An empty list clears it.
    #[instrument(skip(self, ctx, permissions), fields(role_id = role_id.get(), count = permissions.len()), err)]
    pub async fn set_role_permissions(
        &self,
        ctx: &RequestContext,
        role_id: RoleId,
        permissions: Vec<String>,
    ) -> AuthResult<RolePermissionsOutput> {
        let permissions = normalize_permissions(permissions)?;

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let role = load_role(&*uow, role_id).await?;

            let existing = uow
                .role_permissions()
                .list(&RolePermissionFilter::by_role(role_id))
                .await?;
            if !existing.is_empty() {
                uow.role_permissions().bulk_delete(&existing).await?;
            }
            if !permissions.is_empty() {
                let rows = permissions
                    .iter()
                    .cloned()
                    .map(|p| RolePermission::new(role_id, p))
                    .collect();
                uow.role_permissions().bulk_create(rows).await?;
            }
            Ok(RolePermissionsOutput { role, permissions })
        }
        .await;
        finish(uow, result).await.context("set role permissions")
    }

    /// Replace the roles assigned to an actor. Every id must exist, otherwise
    /// nothing changes.
    #[instrument(skip(self, ctx), err)]
    pub async fn set_actor_roles(
        &self,
        ctx: &RequestContext,
        input: SetActorRolesInput,
    ) -> AuthResult<ActorRolesOutput> {
        let actor = ActorRef::parse(&input.actor_type, &input.actor_id)?;
        let role_ids = dedup_role_ids(input.role_ids);

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let roles = if role_ids.is_empty() {
                Vec::new()
            } else {
                uow.roles().list(&RoleFilter::by_ids(role_ids.clone())).await?
            };
            if roles.len() != role_ids.len() {
                let missing = role_ids
                    .iter()
                    .find(|id| !roles.iter().any(|r| r.id == Some(**id)))
                    .copied();
                return Err(match missing {
                    Some(id) => role_not_found(id),
                    None => AuthError::not_found(codes::ROLE_NOT_FOUND, "one or more roles not found"),
                });
            }

            let existing = uow.actor_roles().list(&ActorRoleFilter::by_actor(&actor)).await?;
            if !existing.is_empty() {
                uow.actor_roles().bulk_delete(&existing).await?;
            }
            if !role_ids.is_empty() {
                let rows = role_ids.iter().map(|id| ActorRole::new(&actor, *id)).collect();
                uow.actor_roles().bulk_create(rows).await?;
            }
            Ok(ActorRolesOutput {
                actor: actor.clone(),
                roles,
            })
        }
        .await;
        finish(uow, result).await.context("set actor roles")
    }

    /// Replace the permissions granted directly to an actor.
    ///
    /// The reserved superadmin grant cannot be assigned here, and an existing
    /// one is left in place.
    #[instrument(skip(self, ctx), err)]
    pub async fn set_actor_permissions(
        &self,
        ctx: &RequestContext,
        input: SetActorPermissionsInput,
    ) -> AuthResult<ActorPermissionsOutput> {
        let actor = ActorRef::parse(&input.actor_type, &input.actor_id)?;
        let permissions = normalize_permissions(input.permissions)?;

        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = async {
            let existing: Vec<ActorPermission> = uow
                .actor_permissions()
                .list(&ActorPermissionFilter::by_actor(&actor))
                .await?
                .into_iter()
                .filter(|p| !p.permission.is_superadmin())
                .collect();
            if !existing.is_empty() {
                uow.actor_permissions().bulk_delete(&existing).await?;
            }
            if !permissions.is_empty() {
                let rows = permissions
                    .iter()
                    .cloned()
                    .map(|p| ActorPermission::new(&actor, p))
                    .collect();
                uow.actor_permissions().bulk_create(rows).await?;
            }
            Ok(ActorPermissionsOutput {
                actor: actor.clone(),
                permissions,
            })
        }
        .await;
        finish(uow, result).await.context("set actor permissions")
    }

    // ─────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────

    /// Union of role-derived and direct permissions, with provenance.
    #[instrument(skip(self, ctx), err)]
    pub async fn get_effective_permissions(
        &self,
        ctx: &RequestContext,
        actor_type: &str,
        actor_id: &str,
    ) -> AuthResult<EffectivePermissions> {
        let actor = ActorRef::parse(actor_type, actor_id)?;
        let uow = self.deps.uow.new_uow(ctx).await?;
        let result = resolve_in(&*uow, actor).await;
        finish(uow, result).await.context("get effective permissions")
    }

    /// Resolve and check one permission; `PERMISSION_DENIED` when missing.
    #[instrument(skip(self, ctx), err(level = "debug"))]
    pub async fn check_permission(
        &self,
        ctx: &RequestContext,
        actor_type: &str,
        actor_id: &str,
        required: &Permission,
    ) -> AuthResult<()> {
        let resolved = self.get_effective_permissions(ctx, actor_type, actor_id).await?;
        authorize(&resolved, required)
    }
}

async fn load_role(uow: &dyn UnitOfWork, id: RoleId) -> AuthResult<Role> {
    uow.roles()
        .first_or_nil(&RoleFilter::by_id(id))
        .await?
        .ok_or_else(|| role_not_found(id))
}

async fn role_permission_set(uow: &dyn UnitOfWork, role_id: RoleId) -> AuthResult<Vec<Permission>> {
    Ok(uow
        .role_permissions()
        .list(&RolePermissionFilter::by_role(role_id))
        .await?
        .into_iter()
        .map(|rp| rp.permission)
        .collect())
}

async fn resolve_in(uow: &dyn UnitOfWork, actor: ActorRef) -> AuthResult<EffectivePermissions> {
    let direct: Vec<Permission> = uow
        .actor_permissions()
        .list(&ActorPermissionFilter::by_actor(&actor))
        .await?
        .into_iter()
        .map(|p| p.permission)
        .collect();

    let assignments = uow.actor_roles().list(&ActorRoleFilter::by_actor(&actor)).await?;
    let mut from_roles = Vec::new();
    for assignment in &assignments {
        from_roles.extend(role_permission_set(uow, assignment.role_id).await?);
    }

    Ok(EffectivePermissions::resolve(actor, from_roles, direct))
}
