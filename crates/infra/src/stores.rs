//! Per-table store descriptions shared by the Postgres and in-memory stores.
//!
//! Constraint names match `migrations/0001_auth.sql`; the in-memory store
//! reports the same names so both backends surface identical conflict codes.

use warden_auth::StoreSpec;
use warden_core::{AuthError, codes};

pub const ADMINS: StoreSpec = StoreSpec {
    table: "admins",
    not_found_code: codes::ADMIN_NOT_FOUND,
    conflicts: &[("admins_username_key", codes::USERNAME_EXISTS)],
};

pub const SESSIONS: StoreSpec = StoreSpec {
    table: "sessions",
    not_found_code: codes::SESSION_NOT_FOUND,
    conflicts: &[
        ("sessions_access_token_key", codes::SESSION_TOKEN_CONFLICT),
        ("sessions_refresh_token_key", codes::SESSION_TOKEN_CONFLICT),
    ],
};

pub const ROLES: StoreSpec = StoreSpec {
    table: "roles",
    not_found_code: codes::ROLE_NOT_FOUND,
    conflicts: &[("roles_actor_type_name_key", codes::ROLE_NAME_EXISTS)],
};

pub const ROLE_PERMISSIONS: StoreSpec = StoreSpec {
    table: "role_permissions",
    not_found_code: codes::ROLE_PERMISSION_NOT_FOUND,
    conflicts: &[(
        "role_permissions_role_id_permission_key",
        codes::ROLE_PERMISSION_EXISTS,
    )],
};

pub const ACTOR_ROLES: StoreSpec = StoreSpec {
    table: "actor_roles",
    not_found_code: codes::ACTOR_ROLE_NOT_FOUND,
    conflicts: &[(
        "actor_roles_actor_type_actor_id_role_id_key",
        codes::ACTOR_ROLE_EXISTS,
    )],
};

pub const ACTOR_PERMISSIONS: StoreSpec = StoreSpec {
    table: "actor_permissions",
    not_found_code: codes::ACTOR_PERMISSION_NOT_FOUND,
    conflicts: &[(
        "actor_permissions_actor_type_actor_id_permission_key",
        codes::ACTOR_PERMISSION_EXISTS,
    )],
};

/// Error for a violated unique constraint, mapped through the store's table.
///
/// Unmapped constraints are a persistence failure: they indicate a schema the
/// store does not know about.
pub(crate) fn unique_violation(spec: &StoreSpec, constraint: &str) -> AuthError {
    match spec.conflict_code(constraint) {
        Some(code) => AuthError::conflict(
            code,
            format!("{} violates unique constraint {constraint}", spec.table),
        ),
        None => AuthError::persistence(format!(
            "{}: unmapped unique constraint {constraint}",
            spec.table
        )),
    }
}
