//! Row mapping and predicate push-down for each table.

use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use warden_auth::{
    ActorId, ActorPermission, ActorPermissionFilter, ActorRole, ActorRoleFilter, ActorType, Admin,
    AdminFilter, EntityFilter, Permission, Role, RoleFilter, RolePermission, RolePermissionFilter,
    Session, SessionFilter, StoreSpec,
};
use warden_core::{AdminId, RoleId, SessionId};

use crate::stores;

pub(crate) type Builder = QueryBuilder<'static, Postgres>;
pub(crate) type Values<'qb> = Separated<'qb, 'static, Postgres, &'static str>;

/// Primary key of one row.
#[derive(Debug, Copy, Clone)]
pub(crate) enum Key {
    Uuid(Uuid),
    Serial(i64),
}

impl Key {
    pub(crate) fn push_eq(self, qb: &mut Builder) {
        qb.push("id = ");
        match self {
            Key::Uuid(id) => qb.push_bind(id),
            Key::Serial(id) => qb.push_bind(id),
        };
    }

    /// `id = ANY($n)` over keys of a single table (one key kind).
    pub(crate) fn push_any(keys: &[Key], qb: &mut Builder) {
        let mut uuids = Vec::new();
        let mut serials = Vec::new();
        for key in keys {
            match *key {
                Key::Uuid(id) => uuids.push(id),
                Key::Serial(id) => serials.push(id),
            }
        }

        qb.push("id = ANY(");
        if uuids.is_empty() {
            qb.push_bind(serials);
        } else {
            qb.push_bind(uuids);
        }
        qb.push(")");
    }
}

/// Appends ` WHERE a AND b ...` as predicates are added.
pub(crate) struct Where<'a> {
    qb: &'a mut Builder,
    started: bool,
}

impl<'a> Where<'a> {
    pub(crate) fn new(qb: &'a mut Builder) -> Self {
        Self { qb, started: false }
    }

    pub(crate) fn and(&mut self, predicate: &str) -> &mut Builder {
        self.qb.push(if self.started { " AND " } else { " WHERE " });
        self.started = true;
        self.qb.push(predicate)
    }
}

pub(crate) trait PgEntity: Sized + Send + Sync + 'static {
    type Filter: EntityFilter<Self> + 'static;

    const SPEC: StoreSpec;
    /// Select list, also used for `RETURNING`.
    const COLUMNS: &'static str;
    /// Columns written on insert; serial keys are left to the database.
    const INSERT_COLUMNS: &'static str;

    fn key(&self) -> Option<Key>;

    /// Bind one row of `INSERT_COLUMNS`, in order.
    fn bind_insert(&self, row: &mut Values<'_>);

    /// Push the `SET` list of a full-row update.
    fn push_assignments(&self, qb: &mut Builder);

    fn push_filter(filter: &Self::Filter, w: &mut Where<'_>);

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;
}

fn actor_type(row: &PgRow) -> Result<ActorType, sqlx::Error> {
    let raw: String = row.try_get("actor_type")?;
    ActorType::parse(&raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn actor_id(row: &PgRow) -> Result<ActorId, sqlx::Error> {
    Ok(ActorId::new(row.try_get::<String, _>("actor_id")?))
}

fn permission(row: &PgRow) -> Result<Permission, sqlx::Error> {
    Ok(Permission::from(row.try_get::<String, _>("permission")?))
}

// ─────────────────────────────────────────────────────────────────────────────
// admins
// ─────────────────────────────────────────────────────────────────────────────

impl PgEntity for Admin {
    type Filter = AdminFilter;

    const SPEC: StoreSpec = stores::ADMINS;
    const COLUMNS: &'static str = "id, username, password_hash, is_superadmin, is_active, \
         last_active_at, created_at, updated_at";
    const INSERT_COLUMNS: &'static str = Self::COLUMNS;

    fn key(&self) -> Option<Key> {
        Some(Key::Uuid(*self.id.as_uuid()))
    }

    fn bind_insert(&self, row: &mut Values<'_>) {
        row.push_bind(*self.id.as_uuid())
            .push_bind(self.username.clone())
            .push_bind(self.password_hash.clone())
            .push_bind(self.is_superadmin)
            .push_bind(self.is_active)
            .push_bind(self.last_active_at)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }

    fn push_assignments(&self, qb: &mut Builder) {
        let mut set = qb.separated(", ");
        set.push("username = ").push_bind_unseparated(self.username.clone());
        set.push("password_hash = ").push_bind_unseparated(self.password_hash.clone());
        set.push("is_superadmin = ").push_bind_unseparated(self.is_superadmin);
        set.push("is_active = ").push_bind_unseparated(self.is_active);
        set.push("last_active_at = ").push_bind_unseparated(self.last_active_at);
        set.push("updated_at = now()");
    }

    fn push_filter(f: &AdminFilter, w: &mut Where<'_>) {
        if let Some(id) = f.id {
            w.and("id = ").push_bind(*id.as_uuid());
        }
        if let Some(username) = &f.username {
            w.and("username = ").push_bind(username.clone());
        }
        if let Some(v) = f.is_superadmin {
            w.and("is_superadmin = ").push_bind(v);
        }
        if let Some(v) = f.is_active {
            w.and("is_active = ").push_bind(v);
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: AdminId::from_uuid(row.try_get("id")?),
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            is_superadmin: row.try_get("is_superadmin")?,
            is_active: row.try_get("is_active")?,
            last_active_at: row.try_get("last_active_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// sessions
// ─────────────────────────────────────────────────────────────────────────────

impl PgEntity for Session {
    type Filter = SessionFilter;

    const SPEC: StoreSpec = stores::SESSIONS;
    const COLUMNS: &'static str = "id, actor_type, actor_id, access_token, access_token_expires_at, \
         refresh_token, refresh_token_expires_at, ip_address, user_agent, last_used_at, \
         created_at, updated_at";
    const INSERT_COLUMNS: &'static str = "actor_type, actor_id, access_token, \
         access_token_expires_at, refresh_token, refresh_token_expires_at, ip_address, \
         user_agent, last_used_at, created_at, updated_at";

    fn key(&self) -> Option<Key> {
        self.id.map(|id| Key::Serial(id.get()))
    }

    fn bind_insert(&self, row: &mut Values<'_>) {
        row.push_bind(self.actor_type.as_str())
            .push_bind(self.actor_id.as_str().to_owned())
            .push_bind(self.access_token.clone())
            .push_bind(self.access_token_expires_at)
            .push_bind(self.refresh_token.clone())
            .push_bind(self.refresh_token_expires_at)
            .push_bind(self.ip_address.clone())
            .push_bind(self.user_agent.clone())
            .push_bind(self.last_used_at)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }

    fn push_assignments(&self, qb: &mut Builder) {
        let mut set = qb.separated(", ");
        set.push("access_token = ").push_bind_unseparated(self.access_token.clone());
        set.push("access_token_expires_at = ")
            .push_bind_unseparated(self.access_token_expires_at);
        set.push("refresh_token = ").push_bind_unseparated(self.refresh_token.clone());
        set.push("refresh_token_expires_at = ")
            .push_bind_unseparated(self.refresh_token_expires_at);
        set.push("ip_address = ").push_bind_unseparated(self.ip_address.clone());
        set.push("user_agent = ").push_bind_unseparated(self.user_agent.clone());
        set.push("last_used_at = ").push_bind_unseparated(self.last_used_at);
        set.push("updated_at = now()");
    }

    fn push_filter(f: &SessionFilter, w: &mut Where<'_>) {
        if let Some(id) = f.id {
            w.and("id = ").push_bind(id.get());
        }
        if let Some(t) = f.actor_type {
            w.and("actor_type = ").push_bind(t.as_str());
        }
        if let Some(a) = &f.actor_id {
            w.and("actor_id = ").push_bind(a.as_str().to_owned());
        }
        if let Some(token) = &f.access_token {
            w.and("access_token = ").push_bind(token.clone());
        }
        if let Some(token) = &f.refresh_token {
            w.and("refresh_token = ").push_bind(token.clone());
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(SessionId::new(row.try_get("id")?)),
            actor_type: actor_type(row)?,
            actor_id: actor_id(row)?,
            access_token: row.try_get("access_token")?,
            access_token_expires_at: row.try_get("access_token_expires_at")?,
            refresh_token: row.try_get("refresh_token")?,
            refresh_token_expires_at: row.try_get("refresh_token_expires_at")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            last_used_at: row.try_get("last_used_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// roles
// ─────────────────────────────────────────────────────────────────────────────

impl PgEntity for Role {
    type Filter = RoleFilter;

    const SPEC: StoreSpec = stores::ROLES;
    const COLUMNS: &'static str = "id, actor_type, name, created_at, updated_at";
    const INSERT_COLUMNS: &'static str = "actor_type, name, created_at, updated_at";

    fn key(&self) -> Option<Key> {
        self.id.map(|id| Key::Serial(id.get()))
    }

    fn bind_insert(&self, row: &mut Values<'_>) {
        row.push_bind(self.actor_type.as_str())
            .push_bind(self.name.clone())
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }

    fn push_assignments(&self, qb: &mut Builder) {
        let mut set = qb.separated(", ");
        set.push("actor_type = ").push_bind_unseparated(self.actor_type.as_str());
        set.push("name = ").push_bind_unseparated(self.name.clone());
        set.push("updated_at = now()");
    }

    fn push_filter(f: &RoleFilter, w: &mut Where<'_>) {
        if let Some(id) = f.id {
            w.and("id = ").push_bind(id.get());
        }
        if let Some(ids) = &f.ids {
            let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
            w.and("id = ANY(").push_bind(ids).push(")");
        }
        if let Some(name) = &f.name {
            w.and("name = ").push_bind(name.clone());
        }
        if let Some(t) = f.actor_type {
            w.and("actor_type = ").push_bind(t.as_str());
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(RoleId::new(row.try_get("id")?)),
            actor_type: actor_type(row)?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// role_permissions
// ─────────────────────────────────────────────────────────────────────────────

impl PgEntity for RolePermission {
    type Filter = RolePermissionFilter;

    const SPEC: StoreSpec = stores::ROLE_PERMISSIONS;
    const COLUMNS: &'static str = "id, role_id, permission, created_at";
    const INSERT_COLUMNS: &'static str = "role_id, permission, created_at";

    fn key(&self) -> Option<Key> {
        self.id.map(Key::Serial)
    }

    fn bind_insert(&self, row: &mut Values<'_>) {
        row.push_bind(self.role_id.get())
            .push_bind(self.permission.as_str().to_owned())
            .push_bind(self.created_at);
    }

    fn push_assignments(&self, qb: &mut Builder) {
        let mut set = qb.separated(", ");
        set.push("role_id = ").push_bind_unseparated(self.role_id.get());
        set.push("permission = ").push_bind_unseparated(self.permission.as_str().to_owned());
    }

    fn push_filter(f: &RolePermissionFilter, w: &mut Where<'_>) {
        if let Some(id) = f.id {
            w.and("id = ").push_bind(id);
        }
        if let Some(role_id) = f.role_id {
            w.and("role_id = ").push_bind(role_id.get());
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            role_id: RoleId::new(row.try_get("role_id")?),
            permission: permission(row)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// actor_roles
// ─────────────────────────────────────────────────────────────────────────────

impl PgEntity for ActorRole {
    type Filter = ActorRoleFilter;

    const SPEC: StoreSpec = stores::ACTOR_ROLES;
    const COLUMNS: &'static str = "id, actor_type, actor_id, role_id, created_at";
    const INSERT_COLUMNS: &'static str = "actor_type, actor_id, role_id, created_at";

    fn key(&self) -> Option<Key> {
        self.id.map(Key::Serial)
    }

    fn bind_insert(&self, row: &mut Values<'_>) {
        row.push_bind(self.actor_type.as_str())
            .push_bind(self.actor_id.as_str().to_owned())
            .push_bind(self.role_id.get())
            .push_bind(self.created_at);
    }

    fn push_assignments(&self, qb: &mut Builder) {
        let mut set = qb.separated(", ");
        set.push("actor_type = ").push_bind_unseparated(self.actor_type.as_str());
        set.push("actor_id = ").push_bind_unseparated(self.actor_id.as_str().to_owned());
        set.push("role_id = ").push_bind_unseparated(self.role_id.get());
    }

    fn push_filter(f: &ActorRoleFilter, w: &mut Where<'_>) {
        if let Some(id) = f.id {
            w.and("id = ").push_bind(id);
        }
        if let Some(t) = f.actor_type {
            w.and("actor_type = ").push_bind(t.as_str());
        }
        if let Some(a) = &f.actor_id {
            w.and("actor_id = ").push_bind(a.as_str().to_owned());
        }
        if let Some(role_id) = f.role_id {
            w.and("role_id = ").push_bind(role_id.get());
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            actor_type: actor_type(row)?,
            actor_id: actor_id(row)?,
            role_id: RoleId::new(row.try_get("role_id")?),
            created_at: row.try_get("created_at")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// actor_permissions
// ─────────────────────────────────────────────────────────────────────────────

impl PgEntity for ActorPermission {
    type Filter = ActorPermissionFilter;

    const SPEC: StoreSpec = stores::ACTOR_PERMISSIONS;
    const COLUMNS: &'static str = "id, actor_type, actor_id, permission, created_at";
    const INSERT_COLUMNS: &'static str = "actor_type, actor_id, permission, created_at";

    fn key(&self) -> Option<Key> {
        self.id.map(Key::Serial)
    }

    fn bind_insert(&self, row: &mut Values<'_>) {
        row.push_bind(self.actor_type.as_str())
            .push_bind(self.actor_id.as_str().to_owned())
            .push_bind(self.permission.as_str().to_owned())
            .push_bind(self.created_at);
    }

    fn push_assignments(&self, qb: &mut Builder) {
        let mut set = qb.separated(", ");
        set.push("actor_type = ").push_bind_unseparated(self.actor_type.as_str());
        set.push("actor_id = ").push_bind_unseparated(self.actor_id.as_str().to_owned());
        set.push("permission = ").push_bind_unseparated(self.permission.as_str().to_owned());
    }

    fn push_filter(f: &ActorPermissionFilter, w: &mut Where<'_>) {
        if let Some(id) = f.id {
            w.and("id = ").push_bind(id);
        }
        if let Some(t) = f.actor_type {
            w.and("actor_type = ").push_bind(t.as_str());
        }
        if let Some(a) = &f.actor_id {
            w.and("actor_id = ").push_bind(a.as_str().to_owned());
        }
        if let Some(p) = &f.permission {
            w.and("permission = ").push_bind(p.as_str().to_owned());
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            actor_type: actor_type(row)?,
            actor_id: actor_id(row)?,
            permission: permission(row)?,
            created_at: row.try_get("created_at")?,
        })
    }
}
