use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};

use warden_auth::{
    ActorPermission, ActorRole, Admin, EntityFilter, Role, RolePermission, Session, StoreSpec,
};
use warden_core::{AdminId, AuthError, AuthResult, RoleId, SessionId};

use super::Tables;
use crate::stores::{self, unique_violation};

/// An entity the in-memory store can hold.
pub(crate) trait MemEntity: Clone + Debug + Send + Sync + 'static {
    type Key: Ord + Clone + Debug + Send + Sync;

    const SPEC: StoreSpec;

    /// Primary key, `None` before a serial key is assigned.
    fn key(&self) -> Option<Self::Key>;

    /// Assign a generated serial key. No-op for client-keyed entities.
    fn assign_key(&mut self, serial: i64);

    /// `(constraint, value)` pairs that must be unique across the table.
    fn unique_keys(&self) -> Vec<(&'static str, String)>;

    fn stamp(&mut self, now: DateTime<Utc>, inserted: bool);

    fn table(tables: &Tables) -> &Table<Self>;

    fn table_mut(tables: &mut Tables) -> &mut Table<Self>;
}

#[derive(Debug)]
pub(crate) struct Table<E: MemEntity> {
    rows: BTreeMap<E::Key, E>,
    next_serial: i64,
}

impl<E: MemEntity> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_serial: 0,
        }
    }
}

impl<E: MemEntity> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            next_serial: self.next_serial,
        }
    }
}

impl<E: MemEntity> Table<E> {
    fn check_unique(&self, entity: &E, own_key: Option<&E::Key>) -> AuthResult<()> {
        let wanted = entity.unique_keys();
        if wanted.is_empty() {
            return Ok(());
        }
        for (key, row) in &self.rows {
            if Some(key) == own_key {
                continue;
            }
            let taken = row.unique_keys();
            if let Some((constraint, _)) = wanted.iter().find(|w| taken.contains(*w)) {
                return Err(unique_violation(&E::SPEC, constraint));
            }
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, mut entity: E, now: DateTime<Utc>) -> AuthResult<E> {
        if entity.key().is_none() {
            self.next_serial += 1;
            entity.assign_key(self.next_serial);
        }
        let Some(key) = entity.key() else {
            return Err(AuthError::persistence(format!(
                "{}: row has no primary key",
                E::SPEC.table
            )));
        };
        if self.rows.contains_key(&key) {
            return Err(AuthError::persistence(format!(
                "{}: duplicate primary key {key:?}",
                E::SPEC.table
            )));
        }
        self.check_unique(&entity, None)?;

        entity.stamp(now, true);
        self.rows.insert(key, entity.clone());
        Ok(entity)
    }

    pub(crate) fn update(&mut self, mut entity: E, now: DateTime<Utc>) -> AuthResult<E> {
        let key = entity
            .key()
            .filter(|k| self.rows.contains_key(k))
            .ok_or_else(|| {
                AuthError::not_found(
                    E::SPEC.not_found_code,
                    format!("{}: no row to update", E::SPEC.table),
                )
            })?;
        self.check_unique(&entity, Some(&key))?;

        entity.stamp(now, false);
        self.rows.insert(key, entity.clone());
        Ok(entity)
    }

    pub(crate) fn delete(&mut self, entity: &E) {
        if let Some(key) = entity.key() {
            self.rows.remove(&key);
        }
    }

    /// Matching rows in primary-key order, before paging.
    pub(crate) fn select<'a, F>(&'a self, filter: &'a F) -> impl Iterator<Item = &'a E> + 'a
    where
        F: EntityFilter<E>,
    {
        self.rows.values().filter(move |e| filter.matches(e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

impl MemEntity for Admin {
    type Key = AdminId;
    const SPEC: StoreSpec = stores::ADMINS;

    fn key(&self) -> Option<AdminId> {
        Some(self.id)
    }

    fn assign_key(&mut self, _serial: i64) {}

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("admins_username_key", self.username.clone())]
    }

    fn stamp(&mut self, now: DateTime<Utc>, inserted: bool) {
        if inserted {
            self.created_at = now;
        }
        self.updated_at = now;
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.admins
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.admins
    }
}

impl MemEntity for Session {
    type Key = SessionId;
    const SPEC: StoreSpec = stores::SESSIONS;

    fn key(&self) -> Option<SessionId> {
        self.id
    }

    fn assign_key(&mut self, serial: i64) {
        self.id = Some(SessionId::new(serial));
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        let mut keys = vec![("sessions_refresh_token_key", self.refresh_token.clone())];
        if let Some(access) = &self.access_token {
            keys.push(("sessions_access_token_key", access.clone()));
        }
        keys
    }

    fn stamp(&mut self, now: DateTime<Utc>, inserted: bool) {
        if inserted {
            self.created_at = now;
        }
        self.updated_at = now;
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.sessions
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.sessions
    }
}

impl MemEntity for Role {
    type Key = RoleId;
    const SPEC: StoreSpec = stores::ROLES;

    fn key(&self) -> Option<RoleId> {
        self.id
    }

    fn assign_key(&mut self, serial: i64) {
        self.id = Some(RoleId::new(serial));
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![(
            "roles_actor_type_name_key",
            format!("{}\0{}", self.actor_type.as_str(), self.name),
        )]
    }

    fn stamp(&mut self, now: DateTime<Utc>, inserted: bool) {
        if inserted {
            self.created_at = now;
        }
        self.updated_at = now;
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.roles
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.roles
    }
}

impl MemEntity for RolePermission {
    type Key = i64;
    const SPEC: StoreSpec = stores::ROLE_PERMISSIONS;

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn assign_key(&mut self, serial: i64) {
        self.id = Some(serial);
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![(
            "role_permissions_role_id_permission_key",
            format!("{}\0{}", self.role_id, self.permission),
        )]
    }

    fn stamp(&mut self, now: DateTime<Utc>, inserted: bool) {
        if inserted {
            self.created_at = now;
        }
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.role_permissions
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.role_permissions
    }
}

impl MemEntity for ActorRole {
    type Key = i64;
    const SPEC: StoreSpec = stores::ACTOR_ROLES;

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn assign_key(&mut self, serial: i64) {
        self.id = Some(serial);
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![(
            "actor_roles_actor_type_actor_id_role_id_key",
            format!(
                "{}\0{}\0{}",
                self.actor_type.as_str(),
                self.actor_id.as_str(),
                self.role_id
            ),
        )]
    }

    fn stamp(&mut self, now: DateTime<Utc>, inserted: bool) {
        if inserted {
            self.created_at = now;
        }
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.actor_roles
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.actor_roles
    }
}

impl MemEntity for ActorPermission {
    type Key = i64;
    const SPEC: StoreSpec = stores::ACTOR_PERMISSIONS;

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn assign_key(&mut self, serial: i64) {
        self.id = Some(serial);
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![(
            "actor_permissions_actor_type_actor_id_permission_key",
            format!(
                "{}\0{}\0{}",
                self.actor_type.as_str(),
                self.actor_id.as_str(),
                self.permission
            ),
        )]
    }

    fn stamp(&mut self, now: DateTime<Utc>, inserted: bool) {
        if inserted {
            self.created_at = now;
        }
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.actor_permissions
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.actor_permissions
    }
}
