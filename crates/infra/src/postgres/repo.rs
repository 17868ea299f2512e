use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, instrument};

use warden_auth::{Admin, AdminFilter, AdminRepo, EntityFilter, Repo, Role, RoleRepo};
use warden_core::{AuthError, AuthResult};

use super::entities::{Builder, Key, PgEntity, Where};
use super::{PgScope, conn, map_sqlx_error};

/// Rows per multi-row `INSERT`; keeps bind parameters well under the
/// protocol limit of 65535.
const INSERT_CHUNK: usize = 1000;

/// Advisory-lock class for role names; the object key is `hashtext(name)`.
const ROLE_NAME_LOCK_CLASS: i32 = 0x726f_6c65;

/// Generic store over one table, bound to a Unit of Work transaction.
pub(crate) struct PgRepo<E> {
    scope: Arc<PgScope>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> PgRepo<E> {
    pub(crate) fn new(scope: Arc<PgScope>) -> Self {
        Self {
            scope,
            _entity: PhantomData,
        }
    }
}

/// Postgres takes `LIMIT`/`OFFSET` as `bigint`.
fn bind_count(what: &str, value: u64) -> AuthResult<i64> {
    i64::try_from(value)
        .map_err(|_| AuthError::validation(format!("{what} {value} is out of range")))
}

impl<E: PgEntity> PgRepo<E> {
    fn select(head: &str, filter: &E::Filter) -> Builder {
        let mut qb = Builder::new(format!("SELECT {head} FROM {}", E::SPEC.table));
        E::push_filter(filter, &mut Where::new(&mut qb));
        qb
    }

    fn paged(filter: &E::Filter, limit: u64, offset: u64) -> AuthResult<Builder> {
        let mut qb = Self::select(E::COLUMNS, filter);
        qb.push(" ORDER BY id");
        if limit > 0 {
            qb.push(" LIMIT ").push_bind(bind_count("limit", limit)?);
        }
        if offset > 0 {
            qb.push(" OFFSET ").push_bind(bind_count("offset", offset)?);
        }
        Ok(qb)
    }

    fn insert<'a>(rows: impl IntoIterator<Item = &'a E>) -> Builder {
        let mut qb = Builder::new(format!(
            "INSERT INTO {} ({}) ",
            E::SPEC.table,
            E::INSERT_COLUMNS
        ));
        qb.push_values(rows, |mut row, e| e.bind_insert(&mut row));
        qb
    }

    async fn fetch(&self, op: &str, mut qb: Builder) -> AuthResult<Vec<E>> {
        let mut slot = self.scope.lock().await?;
        let rows = qb
            .build()
            .fetch_all(conn(&mut slot)?)
            .await
            .map_err(|e| map_sqlx_error(&E::SPEC, op, e))?;
        rows.iter()
            .map(E::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(&E::SPEC, op, e))
    }

    async fn scalar_i64(&self, op: &str, mut qb: Builder) -> AuthResult<i64> {
        let mut slot = self.scope.lock().await?;
        let row = qb
            .build()
            .fetch_one(conn(&mut slot)?)
            .await
            .map_err(|e| map_sqlx_error(&E::SPEC, op, e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| map_sqlx_error(&E::SPEC, op, e))
    }

    async fn execute(&self, op: &str, mut qb: Builder) -> AuthResult<u64> {
        let mut slot = self.scope.lock().await?;
        let done = qb
            .build()
            .execute(conn(&mut slot)?)
            .await
            .map_err(|e| map_sqlx_error(&E::SPEC, op, e))?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl<E: PgEntity> Repo<E, E::Filter> for PgRepo<E> {
    async fn create(&self, entity: E) -> AuthResult<E> {
        let mut qb = Self::insert(std::iter::once(&entity));
        qb.push(format!(" RETURNING {}", E::COLUMNS));
        self.fetch("create", qb).await?.pop().ok_or_else(|| {
            AuthError::persistence(format!("{}: insert returned no row", E::SPEC.table))
        })
    }

    async fn update(&self, entity: E) -> AuthResult<E> {
        let Some(key) = entity.key() else {
            return Err(AuthError::not_found(
                E::SPEC.not_found_code,
                format!("{}: row has no key", E::SPEC.table),
            ));
        };
        let mut qb = Builder::new(format!("UPDATE {} SET ", E::SPEC.table));
        entity.push_assignments(&mut qb);
        qb.push(" WHERE ");
        key.push_eq(&mut qb);
        qb.push(format!(" RETURNING {}", E::COLUMNS));

        self.fetch("update", qb).await?.pop().ok_or_else(|| {
            AuthError::not_found(
                E::SPEC.not_found_code,
                format!("{}: no row to update", E::SPEC.table),
            )
        })
    }

    async fn delete(&self, entity: &E) -> AuthResult<()> {
        let Some(key) = entity.key() else {
            return Ok(());
        };
        let mut qb = Builder::new(format!("DELETE FROM {} WHERE ", E::SPEC.table));
        key.push_eq(&mut qb);
        self.execute("delete", qb).await.map(|_| ())
    }

    #[instrument(skip_all, fields(table = E::SPEC.table, rows = entities.len()), err)]
    async fn bulk_create(&self, entities: Vec<E>) -> AuthResult<()> {
        // One transaction already spans the chunks.
        for chunk in entities.chunks(INSERT_CHUNK) {
            self.execute("bulk_create", Self::insert(chunk)).await?;
        }
        Ok(())
    }

    async fn bulk_delete(&self, entities: &[E]) -> AuthResult<()> {
        let keys: Vec<Key> = entities.iter().filter_map(PgEntity::key).collect();
        if keys.is_empty() {
            return Ok(());
        }
        let mut qb = Builder::new(format!("DELETE FROM {} WHERE ", E::SPEC.table));
        Key::push_any(&keys, &mut qb);
        let removed = self.execute("bulk_delete", qb).await?;
        debug!(table = E::SPEC.table, removed, "bulk delete");
        Ok(())
    }

    async fn first_or_nil(&self, filter: &E::Filter) -> AuthResult<Option<E>> {
        let qb = Self::paged(filter, 1, filter.page().offset)?;
        Ok(self.fetch("first_or_nil", qb).await?.pop())
    }

    async fn list(&self, filter: &E::Filter) -> AuthResult<Vec<E>> {
        let page = filter.page();
        self.fetch("list", Self::paged(filter, page.limit, page.offset)?)
            .await
    }

    async fn list_with_count(&self, filter: &E::Filter) -> AuthResult<(Vec<E>, u64)> {
        let items = self.list(filter).await?;
        let total = self.count(filter).await?;
        Ok((items, total))
    }

    async fn exists(&self, filter: &E::Filter) -> AuthResult<bool> {
        let mut qb = Self::select("1", filter);
        qb.push(" LIMIT 1");
        let mut slot = self.scope.lock().await?;
        let row = qb
            .build()
            .fetch_optional(conn(&mut slot)?)
            .await
            .map_err(|e| map_sqlx_error(&E::SPEC, "exists", e))?;
        Ok(row.is_some())
    }

    async fn count(&self, filter: &E::Filter) -> AuthResult<u64> {
        let n = self
            .scalar_i64("count", Self::select("COUNT(*)", filter))
            .await?;
        Ok(n as u64)
    }
}

#[async_trait]
impl AdminRepo for PgRepo<Admin> {
    /// Locks every matching row (`FOR UPDATE`) until the transaction ends, so
    /// concurrent guards on the same rows serialise.
    async fn count_for_update(&self, filter: &AdminFilter) -> AuthResult<u64> {
        let mut qb = Self::select("id", filter);
        qb.push(" ORDER BY id FOR UPDATE");
        let mut slot = self.scope.lock().await?;
        let locked = qb
            .build()
            .fetch_all(conn(&mut slot)?)
            .await
            .map_err(|e| map_sqlx_error(&<Admin as PgEntity>::SPEC, "count_for_update", e))?;
        Ok(locked.len() as u64)
    }
}

#[async_trait]
impl RoleRepo for PgRepo<Role> {
    /// Transaction-scoped advisory lock. `roles` only constrains
    /// `(actor_type, name)`, so this is what keeps a global name check and the
    /// insert after it atomic under read committed.
    async fn lock_name(&self, name: &str) -> AuthResult<()> {
        let mut slot = self.scope.lock().await?;
        sqlx::query("SELECT 1 FROM pg_advisory_xact_lock($1, hashtext($2))")
            .bind(ROLE_NAME_LOCK_CLASS)
            .bind(name)
            .execute(conn(&mut slot)?)
            .await
            .map_err(|e| map_sqlx_error(&<Role as PgEntity>::SPEC, "lock_name", e))?;
        Ok(())
    }
}
