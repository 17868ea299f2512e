//! Postgres-backed stores and Unit of Work.
//!
//! One Unit of Work is one database transaction. Every store handed out by a
//! Unit of Work runs its statements on that transaction; nothing is visible to
//! other connections until `apply_changes` commits.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | AuthError |
//! |---|---|---|
//! | Database (unique violation) | `23505` | `Conflict`, code from the store's constraint map |
//! | Database (query canceled) | `57014` | `Cancelled` (statement timeout from the request deadline) |
//! | Anything else | any | `Persistence`, with the SQLx error as source |

mod entities;
mod repo;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, field, instrument, warn, Span};

use warden_auth::{
    ActorPermission, ActorPermissionFilter, ActorRole, ActorRoleFilter, Admin, AdminRepo, Repo,
    Role, RoleRepo, RolePermission, RolePermissionFilter, Session, SessionFilter, StoreSpec,
    UnitOfWork, UowFactory,
};
use warden_core::{AuthError, AuthResult, RequestContext};

use crate::config::Config;
use crate::stores::unique_violation;
use repo::PgRepo;

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Opens one transaction per Unit of Work.
#[derive(Debug, Clone)]
pub struct PgUowFactory {
    pool: PgPool,
}

impl PgUowFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let url = config.require_database_url()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> AuthResult<()> {
        MIGRATOR.run(&self.pool).await.map_err(|e| {
            AuthError::persistence("schema migration failed").with_source(e)
        })
    }
}

#[async_trait]
impl UowFactory for PgUowFactory {
    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id(), timeout_ms = field::Empty), err)]
    async fn new_uow(&self, ctx: &RequestContext) -> AuthResult<Box<dyn UnitOfWork>> {
        ctx.ensure_active()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_tx_error("begin", e))?;

        if let Some(remaining) = ctx.remaining() {
            // SET does not take bind parameters; the value is an integer we format.
            let ms = remaining.as_millis().max(1);
            Span::current().record("timeout_ms", ms as u64);
            sqlx::query(&format!("SET LOCAL statement_timeout = {ms}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_tx_error("set statement_timeout", e))?;
        }

        let scope = Arc::new(PgScope {
            ctx: ctx.clone(),
            tx: Mutex::new(Some(tx)),
        });
        Ok(Box::new(PgUnitOfWork::new(scope)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

type TxSlot = Option<Transaction<'static, Postgres>>;

pub(crate) struct PgScope {
    ctx: RequestContext,
    /// `None` once committed or rolled back.
    tx: Mutex<TxSlot>,
}

impl PgScope {
    /// Lock the transaction for one statement.
    pub(crate) async fn lock(&self) -> AuthResult<MutexGuard<'_, TxSlot>> {
        self.ctx.ensure_active()?;
        Ok(self.tx.lock().await)
    }
}

pub(crate) fn conn(slot: &mut TxSlot) -> AuthResult<&mut PgConnection> {
    slot.as_deref_mut()
        .ok_or_else(|| AuthError::persistence("unit of work already finished"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of Work
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct PgUnitOfWork {
    scope: Arc<PgScope>,
    admins: PgRepo<Admin>,
    sessions: PgRepo<Session>,
    roles: PgRepo<Role>,
    role_permissions: PgRepo<RolePermission>,
    actor_roles: PgRepo<ActorRole>,
    actor_permissions: PgRepo<ActorPermission>,
}

impl PgUnitOfWork {
    fn new(scope: Arc<PgScope>) -> Self {
        Self {
            admins: PgRepo::new(scope.clone()),
            sessions: PgRepo::new(scope.clone()),
            roles: PgRepo::new(scope.clone()),
            role_permissions: PgRepo::new(scope.clone()),
            actor_roles: PgRepo::new(scope.clone()),
            actor_permissions: PgRepo::new(scope.clone()),
            scope,
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn admins(&self) -> &dyn AdminRepo {
        &self.admins
    }

    fn sessions(&self) -> &dyn Repo<Session, SessionFilter> {
        &self.sessions
    }

    fn roles(&self) -> &dyn RoleRepo {
        &self.roles
    }

    fn role_permissions(&self) -> &dyn Repo<RolePermission, RolePermissionFilter> {
        &self.role_permissions
    }

    fn actor_roles(&self) -> &dyn Repo<ActorRole, ActorRoleFilter> {
        &self.actor_roles
    }

    fn actor_permissions(&self) -> &dyn Repo<ActorPermission, ActorPermissionFilter> {
        &self.actor_permissions
    }

    async fn apply_changes(&mut self) -> AuthResult<()> {
        let Some(tx) = self.scope.tx.lock().await.take() else {
            return Err(AuthError::persistence("unit of work already finished"));
        };

        if let Err(err) = self.scope.ctx.ensure_active() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "rollback after cancellation failed");
            }
            return Err(err);
        }

        tx.commit().await.map_err(|e| map_tx_error("commit", e))
    }

    async fn discard_unapplied(&mut self) {
        let Some(tx) = self.scope.tx.lock().await.take() else {
            warn!("discard after the unit of work finished; nothing to roll back");
            return;
        };
        match tx.rollback().await {
            Ok(()) => debug!("rolled back unit of work"),
            Err(e) => warn!(error = %e, "rollback failed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn map_sqlx_error(spec: &StoreSpec, operation: &str, err: sqlx::Error) -> AuthError {
    let (state, constraint) = match &err {
        sqlx::Error::Database(db_err) => (
            db_err.code().map(|c| c.into_owned()),
            db_err.constraint().map(str::to_owned),
        ),
        _ => (None, None),
    };

    match (state.as_deref(), constraint) {
        (Some("23505"), Some(constraint)) => unique_violation(spec, &constraint),
        (Some("57014"), _) => AuthError::cancelled(format!("{} {operation} cancelled", spec.table)),
        _ => AuthError::persistence(format!("{} {operation} failed", spec.table)).with_source(err),
    }
}

fn map_tx_error(operation: &str, err: sqlx::Error) -> AuthError {
    let state = match &err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    };

    if state.as_deref() == Some("57014") {
        return AuthError::cancelled(format!("{operation} cancelled"));
    }
    AuthError::persistence(format!("transaction {operation} failed")).with_source(err)
}
