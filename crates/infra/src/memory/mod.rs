//! In-memory entity stores and Unit of Work.
//!
//! Intended for tests/dev. A Unit of Work holds the store lock for its whole
//! lifetime and works on a private copy of every table; applying swaps the copy
//! in, discarding (or dropping) throws it away. Scopes are therefore fully
//! serialised, which is stricter than any SQL isolation level.
//!
//! Like Postgres, a failed write aborts the scope: later operations fail and
//! the scope can only be rolled back.

mod entity;
mod repo;

use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use warden_auth::{
    ActorPermission, ActorPermissionFilter, ActorRole, ActorRoleFilter, Admin, AdminRepo, Repo,
    Role, RoleRepo, RolePermission, RolePermissionFilter, Session, SessionFilter, UnitOfWork,
    UowFactory,
};
use warden_core::{AuthError, AuthResult, ErrorKind, RequestContext, ResultExt};

use entity::Table;
use repo::MemRepo;

/// How often a caller waiting for the store lock re-checks its context.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Store operation, for fault injection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Update,
    Delete,
    BulkCreate,
    BulkDelete,
    Read,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(crate) admins: Table<Admin>,
    pub(crate) sessions: Table<Session>,
    pub(crate) roles: Table<Role>,
    pub(crate) role_permissions: Table<RolePermission>,
    pub(crate) actor_roles: Table<ActorRole>,
    pub(crate) actor_permissions: Table<ActorPermission>,
}

#[derive(Debug, Default)]
struct Faults {
    ops: Mutex<Vec<(&'static str, StoreOp)>>,
    commits: Mutex<usize>,
}

impl Faults {
    fn take(&self, table: &'static str, op: StoreOp) -> bool {
        let mut ops = lock(&self.ops);
        match ops.iter().position(|(t, o)| *t == table && *o == op) {
            Some(idx) => {
                ops.remove(idx);
                true
            }
            None => false,
        }
    }

    fn take_commit(&self) -> bool {
        let mut pending = lock(&self.commits);
        if *pending > 0 {
            *pending -= 1;
            true
        } else {
            false
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared in-memory database. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<tokio::sync::Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `op` on `table` fail with a persistence error.
    pub fn fail_next(&self, table: &'static str, op: StoreOp) {
        lock(&self.faults.ops).push((table, op));
    }

    /// Make the next `apply_changes` fail with a persistence error.
    pub fn fail_next_commit(&self) {
        *lock(&self.faults.commits) += 1;
    }

    /// Wait for the store lock until `ctx` is cancelled or its deadline passes.
    async fn acquire(&self, ctx: &RequestContext) -> AuthResult<OwnedMutexGuard<Tables>> {
        let mut acquire = pin!(self.tables.clone().lock_owned());
        loop {
            let tick = ctx.remaining().map_or(CANCEL_POLL, |r| r.min(CANCEL_POLL));
            tokio::select! {
                biased;
                guard = &mut acquire => return Ok(guard),
                _ = tokio::time::sleep(tick) => {
                    ctx.ensure_active().context("wait for store lock")?;
                }
            }
        }
    }
}

#[async_trait]
impl UowFactory for InMemoryStore {
    async fn new_uow(&self, ctx: &RequestContext) -> AuthResult<Box<dyn UnitOfWork>> {
        ctx.ensure_active()?;

        let guard = self.acquire(ctx).await?;
        let working = (*guard).clone();
        let scope = Arc::new(Scope {
            ctx: ctx.clone(),
            faults: self.faults.clone(),
            state: Mutex::new(ScopeState {
                guard: Some(guard),
                working,
                aborted: false,
            }),
        });
        Ok(Box::new(MemUnitOfWork::new(scope)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

struct ScopeState {
    /// `None` once applied or discarded.
    guard: Option<OwnedMutexGuard<Tables>>,
    working: Tables,
    aborted: bool,
}

pub(crate) struct Scope {
    ctx: RequestContext,
    faults: Arc<Faults>,
    state: Mutex<ScopeState>,
}

impl Scope {
    /// Run `f` against the working copy of the tables.
    pub(crate) fn with<R>(
        &self,
        table: &'static str,
        op: StoreOp,
        f: impl FnOnce(&mut Tables) -> AuthResult<R>,
    ) -> AuthResult<R> {
        self.ctx.ensure_active()?;

        let mut state = lock(&self.state);
        if state.guard.is_none() {
            return Err(AuthError::persistence("unit of work already finished"));
        }
        if state.aborted {
            return Err(AuthError::persistence(
                "transaction aborted; only rollback is possible",
            ));
        }
        if self.faults.take(table, op) {
            state.aborted = true;
            return Err(AuthError::persistence(format!(
                "injected {op:?} failure on {table}"
            )));
        }

        let result = f(&mut state.working);
        if let Err(err) = &result {
            if matches!(err.kind(), ErrorKind::Conflict | ErrorKind::Persistence) {
                state.aborted = true;
            }
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of Work
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct MemUnitOfWork {
    scope: Arc<Scope>,
    admins: MemRepo<Admin>,
    sessions: MemRepo<Session>,
    roles: MemRepo<Role>,
    role_permissions: MemRepo<RolePermission>,
    actor_roles: MemRepo<ActorRole>,
    actor_permissions: MemRepo<ActorPermission>,
}

impl MemUnitOfWork {
    fn new(scope: Arc<Scope>) -> Self {
        Self {
            admins: MemRepo::new(scope.clone()),
            sessions: MemRepo::new(scope.clone()),
            roles: MemRepo::new(scope.clone()),
            role_permissions: MemRepo::new(scope.clone()),
            actor_roles: MemRepo::new(scope.clone()),
            actor_permissions: MemRepo::new(scope.clone()),
            scope,
        }
    }
}

#[async_trait]
impl UnitOfWork for MemUnitOfWork {
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
        let mut state = lock(&self.scope.state);
        let Some(mut guard) = state.guard.take() else {
            return Err(AuthError::persistence("unit of work already finished"));
        };

        // Every early return below drops `guard`, which rolls back.
        self.scope.ctx.ensure_active()?;
        if state.aborted {
            return Err(AuthError::persistence(
                "transaction aborted by an earlier failure; rolled back",
            ));
        }
        if self.scope.faults.take_commit() {
            return Err(AuthError::persistence("injected commit failure"));
        }

        *guard = std::mem::take(&mut state.working);
        Ok(())
    }

    async fn discard_unapplied(&mut self) {
        let mut state = lock(&self.scope.state);
        match state.guard.take() {
            Some(_) => {
                if state.aborted {
                    warn!("rolled back aborted unit of work");
                } else {
                    debug!("rolled back unit of work");
                }
            }
            None => warn!("discard after the unit of work finished; nothing to roll back"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::AdminFilter;

    fn admin(name: &str) -> Admin {
        Admin::new(name, "hash", false)
    }

    async fn admin_count(store: &InMemoryStore) -> u64 {
        let ctx = RequestContext::background();
        let mut uow = store.new_uow(&ctx).await.unwrap();
        let n = uow.admins().count(&AdminFilter::default()).await.unwrap();
        uow.discard_unapplied().await;
        n
    }

    #[tokio::test]
    async fn apply_publishes_and_drop_rolls_back() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();

        let mut uow = store.new_uow(&ctx).await.unwrap();
        uow.admins().create(admin("ann")).await.unwrap();
        uow.apply_changes().await.unwrap();
        uow.discard_unapplied().await;
        drop(uow);

        let uow = store.new_uow(&ctx).await.unwrap();
        uow.admins().create(admin("ben")).await.unwrap();
        drop(uow);

        assert_eq!(admin_count(&store).await, 1);
    }

    #[tokio::test]
    async fn conflict_aborts_the_scope() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();

        let mut uow = store.new_uow(&ctx).await.unwrap();
        uow.admins().create(admin("ann")).await.unwrap();
        let err = uow.admins().create(admin("ann")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = uow.admins().count(&AdminFilter::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(uow.apply_changes().await.is_err());
        drop(uow);

        assert_eq!(admin_count(&store).await, 0);
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();
        store.fail_next("admins", StoreOp::Create);

        let uow = store.new_uow(&ctx).await.unwrap();
        assert!(uow.admins().create(admin("ann")).await.is_err());
        drop(uow);

        let mut uow = store.new_uow(&ctx).await.unwrap();
        uow.admins().create(admin("ann")).await.unwrap();
        uow.apply_changes().await.unwrap();
        assert_eq!(admin_count(&store).await, 1);
    }

    #[tokio::test]
    async fn cancelled_scope_cannot_commit() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();

        let mut uow = store.new_uow(&ctx).await.unwrap();
        uow.admins().create(admin("ann")).await.unwrap();
        ctx.cancel();
        let err = uow.apply_changes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        drop(uow);

        assert_eq!(admin_count(&store).await, 0);
    }

    #[tokio::test]
    async fn waiting_for_a_busy_store_honours_the_deadline() {
        let store = InMemoryStore::new();
        let held = store.new_uow(&RequestContext::background()).await.unwrap();

        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let err = store.new_uow(&ctx).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        drop(held);
        assert!(store.new_uow(&RequestContext::background()).await.is_ok());
    }

    #[tokio::test]
    async fn waiting_for_a_busy_store_stops_on_cancel() {
        let store = InMemoryStore::new();
        let held = store.new_uow(&RequestContext::background()).await.unwrap();

        let ctx = RequestContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let waited = tokio::time::timeout(Duration::from_secs(5), store.new_uow(&ctx))
            .await
            .expect("cancel wakes the waiter");
        assert_eq!(waited.err().unwrap().kind(), ErrorKind::Cancelled);
        drop(held);
    }

    #[tokio::test]
    async fn role_name_lock_follows_the_scope() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();

        let uow = store.new_uow(&ctx).await.unwrap();
        uow.roles().lock_name("ops").await.unwrap();
        ctx.cancel();
        let err = uow.roles().lock_name("ops").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
