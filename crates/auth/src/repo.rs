//! Generic filtered-repository contract implemented by every entity store.
//!
//! A store is parameterised by an entity type `E` and a filter type `F`. Filters
//! are query specifications: each populated field is a predicate, and all
//! populated predicates are ANDed. Store instances are obtained from a
//! [`UnitOfWork`](crate::UnitOfWork) and are bound to its transaction.

use async_trait::async_trait;

use warden_core::AuthResult;

use crate::admin::AdminFilter;
use crate::rbac::RoleFilter;
use crate::{Admin, Role};

/// Limit/offset window. Zero means unbounded / no offset.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    pub const UNBOUNDED: Page = Page { limit: 0, offset: 0 };

    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }

    /// Apply the window to an already-filtered iterator.
    pub fn slice<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let iter = items.into_iter().skip(skip);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(usize::try_from(self.limit).unwrap_or(usize::MAX)).collect()
        }
    }
}

/// In-process predicate form of a filter.
///
/// Stores that cannot push filters down to an engine (the in-memory store) use
/// this to evaluate them.
pub trait EntityFilter<E>: Send + Sync {
    fn matches(&self, entity: &E) -> bool;

    fn page(&self) -> Page;
}

/// Static description of one concrete store.
///
/// The constraint map is the only place engine-specific names leak into the
/// contract.
#[derive(Debug, Clone, Copy)]
pub struct StoreSpec {
    /// Storage location (table).
    pub table: &'static str,
    /// Code used when `update` finds no row.
    pub not_found_code: &'static str,
    /// Unique-constraint name -> domain conflict code.
    pub conflicts: &'static [(&'static str, &'static str)],
}

impl StoreSpec {
    pub fn conflict_code(&self, constraint: &str) -> Option<&'static str> {
        self.conflicts
            .iter()
            .find(|(name, _)| *name == constraint)
            .map(|(_, code)| *code)
    }
}

#[async_trait]
pub trait Repo<E, F>: Send + Sync
where
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    /// Insert and return the stored row (with generated keys and timestamps).
    ///
    /// Unique violations surface as `Conflict` with the store's mapped code.
    async fn create(&self, entity: E) -> AuthResult<E>;

    /// Full-row replace by primary key; `NotFound` if the row is gone.
    async fn update(&self, entity: E) -> AuthResult<E>;

    /// Delete the given row. Deleting an absent row is not an error.
    async fn delete(&self, entity: &E) -> AuthResult<()>;

    async fn bulk_create(&self, entities: Vec<E>) -> AuthResult<()>;

    async fn bulk_delete(&self, entities: &[E]) -> AuthResult<()>;

    /// First match or `None`. Absence is never an error at this layer.
    async fn first_or_nil(&self, filter: &F) -> AuthResult<Option<E>>;

    async fn list(&self, filter: &F) -> AuthResult<Vec<E>>;

    /// Page of matches plus the total ignoring the page window.
    async fn list_with_count(&self, filter: &F) -> AuthResult<(Vec<E>, u64)>;

    async fn exists(&self, filter: &F) -> AuthResult<bool>;

    async fn count(&self, filter: &F) -> AuthResult<u64>;
}

/// Admin store: the generic contract plus a locking count.
#[async_trait]
pub trait AdminRepo: Repo<Admin, AdminFilter> {
    /// Count matching rows while holding a write lock on them until the
    /// enclosing Unit of Work ends. Guards that count-then-mutate use this.
    async fn count_for_update(&self, filter: &AdminFilter) -> AuthResult<u64>;
}

/// Role store: the generic contract plus a per-name write lock.
#[async_trait]
pub trait RoleRepo: Repo<Role, RoleFilter> {
    /// Hold an exclusive lock on `name` until the enclosing Unit of Work ends.
    /// A name check that runs after this cannot race another scope holding the
    /// same lock.
    async fn lock_name(&self, name: &str) -> AuthResult<()>;
}
