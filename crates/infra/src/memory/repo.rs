use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use warden_auth::{Admin, AdminFilter, AdminRepo, EntityFilter, Page, Repo, Role, RoleRepo};
use warden_core::AuthResult;

use super::entity::MemEntity;
use super::{Scope, StoreOp};

/// Generic store over one in-memory table, bound to a Unit of Work scope.
pub(crate) struct MemRepo<E> {
    scope: Arc<Scope>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> MemRepo<E> {
    pub(crate) fn new(scope: Arc<Scope>) -> Self {
        Self {
            scope,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F> Repo<E, F> for MemRepo<E>
where
    E: MemEntity,
    F: EntityFilter<E> + 'static,
{
    async fn create(&self, entity: E) -> AuthResult<E> {
        self.scope.with(E::SPEC.table, StoreOp::Create, |tables| {
            E::table_mut(tables).insert(entity, Utc::now())
        })
    }

    async fn update(&self, entity: E) -> AuthResult<E> {
        self.scope.with(E::SPEC.table, StoreOp::Update, |tables| {
            E::table_mut(tables).update(entity, Utc::now())
        })
    }

    async fn delete(&self, entity: &E) -> AuthResult<()> {
        self.scope.with(E::SPEC.table, StoreOp::Delete, |tables| {
            E::table_mut(tables).delete(entity);
            Ok(())
        })
    }

    async fn bulk_create(&self, entities: Vec<E>) -> AuthResult<()> {
        self.scope.with(E::SPEC.table, StoreOp::BulkCreate, |tables| {
            // All or nothing: stage on a copy, swap in on success.
            let now = Utc::now();
            let mut staged = E::table(tables).clone();
            for entity in entities {
                staged.insert(entity, now)?;
            }
            *E::table_mut(tables) = staged;
            Ok(())
        })
    }

    async fn bulk_delete(&self, entities: &[E]) -> AuthResult<()> {
        self.scope.with(E::SPEC.table, StoreOp::BulkDelete, |tables| {
            let table = E::table_mut(tables);
            for entity in entities {
                table.delete(entity);
            }
            Ok(())
        })
    }

    async fn first_or_nil(&self, filter: &F) -> AuthResult<Option<E>> {
        self.scope.with(E::SPEC.table, StoreOp::Read, |tables| {
            let window = Page::new(1, filter.page().offset);
            Ok(window.slice(E::table(tables).select(filter).cloned()).pop())
        })
    }

    async fn list(&self, filter: &F) -> AuthResult<Vec<E>> {
        self.scope.with(E::SPEC.table, StoreOp::Read, |tables| {
            Ok(filter.page().slice(E::table(tables).select(filter).cloned()))
        })
    }

    async fn list_with_count(&self, filter: &F) -> AuthResult<(Vec<E>, u64)> {
        self.scope.with(E::SPEC.table, StoreOp::Read, |tables| {
            let all: Vec<E> = E::table(tables).select(filter).cloned().collect();
            let total = all.len() as u64;
            Ok((filter.page().slice(all), total))
        })
    }

    async fn exists(&self, filter: &F) -> AuthResult<bool> {
        self.scope.with(E::SPEC.table, StoreOp::Read, |tables| {
            Ok(E::table(tables).select(filter).next().is_some())
        })
    }

    async fn count(&self, filter: &F) -> AuthResult<u64> {
        self.scope.with(E::SPEC.table, StoreOp::Read, |tables| {
            Ok(E::table(tables).select(filter).count() as u64)
        })
    }
}

#[async_trait]
impl AdminRepo for MemRepo<Admin> {
    /// The scope already holds the store lock, so a plain count is stable
    /// until the Unit of Work ends.
    async fn count_for_update(&self, filter: &AdminFilter) -> AuthResult<u64> {
        <Self as Repo<Admin, AdminFilter>>::count(self, filter).await
    }
}

#[async_trait]
impl RoleRepo for MemRepo<Role> {
    /// Scopes are already serialised by the store lock; this only checks that
    /// the scope can still do work.
    async fn lock_name(&self, _name: &str) -> AuthResult<()> {
        self.scope.with(<Role as MemEntity>::SPEC.table, StoreOp::Read, |_| Ok(()))
    }
}
