//! Read and Write Accessors
//!
//! A computation learns its dependencies by reading through a [`Getter`].
//! The getter is created for a single invocation of a read function, bound
//! to the scope that invocation runs in, and records every entry it touches
//! together with the version it saw. There is no ambient tracking state: a
//! read function can only depend on what it reads through its own getter.
//!
//! Write functions receive a [`Setter`] bound to the writer's scope. Every
//! `set` is a complete store write, fully propagated before it returns.

use smallvec::SmallVec;

use super::cell::{Cell, CellValue, Update};
use super::loadable::Loadable;
use super::scope::Scope;
use super::store::Store;
use crate::error::CellError;
use crate::graph::{Dependencies, EntryKey};

/// Dependency-tracking reader handed to read functions.
pub struct Getter<'a> {
    store: &'a Store,
    scope: Scope,
    dependencies: Dependencies,
}

impl<'a> Getter<'a> {
    pub(crate) fn new(store: &'a Store, scope: Scope) -> Self {
        Self {
            store,
            scope,
            dependencies: SmallVec::new(),
        }
    }

    /// Read `cell` in this computation's scope and record the dependency.
    ///
    /// A pending dependency yields [`CellError::Pending`]; propagate it with
    /// `?` and the reading cell becomes pending until the dependency settles.
    pub fn get<T: CellValue>(&mut self, cell: &Cell<T>) -> Result<T, CellError> {
        let (snapshot, version) = self.store.resolve(cell.def(), self.scope);
        let key = EntryKey::new(cell.id(), self.scope);
        if !self.dependencies.iter().any(|(dep, _)| *dep == key) {
            self.dependencies.push((key, version));
        }
        snapshot.into_value(cell.id())
    }

    /// The scope this getter reads in.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Number of distinct entries read so far.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    pub(crate) fn into_dependencies(self) -> Dependencies {
        self.dependencies
    }
}

/// Writer handed to write functions.
pub struct Setter<'a> {
    store: &'a Store,
    scope: Scope,
}

impl<'a> Setter<'a> {
    pub(crate) fn new(store: &'a Store, scope: Scope) -> Self {
        Self { store, scope }
    }

    /// Read `cell` without recording a dependency.
    pub fn get<T: CellValue>(&self, cell: &Cell<T>) -> Result<T, CellError> {
        self.store.get(cell, self.scope)
    }

    /// Read `cell` as a [`Loadable`], so a pending value can be told apart
    /// from a failure.
    pub fn read<T: CellValue>(&self, cell: &Cell<T>) -> Loadable<T> {
        self.store.read(cell, self.scope)
    }

    /// Write `cell` in this scope.
    pub fn set<T: CellValue>(
        &self,
        cell: &Cell<T>,
        update: impl Into<Update<T>>,
    ) -> Result<(), CellError> {
        self.store.write(cell, self.scope, update)
    }

    /// Queue `run` until `cell` settles in this scope.
    ///
    /// Queued writes replay in the order they were deferred. A queued write
    /// is dropped as stale if an external write invalidates `cell` first.
    pub fn defer<T, F>(&self, cell: &Cell<T>, run: F)
    where
        T: CellValue,
        F: FnOnce(&Setter<'_>) -> Result<(), CellError> + Send + 'static,
    {
        self.store
            .defer(EntryKey::new(cell.id(), self.scope), Box::new(run));
    }

    /// The scope this setter writes in.
    pub fn scope(&self) -> Scope {
        self.scope
    }
}
