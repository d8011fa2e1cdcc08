//! The Store
//!
//! The store is the single source of truth for "what is the value of cell X
//! under scope Y". It owns the value table, discovers dependency edges while
//! computing derived cells, and propagates invalidation when something is
//! written or a pending computation settles.
//!
//! # How It Works
//!
//! 1. `read` looks up the (cell, scope) entry. A clean entry is returned
//!    from cache. A "maybe dirty" entry first re-validates the versions of
//!    the dependencies it saw last time and recomputes only if one moved.
//!
//! 2. Computing a derived cell runs its read function with a fresh
//!    [`Getter`], which resolves upstream entries (recursively, bottom-up)
//!    and records them as this entry's dependencies.
//!
//! 3. A read function may return a future. The store polls it once; if it
//!    is not done the entry becomes pending and the future is kept in
//!    flight until [`Store::settle`] drives it to completion. A newer
//!    computation of the same entry supersedes it and its result is
//!    discarded.
//!
//! 4. `write` to a primitive cell replaces its value, marks transitive
//!    dependents "maybe dirty", re-validates the subscribed ones in
//!    topological order, and notifies listeners whose entry changed. A
//!    write to a derived cell runs its write function, which issues its own
//!    upstream writes.
//!
//! # Locking
//!
//! The table sits behind a single mutex. The lock is never held while user
//! code runs (read and write functions, updaters, futures, listeners), so
//! all of them may use the store freely. The store is meant to be driven
//! from one logical context at a time; the lock makes it shareable, not
//! concurrent.

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{poll_fn, BoxFuture};
use futures_util::task::noop_waker_ref;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::cell::{Cell, CellDef, CellKind, CellValue, Computed, ReadFn, Update, Value};
use super::context::{Getter, Setter};
use super::loadable::Loadable;
use super::scope::Scope;
use super::subscriber::{SubscriberId, Subscription};
use crate::error::CellError;
use crate::graph::{
    DirtyState, EntryKey, Invalidation, Listener, Node, Slot, Snapshot, UpdateScheduler,
};

pub(crate) type DeferredRun = Box<dyn FnOnce(&Setter<'_>) -> Result<(), CellError> + Send>;

/// A computation waiting on its future.
struct InFlight {
    key: EntryKey,
    generation: u64,
    future: BoxFuture<'static, Result<Value, CellError>>,
}

/// A write queued until its target settles.
struct DeferredWrite {
    base: EntryKey,
    write_epoch: u64,
    run: DeferredRun,
}

/// Everything behind the store's lock.
pub(crate) struct StoreState {
    pub(crate) graph: UpdateScheduler,
    in_flight: Vec<InFlight>,
    deferred: VecDeque<DeferredWrite>,
    computing: HashSet<EntryKey>,
    validating: HashSet<EntryKey>,
    replaying: bool,
}

impl StoreState {
    fn new() -> Self {
        Self {
            graph: UpdateScheduler::new(),
            in_flight: Vec::new(),
            deferred: VecDeque::new(),
            computing: HashSet::new(),
            validating: HashSet::new(),
            replaying: false,
        }
    }
}

/// A store flag raised while user code runs.
#[derive(Clone, Copy)]
enum Mark {
    Computing(EntryKey),
    Validating(EntryKey),
    Replaying,
}

/// Guard that lowers a [`Mark`] when dropped.
///
/// This keeps the flags consistent even if a read function, an updater or
/// a queued write panics.
struct MarkGuard<'a> {
    state: &'a Mutex<StoreState>,
    mark: Mark,
}

impl Drop for MarkGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        match self.mark {
            Mark::Computing(key) => {
                state.computing.remove(&key);
            }
            Mark::Validating(key) => {
                state.validating.remove(&key);
            }
            Mark::Replaying => state.replaying = false,
        }
    }
}

enum Outcome {
    Settled(Result<Value, CellError>),
    InFlight(BoxFuture<'static, Result<Value, CellError>>),
}

/// Registry and scheduler for cell values.
///
/// Cloning a store yields another handle to the same table.
///
/// # Example
///
/// ```rust
/// use focal_core::{focus, Cell, Scope, Store, Update};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Big { a: i32 }
///
/// let big = Cell::new(Big { a: 0 });
/// let a = focus(&big, |o| o.lens(|s: &Big| s.a, |_, a| Big { a }));
///
/// let store = Store::new();
/// store.write(&a, Scope::GLOBAL, Update::apply(|n: &i32| n + 1)).unwrap();
/// assert_eq!(store.get(&big, Scope::GLOBAL).unwrap(), Big { a: 1 });
/// ```
#[derive(Clone)]
pub struct Store {
    state: Arc<Mutex<StoreState>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::new())),
        }
    }

    /// Read `cell` under `scope`.
    pub fn read<T: CellValue>(&self, cell: &Cell<T>, scope: Scope) -> Loadable<T> {
        self.get(cell, scope).into()
    }

    /// Read `cell` under `scope`, reporting a pending value as
    /// [`CellError::Pending`].
    pub fn get<T: CellValue>(&self, cell: &Cell<T>, scope: Scope) -> Result<T, CellError> {
        let (snapshot, _) = self.resolve(cell.def(), scope);
        snapshot.into_value(cell.id())
    }

    /// Write `cell` under `scope`.
    ///
    /// A primitive cell stores the new value; a derived cell runs its write
    /// function. All resulting invalidation is propagated before this
    /// returns. A failed write leaves the cached value as it was.
    pub fn write<T: CellValue>(
        &self,
        cell: &Cell<T>,
        scope: Scope,
        update: impl Into<Update<T>>,
    ) -> Result<(), CellError> {
        self.write_erased(cell.def(), scope, Box::new(update.into()))
    }

    /// Write `f(current)` to `cell` under `scope`.
    pub fn update<T, F>(&self, cell: &Cell<T>, scope: Scope, f: F) -> Result<(), CellError>
    where
        T: CellValue,
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.write(cell, scope, Update::apply(f))
    }

    /// Call `listener` whenever the entry for `cell` under `scope` changes.
    ///
    /// Subscribing mounts the entry: it is computed now and re-validated
    /// eagerly after every propagation pass that reaches it.
    pub fn subscribe<T, F>(&self, cell: &Cell<T>, scope: Scope, listener: F) -> Subscription
    where
        T: CellValue,
        F: Fn() + Send + Sync + 'static,
    {
        let key = EntryKey::new(cell.id(), scope);
        self.resolve(cell.def(), scope);

        let id = SubscriberId::new();
        let listener: Listener = Arc::new(listener);
        self.state
            .lock()
            .graph
            .entry(key, cell.def())
            .add_listener(id, listener);
        debug!(entry = %key, subscriber = ?id, "subscribed");

        Subscription::new(id, key, Arc::downgrade(&self.state))
    }

    /// Drive in-flight computations until none remain.
    pub async fn settle(&self) {
        poll_fn(|cx| self.poll_settle(cx)).await
    }

    /// Poll every in-flight computation once, committing those that finish.
    ///
    /// Returns `Ready` when nothing is left in flight.
    pub fn poll_settle(&self, cx: &mut Context<'_>) -> Poll<()> {
        loop {
            let mut in_flight = std::mem::take(&mut self.state.lock().in_flight);
            if in_flight.is_empty() {
                return Poll::Ready(());
            }

            let mut settled = Vec::new();
            in_flight.retain_mut(|flight| match flight.future.as_mut().poll(cx) {
                Poll::Ready(result) => {
                    settled.push((flight.key, flight.generation, result));
                    false
                }
                Poll::Pending => true,
            });

            {
                let mut state = self.state.lock();
                in_flight.append(&mut state.in_flight);
                state.in_flight = in_flight;
            }

            if settled.is_empty() {
                return Poll::Pending;
            }
            for (key, generation, result) in settled {
                self.commit_settled(key, generation, result);
            }
        }
    }

    /// Number of computations still in flight.
    pub fn pending_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Whether no computation is in flight.
    pub fn is_settled(&self) -> bool {
        self.pending_count() == 0
    }

    /// Number of live (cell, scope) entries.
    pub fn entry_count(&self) -> usize {
        self.state.lock().graph.node_count()
    }

    /// Freshness of the entry for `cell` under `scope`, if it exists.
    pub fn dirty_state<T>(&self, cell: &Cell<T>, scope: Scope) -> Option<DirtyState> {
        self.state
            .lock()
            .graph
            .get_node(EntryKey::new(cell.id(), scope))
            .map(Node::dirty_state)
    }

    /// Drop the entry for `cell` under `scope`.
    ///
    /// Its in-flight computation and any writes deferred on it are discarded;
    /// dependents recompute on their next read.
    pub fn dispose<T>(&self, cell: &Cell<T>, scope: Scope) {
        let key = EntryKey::new(cell.id(), scope);
        self.remove_where(|k| *k == key, |graph| graph.remove_node(key).into_iter().collect());
        debug!(entry = %key, "entry disposed");
    }

    /// Tear down every entry in `scope`.
    pub fn dispose_scope(&self, scope: Scope) {
        self.remove_where(|k| k.scope == scope, |graph| graph.remove_scope(scope));
        debug!(%scope, "scope disposed");
    }

    /// A view of this store bound to one scope.
    pub fn scoped(&self, scope: Scope) -> ScopedStore<'_> {
        ScopedStore { store: self, scope }
    }

    fn remove_where<P, R>(&self, matches: P, remove: R)
    where
        P: Fn(&EntryKey) -> bool,
        R: FnOnce(&mut UpdateScheduler) -> Vec<Node>,
    {
        // Dropped after the lock is released: nodes own listeners and
        // in-flight futures own arbitrary captures.
        let (nodes, flights, deferred) = {
            let mut state = self.state.lock();
            let nodes = remove(&mut state.graph);
            let (flights, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.in_flight)
                .into_iter()
                .partition(|flight| matches(&flight.key));
            state.in_flight = kept;
            let (deferred, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.deferred)
                .into_iter()
                .partition(|write| matches(&write.base));
            state.deferred = kept;
            (nodes, flights, deferred)
        };
        trace!(
            nodes = nodes.len(),
            in_flight = flights.len(),
            deferred = deferred.len(),
            "entries removed"
        );
    }

    /// Resolve the entry for `def` under `scope`, computing it if needed.
    ///
    /// Returns what a reader observes and the entry's version.
    pub(crate) fn resolve(&self, def: &Arc<CellDef>, scope: Scope) -> (Snapshot, u64) {
        let key = EntryKey::new(def.id, scope);

        let recorded = {
            let mut state = self.state.lock();
            let node = state.graph.entry(key, def);
            let recorded = match node.dirty_state() {
                DirtyState::Clean => return (node.snapshot(), node.version()),
                DirtyState::MaybeDirty => Some(node.dependencies().clone()),
                DirtyState::Dirty => None,
            };
            // Re-entering a validation means a dependency cycle; recompute
            // and let the cycle guard report it.
            recorded.filter(|_| state.validating.insert(key))
        };

        if let Some(recorded) = recorded {
            let validating = self.guard(Mark::Validating(key));
            let changed = self.dependencies_changed(&recorded);
            drop(validating);
            if !changed {
                let mut state = self.state.lock();
                if let Some(node) = state.graph.get_node_mut(key) {
                    if node.dirty_state() == DirtyState::MaybeDirty {
                        trace!(entry = %key, "dependencies unchanged");
                        node.mark_clean();
                        return (node.snapshot(), node.version());
                    }
                }
            }
        }

        self.recompute(def, key)
    }

    /// Lower `mark` once the returned guard drops.
    ///
    /// The caller raises the flag under the lock; the guard must be dropped
    /// while the lock is not held.
    fn guard(&self, mark: Mark) -> MarkGuard<'_> {
        MarkGuard {
            state: &self.state,
            mark,
        }
    }

    fn dependencies_changed(&self, recorded: &[(EntryKey, u64)]) -> bool {
        for (dep, seen) in recorded {
            let def = match self.state.lock().graph.get_node(*dep) {
                Some(node) => Arc::clone(node.def()),
                None => return true,
            };
            let (_, version) = self.resolve(&def, dep.scope);
            if version != *seen {
                return true;
            }
        }
        false
    }

    fn recompute(&self, def: &Arc<CellDef>, key: EntryKey) -> (Snapshot, u64) {
        match &def.kind {
            CellKind::Primitive { init, .. } => {
                let initial = init();
                let mut state = self.state.lock();
                let node = state.graph.entry(key, def);
                if node.is_empty() {
                    node.store(Slot::Ready(initial));
                } else {
                    node.mark_clean();
                }
                (node.snapshot(), node.version())
            }
            CellKind::Derived { read, .. } => self.compute_derived(def, key, read),
        }
    }

    fn compute_derived(&self, def: &Arc<CellDef>, key: EntryKey, read: &ReadFn) -> (Snapshot, u64) {
        let generation = {
            let mut state = self.state.lock();
            if !state.computing.insert(key) {
                warn!(entry = %key, cell = %def, "cell read itself while computing");
                let version = state.graph.entry(key, def).version();
                return (Snapshot::Failed(CellError::Cycle(def.id)), version);
            }
            state.graph.entry(key, def).begin_computation()
        };
        trace!(entry = %key, cell = %def, generation, "computing");

        let computing = self.guard(Mark::Computing(key));
        let mut getter = Getter::new(self, key.scope);
        let result = read(&mut getter);
        let mut dependencies = getter.into_dependencies();
        dependencies.retain(|(dep, _)| *dep != key);

        let outcome = match result {
            Ok(Computed::Ready(value)) => Outcome::Settled(Ok(value)),
            Ok(Computed::Pending(mut future)) => {
                let mut cx = Context::from_waker(noop_waker_ref());
                match future.as_mut().poll(&mut cx) {
                    Poll::Ready(result) => Outcome::Settled(result),
                    Poll::Pending => Outcome::InFlight(future),
                }
            }
            Err(error) => Outcome::Settled(Err(error)),
        };
        drop(computing);

        let (superseded, observed) = {
            let mut state = self.state.lock();
            if !state.graph.contains(key) {
                return (Snapshot::Failed(CellError::Disposed(def.id)), 0);
            }
            state.graph.set_dependencies(key, dependencies);

            let (superseded, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.in_flight)
                .into_iter()
                .partition(|flight| flight.key == key);
            state.in_flight = kept;

            let slot = match outcome {
                Outcome::Settled(Ok(value)) => Slot::Ready(value),
                Outcome::Settled(Err(CellError::Pending(_))) => Slot::Waiting,
                Outcome::Settled(Err(error)) => Slot::Failed(error.attributed(def.id)),
                Outcome::InFlight(future) => {
                    state.in_flight.push(InFlight {
                        key,
                        generation,
                        future,
                    });
                    Slot::Pending
                }
            };

            let node = state.graph.entry(key, def);
            node.store(slot);
            (superseded, (node.snapshot(), node.version()))
        };

        if !superseded.is_empty() {
            trace!(entry = %key, count = superseded.len(), "superseded computation discarded");
        }
        drop(superseded);
        observed
    }

    pub(crate) fn write_erased(
        &self,
        def: &Arc<CellDef>,
        scope: Scope,
        update: Box<dyn Any + Send>,
    ) -> Result<(), CellError> {
        let key = EntryKey::new(def.id, scope);
        match &def.kind {
            CellKind::Primitive { apply, .. } => {
                let current = match self.resolve(def, scope).0 {
                    Snapshot::Ready(value) => value,
                    Snapshot::Pending => return Err(CellError::Pending(def.id)),
                    Snapshot::Failed(error) => return Err(error),
                };
                let next = apply(def.id, update, &current)?;

                let affected = {
                    let mut state = self.state.lock();
                    let cause = if state.replaying {
                        Invalidation::Replay
                    } else {
                        Invalidation::Write
                    };
                    let node = state.graph.entry(key, def);
                    if !node.store(Slot::Ready(next)) {
                        trace!(entry = %key, "write left value unchanged");
                        return Ok(());
                    }
                    if cause == Invalidation::Write {
                        node.bump_write_epoch();
                    }
                    state.graph.mark_changed(key, cause)
                };
                debug!(entry = %key, cell = %def, affected = affected.len(), "cell written");

                self.propagate(key, affected);
                Ok(())
            }
            CellKind::Derived {
                write: Some(write), ..
            } => {
                trace!(entry = %key, cell = %def, "running write function");
                write(&Setter::new(self, scope), update)
            }
            CellKind::Derived { write: None, .. } => Err(CellError::ReadOnly(def.id)),
        }
    }

    /// Queue a write until `base` settles.
    pub(crate) fn defer(&self, base: EntryKey, run: DeferredRun) {
        let mut state = self.state.lock();
        let write_epoch = state
            .graph
            .get_node(base)
            .map(Node::write_epoch)
            .unwrap_or_default();
        state.deferred.push_back(DeferredWrite {
            base,
            write_epoch,
            run,
        });
        debug!(entry = %base, queued = state.deferred.len(), "write deferred until settled");
    }

    fn commit_settled(&self, key: EntryKey, generation: u64, result: Result<Value, CellError>) {
        let affected = {
            let mut state = self.state.lock();
            let Some(node) = state.graph.get_node_mut(key) else {
                trace!(entry = %key, "settlement for disposed entry dropped");
                return;
            };
            if node.generation() != generation || !node.is_pending() {
                trace!(entry = %key, generation, "stale settlement discarded");
                return;
            }

            // An upstream change that arrived while in flight still has to
            // be re-validated against the settled value.
            let prior = node.dirty_state();
            let slot = match result {
                Ok(value) => Slot::Ready(value),
                Err(error) => Slot::Failed(error.attributed(key.cell)),
            };
            node.store(slot);
            match prior {
                DirtyState::MaybeDirty => node.mark_maybe_dirty(),
                DirtyState::Dirty => node.mark_dirty(),
                DirtyState::Clean => {}
            }
            state.graph.mark_changed(key, Invalidation::Settlement)
        };
        debug!(entry = %key, affected = affected.len(), "pending computation settled");

        self.propagate(key, affected);
    }

    /// Re-validate subscribed entries among `affected`, notify listeners of
    /// whatever changed, then replay deferred writes that became runnable.
    fn propagate(&self, source: EntryKey, affected: Vec<EntryKey>) {
        let mut notify: Vec<Listener> = {
            let state = self.state.lock();
            state
                .graph
                .get_node(source)
                .map(|node| node.listeners().cloned().collect())
                .unwrap_or_default()
        };

        for key in affected {
            let (def, before) = {
                let state = self.state.lock();
                match state.graph.get_node(key) {
                    Some(node) if node.has_listeners() => (Arc::clone(node.def()), node.version()),
                    _ => continue,
                }
            };

            let (_, after) = self.resolve(&def, key.scope);
            if after != before {
                let state = self.state.lock();
                if let Some(node) = state.graph.get_node(key) {
                    notify.extend(node.listeners().cloned());
                }
            }
        }

        for listener in notify {
            listener();
        }

        self.flush_deferred();
    }

    fn flush_deferred(&self) {
        loop {
            let queue = {
                let mut state = self.state.lock();
                if state.replaying || state.deferred.is_empty() {
                    return;
                }
                std::mem::take(&mut state.deferred)
            };

            let mut waiting = VecDeque::new();
            let mut replayed = false;

            for deferred in queue {
                let def = {
                    let state = self.state.lock();
                    match state.graph.get_node(deferred.base) {
                        Some(node) if node.write_epoch() == deferred.write_epoch => {
                            Arc::clone(node.def())
                        }
                        Some(_) => {
                            debug!(entry = %deferred.base, "deferred write superseded, dropped");
                            continue;
                        }
                        None => {
                            debug!(entry = %deferred.base, "deferred write target disposed, dropped");
                            continue;
                        }
                    }
                };

                match self.resolve(&def, deferred.base.scope).0 {
                    Snapshot::Pending => waiting.push_back(deferred),
                    Snapshot::Failed(error) => {
                        warn!(entry = %deferred.base, %error, "deferred write dropped, target failed");
                    }
                    Snapshot::Ready(_) => {
                        self.state.lock().replaying = true;
                        let replaying = self.guard(Mark::Replaying);
                        let result = (deferred.run)(&Setter::new(self, deferred.base.scope));
                        drop(replaying);

                        if let Err(error) = result {
                            warn!(entry = %deferred.base, %error, "deferred write failed");
                        }
                        replayed = true;
                    }
                }
            }

            {
                let mut state = self.state.lock();
                waiting.extend(state.deferred.drain(..));
                state.deferred = waiting;
            }

            if !replayed {
                return;
            }
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Store")
            .field("entries", &state.graph.node_count())
            .field("in_flight", &state.in_flight.len())
            .field("deferred", &state.deferred.len())
            .finish()
    }
}

/// A [`Store`] bound to a single scope.
#[derive(Debug, Clone, Copy)]
pub struct ScopedStore<'a> {
    store: &'a Store,
    scope: Scope,
}

impl<'a> ScopedStore<'a> {
    /// The bound scope.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// See [`Store::read`].
    pub fn read<T: CellValue>(&self, cell: &Cell<T>) -> Loadable<T> {
        self.store.read(cell, self.scope)
    }

    /// See [`Store::get`].
    pub fn get<T: CellValue>(&self, cell: &Cell<T>) -> Result<T, CellError> {
        self.store.get(cell, self.scope)
    }

    /// See [`Store::write`].
    pub fn write<T: CellValue>(
        &self,
        cell: &Cell<T>,
        update: impl Into<Update<T>>,
    ) -> Result<(), CellError> {
        self.store.write(cell, self.scope, update)
    }

    /// See [`Store::update`].
    pub fn update<T, F>(&self, cell: &Cell<T>, f: F) -> Result<(), CellError>
    where
        T: CellValue,
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.store.update(cell, self.scope, f)
    }

    /// See [`Store::subscribe`].
    pub fn subscribe<T, F>(&self, cell: &Cell<T>, listener: F) -> Subscription
    where
        T: CellValue,
        F: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe(cell, self.scope, listener)
    }

    /// See [`Store::dispose`].
    pub fn dispose<T>(&self, cell: &Cell<T>) {
        self.store.dispose(cell, self.scope)
    }
}
