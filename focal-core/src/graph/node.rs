//! Graph Nodes
//!
//! One node per (cell, scope) entry. A node owns the entry's cached slot,
//! its freshness, and both directions of its dependency edges.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::error::CellError;
use crate::reactive::{CellDef, CellId, Scope, SubscriberId, Value};

/// Key of a value-table entry: a cell instantiated under a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub cell: CellId,
    pub scope: Scope,
}

impl EntryKey {
    /// Key for `cell` under `scope`.
    pub fn new(cell: CellId, scope: Scope) -> Self {
        Self { cell, scope }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.cell, self.scope)
    }
}

/// Freshness of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The cached slot is up-to-date.
    Clean,

    /// An upstream entry changed. The recorded dependency versions must be
    /// checked before the cached slot can be trusted.
    MaybeDirty,

    /// The node must recompute.
    Dirty,
}

/// Dependencies recorded during one computation, with the version of each
/// dependency observed at the time.
pub(crate) type Dependencies = SmallVec<[(EntryKey, u64); 4]>;

pub(crate) type Listener = Arc<dyn Fn() + Send + Sync>;

/// The cached state of an entry.
pub(crate) enum Slot {
    /// Never computed.
    Empty,
    Ready(Value),
    /// The entry's own computation is in flight.
    Pending,
    /// The entry is waiting on a pending dependency.
    Waiting,
    Failed(CellError),
}

/// What a reader observes.
pub(crate) enum Snapshot {
    Ready(Value),
    Pending,
    Failed(CellError),
}

impl Snapshot {
    pub(crate) fn into_value<T: 'static + Clone>(self, id: CellId) -> Result<T, CellError> {
        match self {
            Snapshot::Ready(value) => value
                .downcast_ref::<T>()
                .cloned()
                .ok_or(CellError::TypeMismatch(id)),
            Snapshot::Pending => Err(CellError::Pending(id)),
            Snapshot::Failed(error) => Err(error),
        }
    }
}

/// Whether an invalidation came from an external write, a replayed
/// deferred write, or a pending computation settling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invalidation {
    Write,
    Replay,
    Settlement,
}

/// A value-table entry in the dependency graph.
pub(crate) struct Node {
    key: EntryKey,
    def: Arc<CellDef>,
    dirty: DirtyState,
    slot: Slot,

    /// Bumped whenever the observable snapshot changes.
    version: u64,

    /// Bumped whenever a computation starts; settlements carrying an older
    /// generation are stale.
    generation: u64,

    /// Bumped whenever an external write invalidates this entry.
    write_epoch: u64,

    dependencies: Dependencies,
    dependents: IndexSet<EntryKey>,
    listeners: IndexMap<SubscriberId, Listener>,
}

impl Node {
    pub(crate) fn new(key: EntryKey, def: Arc<CellDef>) -> Self {
        Self {
            key,
            def,
            dirty: DirtyState::Dirty,
            slot: Slot::Empty,
            version: 0,
            generation: 0,
            write_epoch: 0,
            dependencies: SmallVec::new(),
            dependents: IndexSet::new(),
            listeners: IndexMap::new(),
        }
    }

    pub(crate) fn def(&self) -> &Arc<CellDef> {
        &self.def
    }

    pub(crate) fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    pub(crate) fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self.slot, Slot::Empty)
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.slot, Slot::Pending)
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        match &self.slot {
            Slot::Ready(value) => Snapshot::Ready(Arc::clone(value)),
            Slot::Empty | Slot::Pending | Slot::Waiting => Snapshot::Pending,
            Slot::Failed(error) => Snapshot::Failed(error.clone()),
        }
    }

    /// Replace the slot and mark the node clean.
    ///
    /// Returns whether the observable snapshot changed, in which case the
    /// version is bumped.
    pub(crate) fn store(&mut self, slot: Slot) -> bool {
        let changed = match (&self.slot, &slot) {
            (Slot::Ready(old), Slot::Ready(new)) => !(self.def.eq)(old, new),
            (Slot::Pending | Slot::Waiting, Slot::Pending | Slot::Waiting) => false,
            (Slot::Failed(old), Slot::Failed(new)) => old != new,
            _ => true,
        };
        self.slot = slot;
        self.dirty = DirtyState::Clean;
        if changed {
            self.version += 1;
        }
        changed
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    /// Start a new computation and return its generation.
    pub(crate) fn begin_computation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn write_epoch(&self) -> u64 {
        self.write_epoch
    }

    pub(crate) fn bump_write_epoch(&mut self) {
        self.write_epoch += 1;
    }

    pub(crate) fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Swap in a freshly recorded dependency list, returning the old one.
    pub(crate) fn replace_dependencies(&mut self, dependencies: Dependencies) -> Dependencies {
        std::mem::replace(&mut self.dependencies, dependencies)
    }

    pub(crate) fn remove_dependency(&mut self, key: EntryKey) {
        self.dependencies.retain(|(dep, _)| *dep != key);
    }

    pub(crate) fn add_dependent(&mut self, key: EntryKey) {
        self.dependents.insert(key);
    }

    pub(crate) fn remove_dependent(&mut self, key: EntryKey) {
        self.dependents.shift_remove(&key);
    }

    pub(crate) fn dependents(&self) -> &IndexSet<EntryKey> {
        &self.dependents
    }

    pub(crate) fn add_listener(&mut self, id: SubscriberId, listener: Listener) {
        self.listeners.insert(id, listener);
    }

    pub(crate) fn remove_listener(&mut self, id: SubscriberId) -> Option<Listener> {
        self.listeners.shift_remove(&id)
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub(crate) fn listeners(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.values()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("dirty", &self.dirty)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies.len())
            .field("dependents", &self.dependents.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
