//! Update Scheduler
//!
//! The scheduler owns every node of the value table and decides the order in
//! which invalidated nodes are brought up to date. Dependencies are always
//! settled before their dependents.
//!
//! # Algorithm
//!
//! 1. When an entry changes, mark its dependents "maybe dirty", breadth
//!    first, visiting each node once regardless of fan-in.
//! 2. Collect the visited nodes.
//! 3. Sort them topologically (Kahn's algorithm over the recorded edges).
//! 4. The store then re-validates the nodes somebody is listening to, in
//!    that order. A "maybe dirty" node recomputes only if one of its
//!    recorded dependency versions moved; everything else stays lazy until
//!    it is next read.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::node::{Dependencies, EntryKey, Invalidation, Node};
use crate::reactive::{CellDef, Scope};

/// The value table and its dependency edges.
#[derive(Default)]
pub(crate) struct UpdateScheduler {
    nodes: HashMap<EntryKey, Node>,
}

impl UpdateScheduler {
    pub(crate) fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Get the node for `key`, creating an empty one if needed.
    pub(crate) fn entry(&mut self, key: EntryKey, def: &Arc<CellDef>) -> &mut Node {
        self.nodes
            .entry(key)
            .or_insert_with(|| Node::new(key, Arc::clone(def)))
    }

    pub(crate) fn get_node(&self, key: EntryKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub(crate) fn get_node_mut(&mut self, key: EntryKey) -> Option<&mut Node> {
        self.nodes.get_mut(&key)
    }

    pub(crate) fn contains(&self, key: EntryKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Install the dependencies recorded by a computation of `key`,
    /// rewiring reverse edges for whatever was added or dropped.
    pub(crate) fn set_dependencies(&mut self, key: EntryKey, dependencies: Dependencies) {
        let Some(node) = self.nodes.get_mut(&key) else {
            return;
        };
        let fresh: HashSet<EntryKey> = dependencies.iter().map(|(dep, _)| *dep).collect();
        let old = node.replace_dependencies(dependencies);

        for (dep, _) in old.iter().filter(|(dep, _)| !fresh.contains(dep)) {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.remove_dependent(key);
            }
        }
        for dep in fresh {
            if let Some(dep_node) = self.nodes.get_mut(&dep) {
                dep_node.add_dependent(key);
            }
        }
    }

    /// Remove a node and every edge touching it.
    ///
    /// Former dependents lose the edge and are marked dirty so they
    /// recompute on their next read.
    pub(crate) fn remove_node(&mut self, key: EntryKey) -> Option<Node> {
        let node = self.nodes.remove(&key)?;

        for (dep, _) in node.dependencies() {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.remove_dependent(key);
            }
        }
        for dependent in node.dependents() {
            if let Some(dependent_node) = self.nodes.get_mut(dependent) {
                dependent_node.remove_dependency(key);
                dependent_node.mark_dirty();
            }
        }

        Some(node)
    }

    /// Remove every node instantiated under `scope`.
    pub(crate) fn remove_scope(&mut self, scope: Scope) -> Vec<Node> {
        let keys: Vec<EntryKey> = self
            .nodes
            .keys()
            .filter(|key| key.scope == scope)
            .copied()
            .collect();

        keys.into_iter()
            .filter_map(|key| self.remove_node(key))
            .collect()
    }

    /// Propagate a change of `source` to its transitive dependents.
    ///
    /// Returns the affected nodes in topological order. Invalidations caused
    /// by an external write also advance each affected node's write epoch.
    pub(crate) fn mark_changed(&mut self, source: EntryKey, cause: Invalidation) -> Vec<EntryKey> {
        let mut affected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(node) = self.nodes.get(&source) {
            queue.extend(node.dependents().iter().copied());
        }

        while let Some(key) = queue.pop_front() {
            if !visited.insert(key) {
                continue;
            }

            if let Some(node) = self.nodes.get_mut(&key) {
                node.mark_maybe_dirty();
                if cause == Invalidation::Write {
                    node.bump_write_epoch();
                }
                affected.push(key);
                queue.extend(node.dependents().iter().copied());
            }
        }

        self.topological_sort(affected)
    }

    /// Order `keys` so that dependencies come before dependents.
    fn topological_sort(&self, keys: Vec<EntryKey>) -> Vec<EntryKey> {
        let key_set: HashSet<_> = keys.iter().copied().collect();
        let mut in_degree: HashMap<EntryKey, usize> = HashMap::new();
        let mut result = Vec::with_capacity(keys.len());
        let mut queue = VecDeque::new();

        for &key in &keys {
            if let Some(node) = self.nodes.get(&key) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|(dep, _)| key_set.contains(dep))
                    .count();
                in_degree.insert(key, degree);
                if degree == 0 {
                    queue.push_back(key);
                }
            }
        }

        while let Some(key) = queue.pop_front() {
            result.push(key);

            if let Some(node) = self.nodes.get(&key) {
                for dependent in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        result
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
