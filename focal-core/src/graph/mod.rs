//! Dependency Graph
//!
//! This module holds the value table: one node per (cell, scope) entry, with
//! the dependency edges discovered while computing it.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes are cell instances (a cell under a scope)
//! - Edges are dependencies: if A read B during its last computation, there
//!   is an edge from B to A
//!
//! Edges never cross scopes, since a computation only reads through the scope
//! it runs in.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized rather than spread over cell handles, so that
//!    a single propagation pass can be ordered topologically and each node
//!    revisited at most once.
//!
//! 2. Nodes are indexed by [`EntryKey`] for O(1) lookups.
//!
//! 3. Both forward (dependencies) and reverse (dependents) edges are kept,
//!    since invalidation walks one way and re-validation the other.

mod node;
mod scheduler;

pub use node::{DirtyState, EntryKey};
pub(crate) use node::{Dependencies, Invalidation, Listener, Node, Slot, Snapshot};
pub(crate) use scheduler::UpdateScheduler;
