//! Reactive Cells
//!
//! This module implements the cell/store model: declarations of state
//! ([`Cell`]) kept apart from the values they hold ([`Store`]), so that the
//! same declaration can back any number of isolated instances.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A primitive cell holds a value and accepts writes. A derived cell
//! computes its value from other cells, possibly asynchronously, and may
//! also accept writes which it routes to upstream cells.
//!
//! ## Scopes
//!
//! Every read and write names a [`Scope`]. A (cell, scope) pair is an
//! independent entry with its own value, dependencies, and pending state.
//!
//! ## Focus
//!
//! [`focus`] builds a writable derived cell that views part of another cell
//! through an optic. Focused cells compose: focusing a focused cell reaches
//! deeper into the same base.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered by the [`Getter`] handed to each read
//! function rather than by ambient thread-local tracking, so a computation
//! can only depend on the scope it was asked to compute in.

mod cell;
mod context;
mod family;
mod focus;
mod loadable;
mod scope;
mod store;
mod subscriber;

pub use cell::{Cell, CellId, CellValue, Update};
pub use context::{Getter, Setter};
pub use family::CellFamily;
pub use focus::{focus, loadable, select, split};
pub use loadable::Loadable;
pub use scope::Scope;
pub use store::{ScopedStore, Store};
pub use subscriber::{SubscriberId, Subscription};

pub(crate) use cell::{CellDef, Value};
