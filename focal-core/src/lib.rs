//! Focal Core
//!
//! This crate provides scoped reactive state cells with lens-focused derived
//! views. It implements:
//!
//! - Composable optics (lenses and partial focuses)
//! - Cells and a store that caches their values per isolation scope
//! - Focused cells: writable views into part of another cell
//! - Asynchronous derivations with suspension and stale-result discard
//! - A call-site classifier for build-time tooling
//!
//! # Architecture
//!
//! - `optics`: Optic, OpticBuilder and focus errors
//! - `reactive`: cells, the store, scopes and combinators
//! - `graph`: the value table and its dependency graph
//! - `classify`: recognizing cell constructors by name
//!
//! # Example
//!
//! ```rust
//! use focal_core::{focus, Cell, Scope, Store};
//! use serde_json::{json, Value};
//!
//! let big = Cell::new(json!({ "a": 0 }));
//! let count = focus(&big, |o| o.prop("a"));
//!
//! let store = Store::new();
//! store
//!     .update(&count, Scope::GLOBAL, |n: &Value| json!(n.as_i64().unwrap_or(0) + 1))
//!     .unwrap();
//!
//! assert_eq!(store.get(&count, Scope::GLOBAL).unwrap(), json!(1));
//! assert_eq!(store.get(&big, Scope::GLOBAL).unwrap(), json!({ "a": 1 }));
//! ```

pub mod classify;
mod error;
pub mod graph;
pub mod optics;
pub mod reactive;

pub use error::CellError;
pub use graph::{DirtyState, EntryKey};
pub use optics::{FocusError, Optic, OpticBuilder};
pub use reactive::{
    focus, loadable, select, split, Cell, CellFamily, CellId, CellValue, Getter, Loadable, Scope,
    ScopedStore, Setter, Store, SubscriberId, Subscription, Update,
};
