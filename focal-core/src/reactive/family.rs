//! Parameterized cells.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use super::cell::{Cell, CellValue};

/// Memoizes one cell per parameter.
///
/// The same parameter always yields the same cell (and therefore the same
/// store entries) until it is removed from the family.
///
/// ```rust
/// use focal_core::{Cell, CellFamily, Scope, Store};
///
/// let todos = CellFamily::new(|id: &u32| Cell::new(format!("todo {id}")));
/// assert_eq!(todos.get(1), todos.get(1));
///
/// let store = Store::new();
/// assert_eq!(store.get(&todos.get(2), Scope::GLOBAL).unwrap(), "todo 2");
/// ```
pub struct CellFamily<P, T> {
    create: Arc<dyn Fn(&P) -> Cell<T> + Send + Sync>,
    cells: DashMap<P, Cell<T>>,
}

impl<P, T> CellFamily<P, T>
where
    P: Eq + Hash + Clone,
    T: CellValue,
{
    /// Create a family that builds cells with `create`.
    pub fn new<F>(create: F) -> Self
    where
        F: Fn(&P) -> Cell<T> + Send + Sync + 'static,
    {
        Self {
            create: Arc::new(create),
            cells: DashMap::new(),
        }
    }

    /// The cell for `param`, created on first use.
    pub fn get(&self, param: P) -> Cell<T> {
        if let Some(cell) = self.cells.get(&param) {
            return cell.value().clone();
        }
        let create = &self.create;
        self.cells
            .entry(param.clone())
            .or_insert_with(|| create(&param))
            .value()
            .clone()
    }

    /// Forget the cell for `param`.
    ///
    /// Entries the cell already has in a store are not disposed; call
    /// [`Store::dispose`](super::Store::dispose) for that.
    pub fn remove(&self, param: &P) -> Option<Cell<T>> {
        self.cells.remove(param).map(|(_, cell)| cell)
    }

    /// Whether a cell for `param` is memoized.
    pub fn contains(&self, param: &P) -> bool {
        self.cells.contains_key(param)
    }

    /// Number of memoized cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell is memoized.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Drop every memoized cell for which `keep` returns false.
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&P) -> bool,
    {
        self.cells.retain(|param, _| keep(param));
    }
}

impl<P, T> fmt::Debug for CellFamily<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellFamily")
            .field("value_type", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}
