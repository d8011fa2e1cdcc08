//! Cell Combinators
//!
//! Derived cells built from other cells: [`focus`] views a part of a cell
//! through an optic and writes back through it, [`select`] is a read-only
//! projection, [`split`] turns a list cell into one focused cell per
//! element, and [`loadable`] wraps a cell so that reading it never suspends.
//!
//! A focused cell is an ordinary writable derived cell. It can be focused
//! again, subscribed to, read under any scope, and it suspends whenever its
//! base is pending.

use std::sync::Arc;

use parking_lot::Mutex;

use super::cell::{Cell, CellValue, Update};
use super::context::{Getter, Setter};
use super::loadable::Loadable;
use crate::error::CellError;
use crate::optics::{Optic, OpticBuilder};

/// A writable view of part of `base`.
///
/// `build` runs once, here, to produce the optic every read and write goes
/// through. Reading applies the optic's getter to the base value. Writing
/// applies the optic's setter to the current base value and issues exactly
/// one write of the whole updated structure to `base`.
///
/// If `base` is still pending when written through, the write is queued and
/// replayed (in program order) once `base` settles. A queued write is
/// dropped as stale if something else writes to `base` or anything upstream
/// of it first.
///
/// ```rust
/// use focal_core::{focus, Cell, Scope, Store};
/// use serde_json::json;
///
/// let big = Cell::new(json!({ "a": { "b": 0 } }));
/// let a = focus(&big, |o| o.prop("a"));
/// let b = focus(&a, |o| o.prop("b"));
///
/// let store = Store::new();
/// store.write(&b, Scope::GLOBAL, json!(3)).unwrap();
/// assert_eq!(store.get(&big, Scope::GLOBAL).unwrap(), json!({ "a": { "b": 3 } }));
/// ```
pub fn focus<S, A, B>(base: &Cell<S>, build: B) -> Cell<A>
where
    S: CellValue,
    A: CellValue,
    B: FnOnce(OpticBuilder<S>) -> Optic<S, A>,
{
    let optic = build(OpticBuilder::new());

    let read = {
        let (base, optic) = (base.clone(), optic.clone());
        move |get: &mut Getter<'_>| -> Result<A, CellError> {
            let source = get.get(&base)?;
            Ok(optic.get(&source)?)
        }
    };
    let write = {
        let base = base.clone();
        move |setter: &Setter<'_>, update: Update<A>| write_through(setter, &base, &optic, update)
    };

    let cell = Cell::writable(read, write);
    match base.label() {
        Some(label) => cell.with_label(format!("{label}.focus")),
        None => cell,
    }
}

fn write_through<S, A>(
    setter: &Setter<'_>,
    base: &Cell<S>,
    optic: &Optic<S, A>,
    update: Update<A>,
) -> Result<(), CellError>
where
    S: CellValue,
    A: CellValue,
{
    match setter.read(base) {
        Loadable::Ready(source) => {
            let next = match update {
                Update::Set(value) => optic.set(&source, value)?,
                Update::Apply(f) => optic.modify(&source, |focused| f(&focused))?,
            };
            setter.set(base, next)
        }
        Loadable::Pending => {
            let (queued_base, optic) = (base.clone(), optic.clone());
            setter.defer(base, move |setter| {
                write_through(setter, &queued_base, &optic, update)
            });
            Ok(())
        }
        Loadable::Failed(error) => Err(error),
    }
}

/// A read-only projection of `base`.
///
/// Dependents are only notified when the projected value changes, so
/// selecting a small part of a large cell cuts off unrelated updates.
pub fn select<S, A, F>(base: &Cell<S>, project: F) -> Cell<A>
where
    S: CellValue,
    A: CellValue,
    F: Fn(&S) -> A + Send + Sync + 'static,
{
    let base = base.clone();
    Cell::derived(move |get| Ok(project(&get.get(&base)?)))
}

/// Split a list cell into one focused cell per element.
///
/// The element cells are created lazily and reused across reads, so the
/// same index always yields the same cell. Writing to an element cell
/// writes the whole list back to `base`.
pub fn split<T: CellValue>(base: &Cell<Vec<T>>) -> Cell<Vec<Cell<T>>> {
    let cache: Arc<Mutex<Vec<Cell<T>>>> = Arc::default();
    let base = base.clone();

    Cell::derived(move |get| {
        let len = get.get(&base)?.len();
        let mut cells = cache.lock();
        for index in cells.len()..len {
            cells.push(focus(&base, move |o| o.index(index)));
        }
        Ok(cells[..len].to_vec())
    })
}

/// A cell that reports `cell`'s state instead of suspending on it.
pub fn loadable<T: CellValue>(cell: &Cell<T>) -> Cell<Loadable<T>> {
    let cell = cell.clone();
    Cell::derived(move |get| Ok(get.get(&cell).into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics::FocusError;
    use crate::reactive::{Scope, Store};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Big {
        a: i32,
        b: String,
    }

    fn big() -> Cell<Big> {
        Cell::new(Big {
            a: 0,
            b: "keep".into(),
        })
    }

    fn field_a(base: &Cell<Big>) -> Cell<i32> {
        focus(base, |o| {
            o.lens(|s: &Big| s.a, |s: &Big, a| Big { a, ..s.clone() })
        })
    }

    #[test]
    fn focus_reads_and_writes_through_lens() {
        let store = Store::new();
        let base = big();
        let a = field_a(&base);

        assert_eq!(store.get(&a, Scope::GLOBAL), Ok(0));

        store.update(&a, Scope::GLOBAL, |n| n + 1).unwrap();
        assert_eq!(store.get(&a, Scope::GLOBAL), Ok(1));
        assert_eq!(
            store.get(&base, Scope::GLOBAL),
            Ok(Big {
                a: 1,
                b: "keep".into()
            })
        );

        store.write(&a, Scope::GLOBAL, 0).unwrap();
        assert_eq!(store.get(&base, Scope::GLOBAL).map(|b| b.a), Ok(0));
    }

    #[test]
    fn focus_miss_is_distinct_from_value() {
        let store = Store::new();
        let list = Cell::new(vec![0_u8]);
        let second = focus(&list, |o| o.index(1));

        assert_eq!(
            store.get(&second, Scope::GLOBAL),
            Err(CellError::Focus(FocusError::IndexOutOfRange { index: 1, len: 1 }))
        );

        store.write(&list, Scope::GLOBAL, vec![0, 0]).unwrap();
        assert_eq!(store.get(&second, Scope::GLOBAL), Ok(0));
    }

    #[test]
    fn focus_label_follows_base() {
        let base = big().with_label("big");
        assert_eq!(field_a(&base).label(), Some("big.focus"));
    }

    #[test]
    fn select_cuts_off_unrelated_changes() {
        let store = Store::new();
        let base = big();
        let b_len = select(&base, |s: &Big| s.b.len());

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _sub = store.subscribe(&b_len, Scope::GLOBAL, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.update(&base, Scope::GLOBAL, |s| Big { a: 9, ..s.clone() }).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store
            .update(&base, Scope::GLOBAL, |s| Big { b: "longer".into(), ..s.clone() })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(&b_len, Scope::GLOBAL), Ok(6));
    }

    #[test]
    fn split_reuses_element_cells() {
        let store = Store::new();
        let list = Cell::new(vec![1, 2]);
        let items = split(&list);

        let first_read = store.get(&items, Scope::GLOBAL).unwrap();
        assert_eq!(first_read.len(), 2);

        store.write(&first_read[1], Scope::GLOBAL, 20).unwrap();
        assert_eq!(store.get(&list, Scope::GLOBAL), Ok(vec![1, 20]));

        store.update(&list, Scope::GLOBAL, |v| [v.as_slice(), &[3]].concat()).unwrap();
        let second_read = store.get(&items, Scope::GLOBAL).unwrap();
        assert_eq!(second_read.len(), 3);
        assert_eq!(second_read[0], first_read[0]);
        assert_eq!(store.get(&second_read[2], Scope::GLOBAL), Ok(3));
    }

    #[test]
    fn loadable_never_suspends() {
        let store = Store::new();
        let failing: Cell<i32> = Cell::derived(|_| Err(CellError::failure("boom")));
        let wrapped = loadable(&failing);

        let state = store.get(&wrapped, Scope::GLOBAL).unwrap();
        assert!(state.is_failed());

        let ready = loadable(&Cell::new(5));
        assert_eq!(store.get(&ready, Scope::GLOBAL), Ok(Loadable::Ready(5)));
    }
}
