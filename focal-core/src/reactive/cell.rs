//! Cell Declarations
//!
//! A [`Cell`] is a declaration, not a value: it describes how to produce a
//! value (an initial value, or a read function over other cells) and
//! optionally how to accept writes. Values live in a [`Store`], one slot per
//! (cell, scope), so a single declaration can back any number of isolated
//! instances.
//!
//! # Kinds
//!
//! - Primitive cells hold a value directly and accept [`Update`]s.
//! - Derived cells compute their value from other cells through a
//!   [`Getter`]. The computation may be asynchronous, in which case the
//!   entry stays pending until the future settles.
//! - Writable derived cells additionally route writes through a
//!   [`Setter`] to whichever upstream cells they choose.
//!
//! [`Store`]: super::Store

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::context::{Getter, Setter};
use crate::error::CellError;

/// Type-erased cell value as stored in the value table.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

/// What a read function produced.
pub(crate) enum Computed {
    Ready(Value),
    Pending(BoxFuture<'static, Result<Value, CellError>>),
}

pub(crate) type ReadFn = Arc<dyn Fn(&mut Getter<'_>) -> Result<Computed, CellError> + Send + Sync>;
pub(crate) type WriteFn =
    Arc<dyn Fn(&Setter<'_>, Box<dyn Any + Send>) -> Result<(), CellError> + Send + Sync>;
pub(crate) type ApplyFn = fn(CellId, Box<dyn Any + Send>, &Value) -> Result<Value, CellError>;

/// Bounds every cell value satisfies.
///
/// `PartialEq` lets the store skip notifications when a recomputation
/// produces an equal value.
pub trait CellValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> CellValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// Unique identifier for a cell declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    /// Allocate a fresh, process-unique id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value of this id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for CellId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A write to a cell: either a replacement value or a function of the
/// current value.
pub enum Update<T> {
    Set(T),
    Apply(Box<dyn FnOnce(&T) -> T + Send>),
}

impl<T> Update<T> {
    /// An update computed from the current value.
    pub fn apply<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        Self::Apply(Box::new(f))
    }

    /// Produce the new value given the current one.
    pub fn resolve(self, current: &T) -> T {
        match self {
            Self::Set(value) => value,
            Self::Apply(f) => f(current),
        }
    }
}

impl<T> From<T> for Update<T> {
    fn from(value: T) -> Self {
        Self::Set(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(value) => f.debug_tuple("Set").field(value).finish(),
            Self::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

#[derive(Clone)]
pub(crate) enum CellKind {
    Primitive {
        init: Arc<dyn Fn() -> Value + Send + Sync>,
        apply: ApplyFn,
    },
    Derived {
        read: ReadFn,
        write: Option<WriteFn>,
    },
}

/// The type-erased declaration shared by every handle to a cell.
#[derive(Clone)]
pub(crate) struct CellDef {
    pub(crate) id: CellId,
    pub(crate) label: Option<Arc<str>>,
    pub(crate) kind: CellKind,
    pub(crate) eq: fn(&Value, &Value) -> bool,
}

impl CellDef {
    pub(crate) fn is_primitive(&self) -> bool {
        matches!(self.kind, CellKind::Primitive { .. })
    }
}

impl fmt::Display for CellDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label}{}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

impl fmt::Debug for CellDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellDef")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("primitive", &self.is_primitive())
            .finish()
    }
}

fn value_eq<T: CellValue>(a: &Value, b: &Value) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn apply_update<T: CellValue>(
    id: CellId,
    update: Box<dyn Any + Send>,
    current: &Value,
) -> Result<Value, CellError> {
    let update = update
        .downcast::<Update<T>>()
        .map_err(|_| CellError::TypeMismatch(id))?;
    let current = current
        .downcast_ref::<T>()
        .ok_or(CellError::TypeMismatch(id))?;
    Ok(Arc::new(update.resolve(current)) as Value)
}

fn erase_write<T, W>(id: CellId, write: W) -> WriteFn
where
    T: CellValue,
    W: Fn(&Setter<'_>, Update<T>) -> Result<(), CellError> + Send + Sync + 'static,
{
    Arc::new(move |setter: &Setter<'_>, update: Box<dyn Any + Send>| {
        let update = update
            .downcast::<Update<T>>()
            .map_err(|_| CellError::TypeMismatch(id))?;
        write(setter, *update).map_err(|e| e.attributed(id))
    })
}

fn erase_read<T, R>(read: R) -> ReadFn
where
    T: CellValue,
    R: Fn(&mut Getter<'_>) -> Result<T, CellError> + Send + Sync + 'static,
{
    Arc::new(move |get: &mut Getter<'_>| {
        read(get).map(|value| Computed::Ready(Arc::new(value) as Value))
    })
}

fn erase_read_async<T, R, Fut>(read: R) -> ReadFn
where
    T: CellValue,
    R: Fn(&mut Getter<'_>) -> Result<Fut, CellError> + Send + Sync + 'static,
    Fut: Future<Output = Result<T, CellError>> + Send + 'static,
{
    Arc::new(move |get: &mut Getter<'_>| {
        let future = read(get)?;
        Ok(Computed::Pending(
            future
                .map(|result| result.map(|value| Arc::new(value) as Value))
                .boxed(),
        ))
    })
}

/// A handle to a cell declaration holding values of type `T`.
///
/// Handles are cheap to clone and compare by identity.
pub struct Cell<T> {
    def: Arc<CellDef>,
    _value: PhantomData<fn() -> T>,
}

impl<T: CellValue> Cell<T> {
    /// A primitive cell starting at `initial` in every scope.
    pub fn new(initial: T) -> Self {
        let init: Arc<dyn Fn() -> Value + Send + Sync> =
            Arc::new(move || Arc::new(initial.clone()) as Value);
        Self::from_kind(
            CellId::new(),
            CellKind::Primitive {
                init,
                apply: apply_update::<T>,
            },
        )
    }

    /// A read-only cell computed from other cells.
    ///
    /// ```rust
    /// use focal_core::{Cell, Scope, Store};
    ///
    /// let count = Cell::new(2);
    /// let doubled = {
    ///     let count = count.clone();
    ///     Cell::derived(move |get| Ok(get.get(&count)? * 2))
    /// };
    ///
    /// let store = Store::new();
    /// assert_eq!(store.get(&doubled, Scope::GLOBAL).unwrap(), 4);
    /// ```
    pub fn derived<R>(read: R) -> Self
    where
        R: Fn(&mut Getter<'_>) -> Result<T, CellError> + Send + Sync + 'static,
    {
        Self::from_kind(
            CellId::new(),
            CellKind::Derived {
                read: erase_read(read),
                write: None,
            },
        )
    }

    /// A read-only cell whose value is produced by a future.
    ///
    /// Dependencies are the cells read synchronously before the future is
    /// returned.
    pub fn derived_async<R, Fut>(read: R) -> Self
    where
        R: Fn(&mut Getter<'_>) -> Result<Fut, CellError> + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CellError>> + Send + 'static,
    {
        Self::from_kind(
            CellId::new(),
            CellKind::Derived {
                read: erase_read_async(read),
                write: None,
            },
        )
    }

    /// A derived cell that also accepts writes.
    pub fn writable<R, W>(read: R, write: W) -> Self
    where
        R: Fn(&mut Getter<'_>) -> Result<T, CellError> + Send + Sync + 'static,
        W: Fn(&Setter<'_>, Update<T>) -> Result<(), CellError> + Send + Sync + 'static,
    {
        let id = CellId::new();
        Self::from_kind(
            id,
            CellKind::Derived {
                read: erase_read(read),
                write: Some(erase_write(id, write)),
            },
        )
    }

    /// An asynchronous derived cell that also accepts writes.
    pub fn writable_async<R, Fut, W>(read: R, write: W) -> Self
    where
        R: Fn(&mut Getter<'_>) -> Result<Fut, CellError> + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CellError>> + Send + 'static,
        W: Fn(&Setter<'_>, Update<T>) -> Result<(), CellError> + Send + Sync + 'static,
    {
        let id = CellId::new();
        Self::from_kind(
            id,
            CellKind::Derived {
                read: erase_read_async(read),
                write: Some(erase_write(id, write)),
            },
        )
    }

    fn from_kind(id: CellId, kind: CellKind) -> Self {
        Self {
            def: Arc::new(CellDef {
                id,
                label: None,
                kind,
                eq: value_eq::<T>,
            }),
            _value: PhantomData,
        }
    }

    /// Attach a debug label, shown in logs and `Debug` output.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        let label: Arc<str> = label.into().into();
        Self {
            def: Arc::new(CellDef {
                label: Some(label),
                ..(*self.def).clone()
            }),
            _value: PhantomData,
        }
    }
}

impl<T> Cell<T> {
    /// This cell's identity.
    pub fn id(&self) -> CellId {
        self.def.id
    }

    /// The debug label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.def.label.as_deref()
    }

    /// Whether this cell holds its value directly.
    pub fn is_primitive(&self) -> bool {
        self.def.is_primitive()
    }

    /// Whether writes to this cell are accepted.
    pub fn is_writable(&self) -> bool {
        match &self.def.kind {
            CellKind::Primitive { .. } => true,
            CellKind::Derived { write, .. } => write.is_some(),
        }
    }

    pub(crate) fn def(&self) -> &Arc<CellDef> {
        &self.def
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            _value: PhantomData,
        }
    }
}

impl<T> PartialEq for Cell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.def.id == other.def.id
    }
}

impl<T> Eq for Cell<T> {}

impl<T> std::hash::Hash for Cell<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.def.id.hash(state);
    }
}

impl<T> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.def.id)
            .field("label", &self.def.label)
            .field("value_type", &std::any::type_name::<T>())
            .finish()
    }
}
