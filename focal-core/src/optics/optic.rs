//! The optic type and its combinators.

use std::fmt;
use std::sync::Arc;

use super::FocusError;

type GetFn<S, A> = Arc<dyn Fn(&S) -> Result<A, FocusError> + Send + Sync>;
type SetFn<S, A> = Arc<dyn Fn(&S, A) -> Result<S, FocusError> + Send + Sync>;

/// A composable getter/setter pair focusing an `A` inside an `S`.
///
/// Cloning an optic is cheap; both halves are reference counted.
///
/// # Example
///
/// ```rust
/// use focal_core::optics::Optic;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Point { x: i32, y: i32 }
///
/// let x = Optic::lens(|p: &Point| p.x, |p: &Point, x| Point { x, ..p.clone() });
///
/// let p = Point { x: 1, y: 2 };
/// assert_eq!(x.get(&p).unwrap(), 1);
/// assert_eq!(x.set(&p, 5).unwrap(), Point { x: 5, y: 2 });
/// ```
pub struct Optic<S, A> {
    getter: GetFn<S, A>,
    setter: SetFn<S, A>,
    partial: bool,
}

impl<S, A> Clone for Optic<S, A> {
    fn clone(&self) -> Self {
        Self {
            getter: Arc::clone(&self.getter),
            setter: Arc::clone(&self.setter),
            partial: self.partial,
        }
    }
}

impl<S, A> fmt::Debug for Optic<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optic")
            .field("source", &std::any::type_name::<S>())
            .field("focus", &std::any::type_name::<A>())
            .field("partial", &self.partial)
            .finish()
    }
}

impl<S: 'static, A: 'static> Optic<S, A> {
    /// A total lens from a getter and a setter.
    pub fn lens<G, F>(get: G, set: F) -> Self
    where
        G: Fn(&S) -> A + Send + Sync + 'static,
        F: Fn(&S, A) -> S + Send + Sync + 'static,
    {
        Self {
            getter: Arc::new(move |s: &S| Ok(get(s))),
            setter: Arc::new(move |s: &S, a: A| Ok(set(s, a))),
            partial: false,
        }
    }

    /// A partial optic whose focus may be absent.
    pub fn partial<G, F>(preview: G, set: F) -> Self
    where
        G: Fn(&S) -> Result<A, FocusError> + Send + Sync + 'static,
        F: Fn(&S, A) -> Result<S, FocusError> + Send + Sync + 'static,
    {
        Self {
            getter: Arc::new(preview),
            setter: Arc::new(set),
            partial: true,
        }
    }

    /// Read the focused value.
    pub fn get(&self, source: &S) -> Result<A, FocusError> {
        (self.getter)(source)
    }

    /// Read the focused value, treating a miss as `None`.
    pub fn preview(&self, source: &S) -> Option<A> {
        self.get(source).ok()
    }

    /// Replace the focused value, returning the updated source.
    pub fn set(&self, source: &S, value: A) -> Result<S, FocusError> {
        (self.setter)(source, value)
    }

    /// Apply `f` to the focused value.
    pub fn modify<F>(&self, source: &S, f: F) -> Result<S, FocusError>
    where
        F: FnOnce(A) -> A,
    {
        let focused = self.get(source)?;
        self.set(source, f(focused))
    }

    /// Whether any part of this optic may miss its focus.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Focus further into the focused value.
    pub fn compose<B: 'static>(&self, inner: &Optic<A, B>) -> Optic<S, B> {
        let (outer_get, inner_get) = (Arc::clone(&self.getter), Arc::clone(&inner.getter));
        let (outer_set_get, outer_set) = (Arc::clone(&self.getter), Arc::clone(&self.setter));
        let inner_set = Arc::clone(&inner.setter);

        Optic {
            getter: Arc::new(move |s: &S| inner_get(&outer_get(s)?)),
            setter: Arc::new(move |s: &S, b: B| {
                let focused = outer_set_get(s)?;
                outer_set(s, inner_set(&focused, b)?)
            }),
            partial: self.partial || inner.partial,
        }
    }
}
