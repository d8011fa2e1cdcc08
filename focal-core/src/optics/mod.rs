//! Optics
//!
//! An optic is a pure getter/setter pair that focuses a part `A` of a larger
//! value `S`. Optics hold no state and never mutate in place: `set` returns
//! a new `S`.
//!
//! # Laws
//!
//! Well-formed total optics (lenses) satisfy:
//!
//! ```text
//! get(set(s, a)) == a
//! set(s, get(s)) == s
//! ```
//!
//! Partial optics (an index into a `Vec`, a key in a map, a property of a
//! JSON object) satisfy the same laws whenever the focus is present. When it
//! is absent they report a [`FocusError`] instead of a value, which keeps a
//! missing element distinguishable from a present-but-empty one.
//!
//! # Composition
//!
//! [`Optic::compose`] chains `Optic<S, A>` and `Optic<A, B>` into
//! `Optic<S, B>`. Composition is associative.

mod builder;
mod optic;

pub use builder::OpticBuilder;
pub use optic::Optic;

/// An optic could not focus the value it was given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FocusError {
    /// A sequence index past the end.
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A map key or object property that is not present.
    #[error("key `{0}` is not present")]
    MissingKey(String),

    /// The value has the wrong shape for this focus.
    #[error("expected {expected}, found {found}")]
    Shape {
        expected: &'static str,
        found: &'static str,
    },

    /// A custom partial optic declined to focus.
    #[error("{0}")]
    Miss(String),
}
