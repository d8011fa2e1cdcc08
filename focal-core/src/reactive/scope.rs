//! Isolation scopes.
//!
//! The store keys every entry by (cell, scope). The same cell read under two
//! scopes is two unrelated entries: separate values, separate dependency
//! edges, separate in-flight computations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque isolation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope(u64);

impl Scope {
    /// The implicit scope used when the caller does not isolate.
    pub const GLOBAL: Scope = Scope(0);

    /// Mint a fresh scope, distinct from every other scope in the process.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this is the default scope.
    pub fn is_global(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Scope {
    /// The global scope. Use [`Scope::new`] for an isolated one.
    fn default() -> Self {
        Self::GLOBAL
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            f.write_str("global")
        } else {
            write!(f, "scope#{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_unique() {
        let s1 = Scope::new();
        let s2 = Scope::new();

        assert_ne!(s1, s2);
        assert_ne!(s1, Scope::GLOBAL);
        assert!(!s1.is_global());
        assert_eq!(Scope::default(), Scope::GLOBAL);
        assert_eq!(Scope::GLOBAL.to_string(), "global");
    }
}
