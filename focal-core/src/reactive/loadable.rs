//! The tri-state result of reading a cell.

use crate::error::CellError;

/// A settled value, the suspension marker, or a cached failure.
///
/// The reactive layer renders a fallback on `Pending` and reads again once
/// the store has settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Ready(T),
    Pending,
    Failed(CellError),
}

impl<T> Loadable<T> {
    /// Whether the value is available.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Whether the value is still being computed.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the computation failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The value, if ready.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// A reference to the value, if ready.
    pub fn as_ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// The cached failure, if any.
    pub fn failure(&self) -> Option<&CellError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Map a ready value, keeping pending and failed states.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Loadable<U> {
        match self {
            Self::Ready(value) => Loadable::Ready(f(value)),
            Self::Pending => Loadable::Pending,
            Self::Failed(error) => Loadable::Failed(error),
        }
    }

    /// The value, or `default` if not ready.
    pub fn unwrap_or(self, default: T) -> T {
        self.ready().unwrap_or(default)
    }
}

impl<T> From<Result<T, CellError>> for Loadable<T> {
    fn from(result: Result<T, CellError>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(CellError::Pending(_)) => Self::Pending,
            Err(error) => Self::Failed(error),
        }
    }
}
