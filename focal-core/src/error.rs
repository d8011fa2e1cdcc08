//! Store Errors
//!
//! Every failure a read or write can surface. Errors are cached against the
//! (cell, scope) entry that produced them and handed back to every reader
//! until the next write invalidates the entry, so `CellError` is `Clone`.

use std::fmt::Display;
use std::sync::Arc;

use crate::optics::FocusError;
use crate::reactive::CellId;

/// Errors produced while reading or writing cells.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CellError {
    /// The cell (or one of its dependencies) has not settled yet.
    ///
    /// This is the suspension marker seen from inside read functions: it
    /// propagates through `?` and turns the reading cell pending as well.
    #[error("cell {0} has not settled yet")]
    Pending(CellId),

    /// An optic could not focus the current upstream value.
    #[error(transparent)]
    Focus(#[from] FocusError),

    /// A read or write function reported a failure.
    #[error("cell computation failed: {message}")]
    Failed { cell: Option<CellId>, message: Arc<str> },

    /// The cell has no write function.
    #[error("cell {0} is read-only")]
    ReadOnly(CellId),

    /// The cell read itself while it was being computed.
    #[error("dependency cycle through cell {0}")]
    Cycle(CellId),

    /// A stored value did not have the type the cell declares.
    #[error("cell {0} holds a value of an unexpected type")]
    TypeMismatch(CellId),

    /// The entry was disposed while an operation referenced it.
    #[error("cell {0} was disposed")]
    Disposed(CellId),
}

impl CellError {
    /// Build an upstream failure from any displayable error.
    pub fn failure(message: impl Display) -> Self {
        Self::Failed {
            cell: None,
            message: message.to_string().into(),
        }
    }

    /// Attribute an anonymous failure to the cell that raised it.
    pub(crate) fn attributed(self, id: CellId) -> Self {
        match self {
            Self::Failed { cell: None, message } => Self::Failed {
                cell: Some(id),
                message,
            },
            other => other,
        }
    }

    /// Whether this is the suspension marker rather than a real failure.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}
