use thiserror::Error;

use crate::record::ItemId;

/// Coarse classification of [`TreeError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed something the operation cannot act on.
    InvalidArgument,
    /// The flat view could not be reconciled with a tree event.
    Integrity,
    /// A mutation was issued while observers were still being notified.
    Reentrancy,
}

/// Errors produced by tree mutations and by the flattener.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Object to wrap was null")]
    NullRecord,

    #[error("expected a JSON object for a record, got {found}")]
    NotAnObject { found: &'static str },

    #[error("Cannot move an item under itself")]
    MoveUnderItself,

    #[error("handle has no parent")]
    NoParent,

    #[error("record is no longer a child of the handle's parent")]
    NotAChild,

    #[error("Could not find parent for item ID {0}")]
    UnknownId(ItemId),

    #[error("Could not find matching parent in the flat view")]
    MissingParent,

    #[error("flat view out of sync: no row for child {index} at depth {depth}")]
    Desynchronized { index: usize, depth: usize },

    #[error(
        "subtree at flat index {at} spans {found} rows, expected {expected}"
    )]
    SubtreeLengthMismatch {
        at: usize,
        expected: usize,
        found: usize,
    },

    #[error("tree mutated from inside an observer callback")]
    Reentrant,
}

impl TreeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TreeError::NullRecord
            | TreeError::NotAnObject { .. }
            | TreeError::MoveUnderItself
            | TreeError::NoParent
            | TreeError::NotAChild
            | TreeError::UnknownId(_) => ErrorKind::InvalidArgument,
            TreeError::MissingParent
            | TreeError::Desynchronized { .. }
            | TreeError::SubtreeLengthMismatch { .. } => ErrorKind::Integrity,
            TreeError::Reentrant => ErrorKind::Reentrancy,
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
