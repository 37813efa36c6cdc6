// ⚠️ Tree Errors - Everything a tree operation can refuse
// Operations fail fast: when one of these is returned the document is unchanged

use thiserror::Error;

use crate::tree::node::{EntryKey, NodeId};

/// Errors raised by the template tree store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A node id (node, parent or drop target) is not present in the document
    #[error("node `{id}` not found")]
    NotFound { id: NodeId },

    /// An entry key is not present in the document
    #[error("entry {key} not found")]
    EntryNotFound { key: EntryKey },

    /// Attempt to delete a node that only exists because an ancestor was cloned
    #[error("cannot delete a clone child `{id}`; delete the original `{original}` instead")]
    InvalidDelete { id: NodeId, original: NodeId },

    /// The mutation would leave the document breaking one of its invariants
    #[error("invariant violated: {reason}")]
    InvariantViolation { reason: String },

    /// Update payload targets a different node kind (funding line vs calculation)
    #[error("node `{id}` is a {actual}, update carries a {expected}")]
    KindMismatch {
        id: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    /// Structural rule broken (e.g. a funding line placed under a calculation)
    #[error("invalid structure: {reason}")]
    InvalidStructure { reason: String },

    /// Move would place a node inside its own subtree or under a removed branch
    #[error("cannot move `{id}`: {reason}")]
    InvalidMove { id: NodeId, reason: String },
}

impl TreeError {
    pub fn not_found(id: &NodeId) -> Self {
        TreeError::NotFound { id: id.clone() }
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        TreeError::InvariantViolation {
            reason: reason.into(),
        }
    }
}

pub type TreeResult<T> = Result<T, TreeError>;

// ============================================================================
// TESTS
// ============================================================================
