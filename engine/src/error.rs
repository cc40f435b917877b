//! Error types for the Changeline engine.

use crate::{ChangeId, ConflictId, ResolutionType};
use thiserror::Error;

/// All possible errors from the Changeline engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Decoding errors
    #[error("invalid push message: {0}")]
    InvalidMessage(String),

    // Resolver errors
    #[error("conflict resolver opened without conflicts")]
    NoConflicts,

    #[error("resolution option not offered: {0}")]
    OptionNotOffered(ResolutionType),

    #[error("no resolution selected")]
    NoSelection,

    #[error("invalid merge input: {0}")]
    InvalidMergeInput(String),

    #[error("merged changes are required for MERGE and only allowed for MERGE")]
    MergedChangesMismatch,

    #[error("a resolution is already being submitted")]
    SubmissionPending,

    #[error("no resolution is being submitted")]
    NotSubmitting,

    #[error("missing outcome for conflict: {0}")]
    MissingOutcome(ConflictId),

    // History errors
    #[error("history item out of range: {0}")]
    HistoryIndexOutOfRange(usize),

    #[error("rollback not allowed for change: {0}")]
    RollbackNotAllowed(ChangeId),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
