//! Error types for the reconciler

use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A state update arrived before anything was committed
    #[error("No committed tree: state updates require a mounted root")]
    NoCommittedTree,

    #[error("Work unit '{key}' not found in tree")]
    UnknownUnit { key: String },

    #[error("Transition '{key}' does not resolve to a work unit")]
    UnresolvedTransition { key: String },

    /// `replace_descendant` could not find the splice point for a unit's output
    #[error("Splice target '{key}' not found in output tree")]
    SpliceTargetMissing { key: String },

    #[error("Work unit '{key}' has no state slot {slot}")]
    StateSlot { key: String, slot: usize },

    #[error("State error: {0}")]
    State(#[source] serde_json::Error),

    #[error("Render of '{key}' failed: {message}")]
    Render { key: String, message: String },

    /// The reconciler owning the update channel is gone
    #[error("Update channel closed")]
    ChannelClosed,

    #[error("Host error: {0}")]
    Host(String),

    #[error("Config error: {0}")]
    Config(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconcileError {
    /// Invariant violations abort the current operation but never the process.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ReconcileError::NoCommittedTree
                | ReconcileError::UnknownUnit { .. }
                | ReconcileError::UnresolvedTransition { .. }
                | ReconcileError::SpliceTargetMissing { .. }
                | ReconcileError::StateSlot { .. }
        )
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(e: serde_json::Error) -> Self {
        ReconcileError::State(e)
    }
}
