//! Engine error taxonomy
//!
//! Every variant is a condition the caller can recover from: re-prompt on
//! `NoMatch`, report and skip on `MalformedNode`, and so on.

/// Error type for decision tree engine operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A node ID was looked up and is not in the node map
    #[error("node '{0}' not found")]
    NodeNotFound(String),

    /// An option points at a node that does not exist
    #[error("node '{from}' links to missing node '{target}'")]
    DanglingReference { from: String, target: String },

    /// A node ID is already taken
    #[error("node '{0}' already exists")]
    DuplicateId(String),

    /// A node has the wrong shape for the requested operation
    #[error("node '{id}' is malformed: {reason}")]
    MalformedNode { id: String, reason: String },

    /// Free-text input did not match any option well enough
    #[error("no option matches '{input}'")]
    NoMatch { input: String },

    /// A path with no steps, or a step_back with nothing to undo
    #[error("path is empty")]
    EmptyPath,

    /// The target tree has no nodes to merge into
    #[error("tree has no nodes")]
    EmptyTree,
}

impl EngineError {
    /// True for outcomes a caller normally answers by asking again
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::NoMatch { .. } | EngineError::EmptyPath)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
