//! Error types for tasks and the dispatcher.

/// Error returned by a routine step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    /// An input the behavior depends on was not available this tick.
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    /// The behavior cannot continue.
    #[error("{0}")]
    Failed(String),
}

/// Why a chain was dropped before finishing on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainFault {
    /// A routine in the chain returned an error.
    #[error("task `{task}` failed: {source}")]
    Failed {
        /// Task whose routine failed.
        task: String,
        /// The routine's error.
        source: TaskError,
    },

    /// A routine in the chain panicked.
    #[error("task `{task}` panicked: {message}")]
    Panicked {
        /// Task whose routine panicked.
        task: String,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Delegation went deeper than the configured limit within one tick.
    #[error("task `{task}` delegated past the depth limit of {max_depth}")]
    TooDeep {
        /// Task that attempted the delegation.
        task: String,
        /// Configured depth limit.
        max_depth: usize,
    },
}

/// Dispatcher errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher has been closed and accepts no more work.
    #[error("dispatcher is closed")]
    Closed,

    /// The task panicked while starting its first sequence and was not
    /// registered.
    #[error("task `{task}` panicked on execute: {message}")]
    ExecutePanicked {
        /// Task that was rejected.
        task: String,
        /// Panic payload, when it was a string.
        message: String,
    },
}
