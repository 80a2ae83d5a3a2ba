use rookery_core::WorkflowVerificationError;
use rookery_storage::StoreError;

/// Errors surfaced by the scheduling engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Assign found no eligible process before the timeout elapsed
    #[error("no processes available")]
    NoProcessesAvailable,

    /// Workflow spec failed verification
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowVerificationError),

    /// Request is well-formed but semantically wrong
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller is not allowed to touch the target entity
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Command channel saturated; caller should back off
    #[error("command queue is full")]
    QueueFull,

    /// Engine is shutting down
    #[error("engine is shutting down")]
    ShuttingDown,

    /// Repository error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A command execution failed unexpectedly
    #[error("internal error: {0}")]
    Internal(String),
}
