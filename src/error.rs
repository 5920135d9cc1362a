use thiserror::Error;

use crate::anthropic::AnthropicError;

/// Errors that cross the engine's public boundary.
///
/// Per-item failures never show up here; they are recorded as data in the
/// [`ExecutionReport`](crate::report::ExecutionReport).
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Duplicate result for item index {index}")]
    DuplicateResult { index: usize },

    #[error("Result index {index} is outside a batch of {len} items")]
    ResultOutOfRange { index: usize, len: usize },

    #[error("Worker slot panicked: {0}")]
    WorkerPanicked(String),
}

/// Failure of a single capability call. Always recoverable from the engine's
/// point of view.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("capability returned an empty response")]
    EmptyResponse,

    #[error("{0}")]
    Anthropic(#[from] AnthropicError),

    #[error("{0}")]
    Other(String),
}
