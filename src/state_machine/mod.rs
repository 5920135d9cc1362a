mod item;
mod state;

pub use item::{
    Attempt, AttemptOutcome, FailureKind, RetryConfig, TaskResult, TaskStatus, WorkItem,
};
pub use state::{ItemState, RetryController, Transition};
