use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One unit of input. `id` is the correlation key used throughout the engine;
/// `payload` is passed to the capability untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub payload: Value,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Build an item with a freshly generated UUID v4 identifier.
    pub fn anonymous(payload: Value) -> Self {
        Self::new(Uuid::new_v4().to_string(), payload)
    }
}

/// Distinguishes between a bad answer and no answer.
/// Both consume retry budget in exactly the same way; only the diagnostic differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The capability answered but the output broke the structural contract.
    Validation(Vec<String>),
    /// The capability call itself failed (API error, timeout, network).
    Capability(String),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Validation(errors) => {
                write!(f, "Validation failed: {}", errors.join("; "))
            }
            FailureKind::Capability(msg) => write!(f, "Capability failed: {msg}"),
        }
    }
}

/// The result of one attempt, as seen by the retry controller.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Valid(Value),
    Invalid(FailureKind),
}

/// One execution of the capability plus validation for one item.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub item_id: String,
    /// 1-based.
    pub number: u32,
    /// Raw capability output, absent when the call itself failed.
    pub raw_output: Option<String>,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Valid(_))
    }

    /// Field-level validation messages for this attempt, empty when valid or
    /// when the capability failed before producing output.
    pub fn validation_errors(&self) -> &[String] {
        match &self.outcome {
            AttemptOutcome::Invalid(FailureKind::Validation(errors)) => errors,
            _ => &[],
        }
    }
}

/// Terminal status of a work item as it appears in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Success,
    Failed,
    /// Never claimed because the batch was cancelled first.
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "SUCCESS"),
            TaskStatus::Failed => write!(f, "FAILED"),
            TaskStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Per-item terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub attempts: u32,
    /// Distinct validation messages seen across this item's attempts, in
    /// first-seen order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

impl TaskResult {
    pub fn cancelled(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Cancelled,
            data: None,
            last_error: None,
            attempts: 0,
            validation_errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// Retry budget and the optional delay hook between attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts allowed after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff. Zero means retry
    /// immediately.
    #[serde(default)]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: 0,
        }
    }
}

impl RetryConfig {
    /// Total attempts allowed per item.
    pub fn budget(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the given retry using exponential backoff.
    /// delay = base_delay_ms * 2^(retry - 1)
    pub fn delay_for_retry(&self, retry: u32) -> u64 {
        let exp = retry.saturating_sub(1).min(32);
        self.base_delay_ms.saturating_mul(1u64 << exp)
    }
}
