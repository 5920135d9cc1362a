use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::item::{AttemptOutcome, FailureKind, TaskResult, TaskStatus};

/// Lifecycle of a single work item.
///
/// PENDING → IN_PROGRESS → SUCCESS
/// PENDING → IN_PROGRESS → RETRYING → IN_PROGRESS → … → FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    Pending,
    InProgress,
    Retrying,
    Success,
    Failed,
    Cancelled,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemState::Success | ItemState::Failed | ItemState::Cancelled
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Pending => write!(f, "PENDING"),
            ItemState::InProgress => write!(f, "IN_PROGRESS"),
            ItemState::Retrying => write!(f, "RETRYING"),
            ItemState::Success => write!(f, "SUCCESS"),
            ItemState::Failed => write!(f, "FAILED"),
            ItemState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// The result of recording an attempt outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Run another attempt. `next_attempt` is its 1-based number.
    Retry {
        next_attempt: u32,
        reason: FailureKind,
    },
    /// The item reached a terminal state.
    Complete(TaskStatus),
}

/// Drives one work item through its retry budget.
///
/// Owned by exactly one worker slot for the item's whole lifetime, so none of
/// this needs synchronisation.
#[derive(Debug)]
pub struct RetryController {
    item_id: String,
    max_retries: u32,
    state: ItemState,
    state_history: Vec<ItemState>,
    attempts: u32,
    data: Option<Value>,
    last_error: Option<String>,
    validation_errors: Vec<String>,
}

impl RetryController {
    pub fn new(item_id: impl Into<String>, max_retries: u32) -> Self {
        Self {
            item_id: item_id.into(),
            max_retries,
            state: ItemState::Pending,
            state_history: Vec::new(),
            attempts: 0,
            data: None,
            last_error: None,
            validation_errors: Vec::new(),
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Every state the item has left, in order.
    pub fn state_history(&self) -> &[ItemState] {
        &self.state_history
    }

    /// Enter IN_PROGRESS for the next attempt and return its 1-based number.
    ///
    /// Returns `None` when no attempt may start: the item is terminal or an
    /// attempt is already running.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        match self.state {
            ItemState::Pending | ItemState::Retrying => {
                self.move_to(ItemState::InProgress);
                self.attempts += 1;
                Some(self.attempts)
            }
            _ => None,
        }
    }

    /// Record the outcome of the attempt currently in progress.
    ///
    /// A terminal item ignores further outcomes and keeps its status.
    pub fn record(&mut self, outcome: AttemptOutcome) -> Transition {
        if let Some(status) = self.terminal_status() {
            return Transition::Complete(status);
        }
        debug_assert_eq!(self.state, ItemState::InProgress);

        match outcome {
            AttemptOutcome::Valid(data) => {
                self.data = Some(data);
                self.last_error = None;
                self.move_to(ItemState::Success);
                Transition::Complete(TaskStatus::Success)
            }
            AttemptOutcome::Invalid(reason) => {
                self.note_failure(&reason);
                // Budget is max_retries + 1 attempts, capped at u32::MAX.
                if self.attempts < self.max_retries.saturating_add(1) {
                    self.move_to(ItemState::Retrying);
                    Transition::Retry {
                        next_attempt: self.attempts + 1,
                        reason,
                    }
                } else {
                    self.move_to(ItemState::Failed);
                    Transition::Complete(TaskStatus::Failed)
                }
            }
        }
    }

    /// Settle the item without any further attempts.
    ///
    /// Used on cancellation: an item that never ran becomes CANCELLED, one
    /// that already failed at least once becomes FAILED with its last error.
    pub fn abandon(&mut self) -> Transition {
        if let Some(status) = self.terminal_status() {
            return Transition::Complete(status);
        }
        if self.attempts == 0 {
            self.move_to(ItemState::Cancelled);
            Transition::Complete(TaskStatus::Cancelled)
        } else {
            if self.last_error.is_none() {
                self.last_error = Some("abandoned before the attempt was recorded".into());
            }
            self.move_to(ItemState::Failed);
            Transition::Complete(TaskStatus::Failed)
        }
    }

    /// Consume the controller and produce the item's terminal result.
    pub fn into_result(mut self) -> TaskResult {
        let status = match self.abandon() {
            Transition::Complete(status) => status,
            Transition::Retry { .. } => TaskStatus::Failed,
        };
        TaskResult {
            id: self.item_id,
            status,
            data: if status == TaskStatus::Success {
                self.data
            } else {
                None
            },
            last_error: if status == TaskStatus::Failed {
                self.last_error
            } else {
                None
            },
            attempts: self.attempts,
            validation_errors: self.validation_errors,
        }
    }

    fn terminal_status(&self) -> Option<TaskStatus> {
        match self.state {
            ItemState::Success => Some(TaskStatus::Success),
            ItemState::Failed => Some(TaskStatus::Failed),
            ItemState::Cancelled => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    fn note_failure(&mut self, reason: &FailureKind) {
        if let FailureKind::Validation(errors) = reason {
            for error in errors {
                if !self.validation_errors.contains(error) {
                    self.validation_errors.push(error.clone());
                }
            }
        }
        self.last_error = Some(reason.to_string());
    }

    fn move_to(&mut self, next: ItemState) {
        self.state_history.push(self.state);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invalid(msg: &str) -> AttemptOutcome {
        AttemptOutcome::Invalid(FailureKind::Validation(vec![msg.to_string()]))
    }

    #[test]
    fn first_attempt_success() {
        let mut ctl = RetryController::new("a", 2);
        assert_eq!(ctl.state(), ItemState::Pending);
        assert_eq!(ctl.begin_attempt(), Some(1));
        assert_eq!(ctl.state(), ItemState::InProgress);

        let t = ctl.record(AttemptOutcome::Valid(json!({"ok": true})));
        assert_eq!(t, Transition::Complete(TaskStatus::Success));
        assert_eq!(
            ctl.state_history(),
            &[ItemState::Pending, ItemState::InProgress]
        );

        let result = ctl.into_result();
        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.data, Some(json!({"ok": true})));
        assert!(result.last_error.is_none());
    }

    #[test]
    fn unbounded_retry_budget_settles_at_counter_limit() {
        let mut ctl = RetryController::new("a", u32::MAX);
        ctl.state = ItemState::Retrying;
        ctl.attempts = u32::MAX - 1;

        assert_eq!(ctl.begin_attempt(), Some(u32::MAX));
        let t = ctl.record(invalid("still wrong"));
        assert_eq!(t, Transition::Complete(TaskStatus::Failed));
        assert_eq!(ctl.begin_attempt(), None);
        assert_eq!(ctl.into_result().attempts, u32::MAX);
    }

    #[test]
    fn retries_then_fails_after_budget() {
        let mut ctl = RetryController::new("a", 2);

        ctl.begin_attempt();
        let t = ctl.record(invalid("missing required field 'title'"));
        assert!(matches!(t, Transition::Retry { next_attempt: 2, .. }));
        assert_eq!(ctl.state(), ItemState::Retrying);

        assert_eq!(ctl.begin_attempt(), Some(2));
        let t = ctl.record(AttemptOutcome::Invalid(FailureKind::Capability(
            "timed out".into(),
        )));
        assert!(matches!(t, Transition::Retry { next_attempt: 3, .. }));

        assert_eq!(ctl.begin_attempt(), Some(3));
        let t = ctl.record(invalid("field 'score' must be a number"));
        assert_eq!(t, Transition::Complete(TaskStatus::Failed));
        assert_eq!(ctl.begin_attempt(), None);

        let result = ctl.into_result();
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.attempts, 3);
        assert_eq!(
            result.last_error.as_deref(),
            Some("Validation failed: field 'score' must be a number")
        );
        assert_eq!(
            result.validation_errors,
            vec![
                "missing required field 'title'".to_string(),
                "field 'score' must be a number".to_string(),
            ]
        );
        assert!(result.data.is_none());
    }

    #[test]
    fn zero_retries_fails_immediately() {
        let mut ctl = RetryController::new("a", 0);
        ctl.begin_attempt();
        let t = ctl.record(invalid("bad"));
        assert_eq!(t, Transition::Complete(TaskStatus::Failed));
        assert_eq!(ctl.attempts(), 1);
    }

    #[test]
    fn retry_then_succeed_clears_last_error() {
        let mut ctl = RetryController::new("a", 3);
        ctl.begin_attempt();
        ctl.record(invalid("could not parse output"));
        ctl.begin_attempt();
        let t = ctl.record(AttemptOutcome::Valid(json!({"x": 1})));
        assert_eq!(t, Transition::Complete(TaskStatus::Success));

        let result = ctl.into_result();
        assert_eq!(result.attempts, 2);
        assert!(result.last_error.is_none());
        assert_eq!(result.validation_errors, vec!["could not parse output"]);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut ctl = RetryController::new("a", 5);
        ctl.begin_attempt();
        ctl.record(AttemptOutcome::Valid(json!(1)));

        let t = ctl.record(invalid("late"));
        assert_eq!(t, Transition::Complete(TaskStatus::Success));
        assert_eq!(ctl.abandon(), Transition::Complete(TaskStatus::Success));
        assert_eq!(ctl.state(), ItemState::Success);
        assert_eq!(ctl.attempts(), 1);
    }

    #[test]
    fn abandon_before_any_attempt_is_cancelled() {
        let mut ctl = RetryController::new("a", 1);
        assert_eq!(ctl.abandon(), Transition::Complete(TaskStatus::Cancelled));
        let result = ctl.into_result();
        assert_eq!(result.status, TaskStatus::Cancelled);
        assert_eq!(result.attempts, 0);
    }

    #[test]
    fn abandon_while_retrying_is_failed_with_last_error() {
        let mut ctl = RetryController::new("a", 3);
        ctl.begin_attempt();
        ctl.record(AttemptOutcome::Invalid(FailureKind::Capability("503".into())));
        assert_eq!(ctl.abandon(), Transition::Complete(TaskStatus::Failed));

        let result = ctl.into_result();
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.last_error.as_deref(), Some("Capability failed: 503"));
    }

    #[test]
    fn state_display() {
        assert_eq!(ItemState::Pending.to_string(), "PENDING");
        assert_eq!(ItemState::InProgress.to_string(), "IN_PROGRESS");
        assert_eq!(ItemState::Retrying.to_string(), "RETRYING");
        assert_eq!(ItemState::Failed.to_string(), "FAILED");
    }
}
