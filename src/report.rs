//! Order-preserving aggregation of per-item results.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BatchError;
use crate::state_machine::{TaskResult, TaskStatus, WorkItem};

/// The single output of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub total: usize,
    pub success_count: usize,
    /// Includes cancelled items, so `success_count + failure_count == total`.
    pub failure_count: usize,
    pub cancelled_count: usize,
    /// One entry per input item, in input order.
    pub results: Vec<TaskResult>,
    /// Every distinct validation message across the batch, first-seen order.
    pub distinct_validation_errors: Vec<String>,
    pub total_execution_time_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Build a report from results that are already in input order.
    pub fn from_results(
        results: Vec<TaskResult>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        let cancelled_count = results
            .iter()
            .filter(|r| r.status == TaskStatus::Cancelled)
            .count();

        let distinct_validation_errors = {
            let mut seen = HashSet::new();
            results
                .iter()
                .flat_map(|r| r.validation_errors.iter())
                .filter(|e| seen.insert(e.as_str()))
                .cloned()
                .collect()
        };

        Self {
            total: results.len(),
            success_count,
            failure_count: results.len() - success_count,
            cancelled_count,
            results,
            distinct_validation_errors,
            total_execution_time_ms: elapsed.as_millis() as u64,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// True when every item reached SUCCESS. An empty batch is a success.
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Collects results as worker slots finish them and puts each one back at
/// its input position.
#[derive(Debug)]
pub struct Aggregator {
    slots: Vec<Option<TaskResult>>,
}

impl Aggregator {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Number of results received so far.
    pub fn received(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Indices that have no result yet, in input order.
    pub fn unfilled(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.is_none().then_some(index))
            .collect()
    }

    /// Place the result for the item at `index`.
    ///
    /// A second result for the same index means the claim cursor handed one
    /// item to two slots, which is an engine fault.
    pub fn insert(&mut self, index: usize, result: TaskResult) -> Result<(), BatchError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(BatchError::ResultOutOfRange { index, len })?;
        if slot.is_some() {
            return Err(BatchError::DuplicateResult { index });
        }
        *slot = Some(result);
        Ok(())
    }

    /// Close the batch. Items that never produced a result are reported as
    /// CANCELLED under their own id.
    pub fn finish(
        self,
        items: &[WorkItem],
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> ExecutionReport {
        debug_assert_eq!(items.len(), self.slots.len());
        let results = self
            .slots
            .into_iter()
            .zip(items)
            .map(|(slot, item)| slot.unwrap_or_else(|| TaskResult::cancelled(item.id.clone())))
            .collect();
        ExecutionReport::from_results(results, started_at, elapsed)
    }
}
