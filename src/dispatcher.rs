//! Bounded-concurrency dispatch of a batch.
//!
//! A fixed pool of worker slots shares one claim cursor over the input list.
//! Each slot claims the next index, drives that item through its retry
//! controller to a terminal result, sends the result to the aggregator, and
//! claims again until the list is exhausted or the batch is cancelled.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::config::EngineConfig;
use crate::error::BatchError;
use crate::executor::{AttemptContext, execute_attempt};
use crate::report::{Aggregator, ExecutionReport};
use crate::state_machine::{RetryConfig, RetryController, TaskResult, Transition, WorkItem};

/// Cooperative cancellation for one batch run.
///
/// Cancelling stops further claims and further retries. Attempts already in
/// flight run to completion; items that were never claimed are reported as
/// CANCELLED.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let notified = self.0.notify.notified();
        tokio::pin!(notified);
        // Register before reading the flag so a concurrent cancel is not lost.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Runs batches of work items against one capability.
///
/// Holds no state between runs apart from the configuration. Cancellation
/// is scoped to a single run through the [`CancelHandle`] passed to it.
pub struct Dispatcher<C> {
    capability: Arc<C>,
    ctx: Arc<AttemptContext>,
    retry: RetryConfig,
    concurrency: usize,
}

impl<C: Capability> Dispatcher<C> {
    /// Validate the configuration and build a dispatcher.
    ///
    /// Configuration errors surface here, before any item is touched.
    pub fn new(capability: C, config: &EngineConfig) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self {
            capability: Arc::new(capability),
            ctx: Arc::new(config.attempt_context()),
            retry: config.retry.clone(),
            concurrency: config.concurrency,
        })
    }

    /// Run a batch that cannot be cancelled from outside.
    pub async fn run(&self, items: Vec<WorkItem>) -> Result<ExecutionReport, BatchError> {
        self.run_with_observer(items, &CancelHandle::new(), |_| {})
            .await
    }

    /// Run a batch, calling `on_result` as each item settles (in completion
    /// order, unclaimed items last). The returned report is always in input
    /// order.
    pub async fn run_with_observer<F>(
        &self,
        items: Vec<WorkItem>,
        cancel: &CancelHandle,
        mut on_result: F,
    ) -> Result<ExecutionReport, BatchError>
    where
        F: FnMut(&TaskResult),
    {
        ensure_unique_ids(&items)?;

        let started = Instant::now();
        let started_at = Utc::now();
        let items: Arc<[WorkItem]> = items.into();
        let mut aggregator = Aggregator::new(items.len());

        if items.is_empty() {
            return Ok(aggregator.finish(&items, started_at, started.elapsed()));
        }

        let slots = self.concurrency.min(items.len());
        let cursor = Arc::new(AtomicUsize::new(0));
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for slot in 0..slots {
            let worker = Worker {
                slot,
                items: Arc::clone(&items),
                cursor: Arc::clone(&cursor),
                capability: Arc::clone(&self.capability),
                ctx: Arc::clone(&self.ctx),
                retry: self.retry.clone(),
                cancel: cancel.clone(),
                results: results_tx.clone(),
            };
            workers.spawn(worker.run());
        }
        // The channel closes once every worker has dropped its sender.
        drop(results_tx);

        info!(items = items.len(), slots, "batch dispatched");

        while let Some((index, result)) = results_rx.recv().await {
            on_result(&result);
            aggregator.insert(index, result)?;
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                return Err(BatchError::WorkerPanicked(e.to_string()));
            }
        }

        for index in aggregator.unfilled() {
            let result = TaskResult::cancelled(items[index].id.clone());
            on_result(&result);
            aggregator.insert(index, result)?;
        }

        let report = aggregator.finish(&items, started_at, started.elapsed());
        info!(
            total = report.total,
            succeeded = report.success_count,
            failed = report.failure_count,
            cancelled = report.cancelled_count,
            duration_ms = report.total_execution_time_ms,
            "batch finished"
        );
        Ok(report)
    }
}

fn ensure_unique_ids(items: &[WorkItem]) -> Result<(), BatchError> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(BatchError::Config(format!(
                "duplicate work item id '{}'",
                item.id
            )));
        }
    }
    Ok(())
}

/// One execution slot. Everything except the cursor is owned or read-only.
struct Worker<C> {
    slot: usize,
    items: Arc<[WorkItem]>,
    cursor: Arc<AtomicUsize>,
    capability: Arc<C>,
    ctx: Arc<AttemptContext>,
    retry: RetryConfig,
    cancel: CancelHandle,
    results: mpsc::UnboundedSender<(usize, TaskResult)>,
}

impl<C: Capability> Worker<C> {
    async fn run(self) {
        let mut processed = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                debug!(slot = self.slot, "batch cancelled, no further claims");
                break;
            }
            let index = self.cursor.fetch_add(1, Ordering::SeqCst);
            let Some(item) = self.items.get(index) else {
                break;
            };

            let result = self.process(item).await;
            processed += 1;
            if self.results.send((index, result)).is_err() {
                // Aggregator is gone; nobody is listening for more results.
                break;
            }
        }
        debug!(slot = self.slot, processed, "worker slot idle");
    }

    async fn process(&self, item: &WorkItem) -> TaskResult {
        let mut controller = RetryController::new(item.id.clone(), self.retry.max_retries);

        while let Some(number) = controller.begin_attempt() {
            let attempt = execute_attempt(self.capability.as_ref(), item, number, &self.ctx).await;

            match controller.record(attempt.outcome) {
                Transition::Complete(status) => {
                    debug!(slot = self.slot, item_id = %item.id, attempts = number, %status, "item settled");
                    break;
                }
                Transition::Retry {
                    next_attempt,
                    reason,
                } => {
                    if self.cancel.is_cancelled() {
                        warn!(item_id = %item.id, attempts = number, %reason, "batch cancelled, not retrying");
                        controller.abandon();
                        break;
                    }
                    let delay_ms = self.retry.delay_for_retry(number);
                    warn!(
                        item_id = %item.id,
                        attempt = number,
                        next_attempt,
                        budget = self.retry.budget(),
                        delay_ms,
                        %reason,
                        "attempt failed, retrying"
                    );
                    if delay_ms > 0 {
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                            _ = self.cancel.cancelled() => {
                                warn!(item_id = %item.id, attempts = number, "batch cancelled during retry delay");
                                controller.abandon();
                                break;
                            }
                        }
                    }
                }
            }
        }

        controller.into_result()
    }
}
