//! One attempt for one work item: invoke, parse, validate.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::capability::Capability;
use crate::error::CapabilityError;
use crate::state_machine::{Attempt, AttemptOutcome, FailureKind, WorkItem};
use crate::validator::{StructuralContract, parse_candidate};

/// Everything an attempt needs besides the item and the capability.
/// Shared read-only by all worker slots.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub instruction: String,
    pub contract: StructuralContract,
    pub timeout: Option<Duration>,
}

/// Run exactly one attempt.
///
/// Never fails: capability errors, timeouts and contract violations all come
/// back as an invalid [`Attempt`].
pub async fn execute_attempt<C: Capability>(
    capability: &C,
    item: &WorkItem,
    number: u32,
    ctx: &AttemptContext,
) -> Attempt {
    let started = Instant::now();
    let call = capability.invoke(&item.payload, &ctx.instruction);
    let result = match ctx.timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            }),
        },
        None => call.await,
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let (raw_output, outcome) = match result {
        Ok(raw) => {
            let candidate = parse_candidate(&raw);
            let outcome = match ctx.contract.validate(candidate.as_ref()) {
                // validate() only accepts Some, so the candidate is present.
                Ok(()) => AttemptOutcome::Valid(candidate.unwrap_or_default()),
                Err(errors) => AttemptOutcome::Invalid(FailureKind::Validation(errors)),
            };
            (Some(raw), outcome)
        }
        Err(e) => (None, AttemptOutcome::Invalid(FailureKind::Capability(e.to_string()))),
    };

    debug!(
        item_id = %item.id,
        attempt = number,
        duration_ms = elapsed_ms,
        valid = matches!(outcome, AttemptOutcome::Valid(_)),
        "attempt finished"
    );

    Attempt {
        item_id: item.id.clone(),
        number,
        raw_output,
        outcome,
    }
}
