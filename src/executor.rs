//! The Job Executor: runs one invocation of a job handler and accounts for
//! it.

use crate::clock::Clock;
use crate::error::Result as MomoResult;
use crate::handler::Handler;
use crate::job::{ExecutionInfo, JobDefinition, Outcome};
use crate::ledger::ExecutionsLedger;
use crate::store::JobStore;
use std::sync::Arc;

/// The result of one executor invocation: the settled [`Outcome`] plus how
/// many bookkeeping steps failed unexpectedly along the way. The scheduler
/// adds `unexpected_errors` to its own counter — it never affects the
/// returned `outcome` or future scheduling decisions.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: Outcome,
    pub unexpected_errors: u32,
}

/// Releases the `running` counters in the Job Store and Executions Ledger.
///
/// Constructed only after the increment succeeds, so its existence is the
/// invariant "an increment happened that needs balancing". `release()` is
/// the normal, explicit path. `Drop` is the guaranteed path: if the task
/// holding this guard is cancelled or panics before calling `release()`,
/// `Drop` spawns the same decrement as a detached task so the counters
/// still settle — async cleanup can't run inside `Drop` itself, but
/// scheduling it can.
struct RunningGuard {
    store: Arc<dyn JobStore>,
    ledger: Arc<dyn ExecutionsLedger>,
    schedule_id: String,
    job_name: String,
    defused: bool,
}

impl RunningGuard {
    async fn release(mut self) {
        self.defused = true;
        let _ = self.store.decrement_running(&self.job_name).await;
        let _ = self.ledger.decrement_execution(&self.schedule_id, &self.job_name).await;
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.defused {
            return;
        }
        let store = self.store.clone();
        let ledger = self.ledger.clone();
        let schedule_id = std::mem::take(&mut self.schedule_id);
        let job_name = std::mem::take(&mut self.job_name);
        tokio::spawn(async move {
            let _ = store.decrement_running(&job_name).await;
            let _ = ledger.decrement_execution(&schedule_id, &job_name).await;
        });
    }
}

/// Run one invocation of `job`'s handler: check the cluster cap, increment
/// the running counters, invoke the handler, then release the counters and
/// record execution info no matter how the handler settled.
pub async fn execute(
    store: &Arc<dyn JobStore>,
    ledger: &Arc<dyn ExecutionsLedger>,
    clock: &Arc<dyn Clock>,
    schedule_id: &str,
    handler: &Arc<dyn Handler>,
    job: &JobDefinition,
) -> ExecutionReport {
    let mut unexpected_errors = 0;

    // Step 1: cluster cap check, then increment both counters.
    if job.max_running > 0 {
        match ledger.count_running(&job.name).await {
            Ok(current) if current >= job.max_running => {
                return ExecutionReport {
                    outcome: Outcome::MaxRunningReached,
                    unexpected_errors,
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(job = %job.name, error = %e, "failed to read cluster running count");
                unexpected_errors += 1;
                return ExecutionReport {
                    outcome: Outcome::failed(format!("count_running failed: {e}")),
                    unexpected_errors,
                };
            }
        }
    }

    if let Err(e) = store.increment_running(&job.name).await {
        tracing::error!(job = %job.name, error = %e, "failed to increment store running count");
        return ExecutionReport {
            outcome: Outcome::failed(format!("increment_running failed: {e}")),
            unexpected_errors: unexpected_errors + 1,
        };
    }
    if let Err(e) = ledger.increment_execution(schedule_id, &job.name).await {
        tracing::warn!(job = %job.name, error = %e, "failed to increment ledger execution count");
        unexpected_errors += 1;
    }

    let guard = RunningGuard {
        store: store.clone(),
        ledger: ledger.clone(),
        schedule_id: schedule_id.to_string(),
        job_name: job.name.clone(),
        defused: false,
    };

    // Step 2: record the start timestamp.
    let started = clock.now();
    if let Err(e) = update_info(store, &job.name, Some(started), previous_finished(job), previous_outcome(job)).await
    {
        tracing::warn!(job = %job.name, error = %e, "failed to record execution start");
        unexpected_errors += 1;
    }

    // Step 3: invoke the handler.
    let outcome = match handler.call().await {
        Ok(()) => Outcome::Finished,
        Err(message) => Outcome::failed(message),
    };

    // Step 4: guaranteed release, then record the finish.
    guard.release().await;

    let finished = clock.now();
    if let Err(e) = update_info(store, &job.name, Some(started), Some(finished), Some(outcome.clone())).await {
        tracing::warn!(job = %job.name, error = %e, "failed to record execution finish");
        unexpected_errors += 1;
    }

    ExecutionReport {
        outcome,
        unexpected_errors,
    }
}

fn previous_finished(job: &JobDefinition) -> Option<jiff::Timestamp> {
    job.execution_info.as_ref().and_then(|i| i.last_finished)
}

fn previous_outcome(job: &JobDefinition) -> Option<Outcome> {
    job.execution_info.as_ref().and_then(|i| i.last_outcome.clone())
}

async fn update_info(
    store: &Arc<dyn JobStore>,
    name: &str,
    last_started: Option<jiff::Timestamp>,
    last_finished: Option<jiff::Timestamp>,
    last_outcome: Option<Outcome>,
) -> MomoResult<()> {
    store
        .update_execution_info(
            name,
            ExecutionInfo {
                last_started,
                last_finished,
                last_outcome,
            },
        )
        .await
}
