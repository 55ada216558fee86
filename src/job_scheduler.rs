//! One [`JobScheduler`] per job per schedule instance: owns a timer,
//! decides how many concurrent executions to launch per tick, and drains
//! pending executions on stop.

use crate::clock::{millis_between, Clock};
use crate::error::{MomoError, Result};
use crate::executor;
use crate::handler::Handler;
use crate::interval;
use crate::job::{JobResult, Outcome};
use crate::ledger::ExecutionsLedger;
use crate::store::JobStore;
use crate::timer::{self, PendingTicks, TimerAction, TimerHandle};
use jiff::Timestamp;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

struct Inner {
    name: String,
    schedule_id: String,
    store: Arc<dyn JobStore>,
    ledger: Arc<dyn ExecutionsLedger>,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn Handler>,
    timer: Mutex<Option<TimerHandle>>,
    /// Every tick the timer has fired, registered the moment it fires (see
    /// `timer::start`). `stop()` drains this, so a tick that is still
    /// suspended loading the job definition when `stop()` is called is
    /// still awaited, not missed.
    pending: PendingTicks,
    unexpected_error_count: AtomicU64,
}

/// Per-(schedule, job) owner of one timer and its launched executions.
///
/// Cheaply `Clone`: all state lives behind the inner `Arc`, matching the
/// requirement that the timer's action closure hold a handle to the same
/// scheduler it was armed from.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(
        name: impl Into<String>,
        schedule_id: impl Into<String>,
        store: Arc<dyn JobStore>,
        ledger: Arc<dyn ExecutionsLedger>,
        clock: Arc<dyn Clock>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                schedule_id: schedule_id.into(),
                store,
                ledger,
                clock,
                handler,
                timer: Mutex::new(None),
                pending: Arc::new(Mutex::new(JoinSet::new())),
                unexpected_error_count: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Monotonically increasing count of unexpected errors encountered by
    /// ticks of this scheduler. Never affects scheduling.
    pub fn unexpected_error_count(&self) -> u64 {
        self.inner.unexpected_error_count.load(Ordering::Relaxed)
    }

    /// Arm the timer for this job. Stops any prior timer first, so calling
    /// `start()` twice without an intervening `stop()` still leaves exactly
    /// one active timer. A missing job definition is logged, not thrown
    /// (a missing job is absorbed here); an unparseable interval on the
    /// stored definition is a programmer error and is thrown.
    pub async fn start(&self) -> Result<()> {
        self.stop().await;

        let job = match self.inner.store.find_one(&self.inner.name).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job = %self.inner.name, "cannot start: job definition not found");
                return Ok(());
            }
            Err(e) => return Err(MomoError::Store(e.to_string())),
        };

        let interval_ms = interval::parse_interval(&job.interval)?;
        let now = self.inner.clock.now();
        let delay_ms = compute_delay_ms(interval_ms, job.immediate, job.last_finished(), now);

        let inner = self.inner.clone();
        let action: TimerAction = Arc::new(move || {
            let inner = inner.clone();
            Box::pin(async move { Inner::execute_concurrently(inner).await })
                as Pin<Box<dyn Future<Output = ()> + Send>>
        });

        let handle = timer::start(
            Duration::from_millis(delay_ms),
            Duration::from_millis(interval_ms.max(1)),
            action,
            self.inner.pending.clone(),
        );
        *self.inner.timer.lock().await = Some(handle);
        Ok(())
    }

    /// Cancel the timer and wait for every tick this scheduler has fired,
    /// and everything each of those ticks launched, to settle. A tick that
    /// fired just before the timer was cancelled is already registered in
    /// `pending` (the timer registers it atomically at dispatch time), so
    /// draining `pending` here can't race it. After this resolves, no new
    /// invocation originates from this scheduler until `start()` is called
    /// again.
    pub async fn stop(&self) {
        let handle = self.inner.timer.lock().await.take();
        if let Some(mut handle) = handle {
            handle.stop().await;
        }
        let mut pending = self.inner.pending.lock().await;
        while pending.join_next().await.is_some() {}
    }

    /// Bypass the timer and run the job once, returning its outcome.
    /// Intended for ad-hoc runs (`Schedule::run`).
    pub async fn execute_once(&self) -> JobResult {
        let job = match self.inner.store.find_one(&self.inner.name).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return JobResult {
                    name: self.inner.name.clone(),
                    status: Outcome::NotFound,
                };
            }
            Err(e) => {
                tracing::error!(job = %self.inner.name, error = %e, "failed to load job definition for execute_once");
                self.inner.unexpected_error_count.fetch_add(1, Ordering::Relaxed);
                return JobResult {
                    name: self.inner.name.clone(),
                    status: Outcome::NotFound,
                };
            }
        };

        let report = executor::execute(
            &self.inner.store,
            &self.inner.ledger,
            &self.inner.clock,
            &self.inner.schedule_id,
            &self.inner.handler,
            &job,
        )
        .await;

        if report.unexpected_errors > 0 {
            self.inner
                .unexpected_error_count
                .fetch_add(report.unexpected_errors as u64, Ordering::Relaxed);
        }

        JobResult {
            name: self.inner.name.clone(),
            status: report.outcome,
        }
    }
}

impl Inner {
    /// The periodic tick action: decide how many invocations to launch this
    /// tick, launch them into a tick-local join set, and wait for all of
    /// them to settle before returning. This function's own future is what
    /// the timer registers in the shared `pending` set, so a caller
    /// draining `pending` transitively waits for every invocation it
    /// launches, not just the tick itself.
    async fn execute_concurrently(self: Arc<Self>) {
        let job = match self.store.find_one(&self.name).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job = %self.name, "job definition missing, skipping tick");
                return;
            }
            Err(e) => {
                tracing::error!(job = %self.name, error = %e, "failed to load job definition for tick");
                self.unexpected_error_count.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let num_to_execute = if job.max_running == 0 {
            job.concurrency
        } else {
            let running = match self.ledger.count_running(&self.name).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(job = %self.name, error = %e, "failed to read cluster running count for tick");
                    self.unexpected_error_count.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            };
            job.concurrency.min(job.max_running.saturating_sub(running))
        };

        let mut invocations = JoinSet::new();
        for _ in 0..num_to_execute {
            let this = self.clone();
            let job = job.clone();
            invocations.spawn(async move {
                let report = executor::execute(
                    &this.store,
                    &this.ledger,
                    &this.clock,
                    &this.schedule_id,
                    &this.handler,
                    &job,
                )
                .await;
                if report.unexpected_errors > 0 {
                    this.unexpected_error_count
                        .fetch_add(report.unexpected_errors as u64, Ordering::Relaxed);
                }
            });
        }
        while invocations.join_next().await.is_some() {}
    }
}

/// The delay law: `max(0, interval - (now - lastFinished))` whenever a
/// prior execution exists, `0` for an immediate first run, or the full
/// `interval` otherwise.
pub(crate) fn compute_delay_ms(
    interval_ms: u64,
    immediate: bool,
    last_finished: Option<Timestamp>,
    now: Timestamp,
) -> u64 {
    match last_finished {
        None => {
            if immediate {
                0
            } else {
                interval_ms
            }
        }
        Some(last_finished) => {
            let elapsed = millis_between(last_finished, now).max(0) as u64;
            interval_ms.saturating_sub(elapsed)
        }
    }
}
