//! The Schedule Ping: a liveness beacon that marks its schedule alive in
//! the Executions Ledger, detects stale peers, and triggers job takeover.
//!
//! `Schedule` owning a `SchedulePing` that calls back into
//! `Schedule::start_all` would be a cyclic reference, so the ping is
//! instead handed a nullary callback at construction rather than a
//! back-reference to the schedule that owns it.

use crate::clock::Clock;
use crate::ledger::ExecutionsLedger;
use crate::timer::{self, PendingTicks, TimerAction, TimerHandle};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// A boxed, cloneable nullary async callback.
pub type StartAllJobs = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Inner {
    schedule_id: String,
    name: String,
    ledger: Arc<dyn ExecutionsLedger>,
    clock: Arc<dyn Clock>,
    ping_interval: Duration,
    start_all_jobs: StartAllJobs,
    /// Whether this instance was the active holder as of the previous
    /// tick, so we can detect the not-active -> active transition that
    /// triggers `start_all_jobs()`.
    was_active: AtomicBool,
}

/// Owns the periodic liveness timer for one schedule instance.
///
/// State machine: `idle` --start()--> `active` (timer armed) --stop()-->
/// `draining` (own ledger entry deleted, timer cancelled, pending tick
/// awaited) --> `idle`.
pub struct SchedulePing {
    inner: Arc<Inner>,
    timer: Mutex<Option<TimerHandle>>,
    pending: PendingTicks,
}

impl SchedulePing {
    pub fn new(
        schedule_id: impl Into<String>,
        name: impl Into<String>,
        ledger: Arc<dyn ExecutionsLedger>,
        clock: Arc<dyn Clock>,
        ping_interval: Duration,
        start_all_jobs: StartAllJobs,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                schedule_id: schedule_id.into(),
                name: name.into(),
                ledger,
                clock,
                ping_interval,
                start_all_jobs,
                was_active: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// `idle` -> `active`: arm the tick timer. The first tick fires after
    /// one full `ping_interval` — unlike a job timer, a liveness beacon has
    /// no `immediate` option, since there is nothing useful to report
    /// before the schedule has had a chance to beat at least once.
    pub async fn start(&self) {
        let inner = self.inner.clone();
        let action: TimerAction = Arc::new(move || {
            let inner = inner.clone();
            Box::pin(async move { inner.tick().await }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let handle = timer::start(
            self.inner.ping_interval,
            self.inner.ping_interval,
            action,
            self.pending.clone(),
        );
        *self.timer.lock().await = Some(handle);
    }

    /// `active` -> `draining` -> `idle`: cancel the timer, await any
    /// in-flight tick (already registered in `pending` the moment it fired,
    /// so this can't race a tick that just started), then delete this
    /// instance's own ledger entry.
    pub async fn stop(&self) {
        let handle = self.timer.lock().await.take();
        if let Some(mut handle) = handle {
            handle.stop().await;
        }
        {
            let mut pending = self.pending.lock().await;
            while pending.join_next().await.is_some() {}
        }
        if let Err(e) = self.inner.ledger.delete_one(&self.inner.schedule_id).await {
            tracing::warn!(
                schedule_id = %self.inner.schedule_id,
                error = %e,
                "pinging or cleaning the schedules repository failed"
            );
        }
        self.inner.was_active.store(false, Ordering::SeqCst);
    }
}

impl Inner {
    /// One liveness tick: check activation, beat, sweep dead peers. Every
    /// failure along the way is caught and logged — a ping loop never
    /// propagates an error to its caller.
    async fn tick(&self) {
        let now = self.clock.now();
        let liveness_window_ms = 2 * self.ping_interval.as_millis() as u64;

        let is_active = match self
            .ledger
            .is_active_schedule(&self.schedule_id, &self.name, now, liveness_window_ms)
            .await
        {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(
                    schedule_id = %self.schedule_id,
                    error = %e,
                    "pinging or cleaning the schedules repository failed"
                );
                return;
            }
        };

        if is_active && !self.was_active.swap(is_active, Ordering::SeqCst) {
            (self.start_all_jobs)().await;
        } else {
            self.was_active.store(is_active, Ordering::SeqCst);
        }

        if let Err(e) = self.ledger.ping(&self.schedule_id, now).await {
            tracing::warn!(
                schedule_id = %self.schedule_id,
                error = %e,
                "pinging or cleaning the schedules repository failed"
            );
            return;
        }

        match self
            .ledger
            .delete_dead(&self.name, now, liveness_window_ms)
            .await
        {
            Ok(dead) if !dead.is_empty() => {
                tracing::info!(name = %self.name, dead = ?dead, "deleted stale schedule entries");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    name = %self.name,
                    error = %e,
                    "pinging or cleaning the schedules repository failed"
                );
            }
        }
    }
}
