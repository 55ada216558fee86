//! [`Schedule`]: owns the set of [`JobScheduler`]s for one schedule
//! instance.

use crate::clock::Clock;
use crate::error::{MomoError, Result};
use crate::handler::Handler;
use crate::interval;
use crate::job::{JobDefinition, JobDescription, JobResult, JobSpec, RunningStatus};
use crate::job_scheduler::JobScheduler;
use crate::ledger::ExecutionsLedger;
use crate::ping::SchedulePing;
use crate::store::JobStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Which jobs `Schedule::count` should count.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountFilter {
    pub started: Option<bool>,
}

/// One schedule instance: a logical grouping of jobs co-located on one
/// running process, identified by a freshly-generated `schedule_id`.
pub struct Schedule {
    schedule_id: String,
    store: Arc<dyn JobStore>,
    ledger: Arc<dyn ExecutionsLedger>,
    clock: Arc<dyn Clock>,
    /// name -> (scheduler, started?)
    schedulers: RwLock<HashMap<String, (JobScheduler, bool)>>,
    /// Set once by `MomoSchedule::connect` after construction, since the
    /// ping's `startAllJobs` callback needs an `Arc<Schedule>` to call
    /// back into — see [`crate::connect`].
    ping: Mutex<Option<SchedulePing>>,
}

impl Schedule {
    pub(crate) fn new(
        schedule_id: impl Into<String>,
        store: Arc<dyn JobStore>,
        ledger: Arc<dyn ExecutionsLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            store,
            ledger,
            clock,
            schedulers: RwLock::new(HashMap::new()),
            ping: Mutex::new(None),
        }
    }

    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }

    pub(crate) async fn attach_ping(&self, ping: SchedulePing) {
        *self.ping.lock().await = Some(ping);
    }

    /// Define (or redefine) a job. Validates that `spec.interval` parses,
    /// upserts the definition in the Job Store, and replaces any existing
    /// `JobScheduler` for this name — fully stopping the old one (draining
    /// its pending executions) before the new one becomes callable.
    ///
    /// Redefining a name that is currently started is rejected with
    /// `JobAlreadyScheduled`: the caller must `stop()` it first. A name that
    /// was never defined, or was defined but never started (or already
    /// stopped), is a full replace as above.
    pub async fn define_job(&self, spec: JobSpec, handler: Arc<dyn Handler>) -> Result<()> {
        if spec.concurrency == 0 {
            return Err(MomoError::InvalidConcurrency {
                name: spec.name.clone(),
                value: spec.concurrency as i64,
            });
        }
        let interval_ms = interval::parse_interval(&spec.interval)?;

        let previous = {
            let schedulers = self.schedulers.read().await;
            schedulers.get(&spec.name).cloned()
        };
        if let Some((_, started)) = &previous {
            if *started {
                return Err(MomoError::JobAlreadyScheduled(spec.name));
            }
        }
        if let Some((old, _)) = previous {
            old.stop().await;
        }

        let existing = self.store.find_one(&spec.name).await?;
        let definition = JobDefinition {
            name: spec.name.clone(),
            interval: spec.interval.clone(),
            interval_ms,
            concurrency: spec.concurrency,
            max_running: spec.max_running,
            running: existing.as_ref().map(|j| j.running).unwrap_or(0),
            immediate: spec.immediate,
            execution_info: existing.and_then(|j| j.execution_info),
        };
        self.store.save(definition).await?;

        let scheduler = JobScheduler::new(
            spec.name.clone(),
            self.schedule_id.clone(),
            self.store.clone(),
            self.ledger.clone(),
            self.clock.clone(),
            handler,
        );
        self.schedulers
            .write()
            .await
            .insert(spec.name, (scheduler, false));
        Ok(())
    }

    /// Stop the scheduler for `name` (draining pending executions) and
    /// delete its definition from the Job Store.
    pub async fn remove_job(&self, name: &str) -> Result<()> {
        let removed = self.schedulers.write().await.remove(name);
        if let Some((scheduler, _)) = removed {
            scheduler.stop().await;
        }
        self.store.delete(name).await
    }

    pub async fn start(&self, name: &str) -> Result<()> {
        let scheduler = self.get_scheduler(name).await?;
        scheduler.start().await?;
        self.mark_started(name, true).await;
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        let scheduler = self.get_scheduler(name).await?;
        scheduler.stop().await;
        self.mark_started(name, false).await;
        Ok(())
    }

    /// Start every known job. Called by the Schedule Ping when this
    /// instance newly becomes the active holder of its schedule name.
    pub async fn start_all(&self) {
        let names: Vec<String> = self.schedulers.read().await.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.start(&name).await {
                tracing::error!(job = %name, error = %e, "failed to start job");
            }
        }
    }

    pub async fn stop_all(&self) {
        let names: Vec<String> = self.schedulers.read().await.keys().cloned().collect();
        for name in names {
            let _ = self.stop(&name).await;
        }
    }

    /// Stop every job and forget this instance's local `JobScheduler`s,
    /// without deleting their definitions from the Job Store.
    pub async fn cancel(&self) {
        self.stop_all().await;
        self.schedulers.write().await.clear();
    }

    pub async fn list(&self) -> Result<Vec<JobDescription>> {
        let definitions = self.store.list().await?;
        let schedulers = self.schedulers.read().await;
        Ok(definitions
            .into_iter()
            .map(|def| describe(def, &schedulers))
            .collect())
    }

    pub async fn get(&self, name: &str) -> Result<Option<JobDescription>> {
        let def = self.store.find_one(name).await?;
        let schedulers = self.schedulers.read().await;
        Ok(def.map(|def| describe(def, &schedulers)))
    }

    pub async fn count(&self, filter: CountFilter) -> usize {
        let schedulers = self.schedulers.read().await;
        match filter.started {
            None => schedulers.len(),
            Some(started) => schedulers.values().filter(|(_, s)| *s == started).count(),
        }
    }

    /// Run a job once, bypassing its timer.
    pub async fn run(&self, name: &str) -> Result<JobResult> {
        let scheduler = self.get_scheduler(name).await?;
        Ok(scheduler.execute_once().await)
    }

    /// Stop every job, stop contributing heartbeats, and delete this
    /// instance's own ledger entry.
    pub async fn disconnect(&self) -> Result<()> {
        self.stop_all().await;
        if let Some(ping) = self.ping.lock().await.take() {
            ping.stop().await;
        } else {
            self.ledger.delete_one(&self.schedule_id).await?;
        }
        Ok(())
    }

    async fn get_scheduler(&self, name: &str) -> Result<JobScheduler> {
        self.schedulers
            .read()
            .await
            .get(name)
            .map(|(s, _)| s.clone())
            .ok_or_else(|| MomoError::JobNotFound(name.to_string()))
    }

    async fn mark_started(&self, name: &str, started: bool) {
        if let Some(entry) = self.schedulers.write().await.get_mut(name) {
            entry.1 = started;
        }
    }
}

fn describe(
    def: JobDefinition,
    schedulers: &HashMap<String, (JobScheduler, bool)>,
) -> JobDescription {
    let status = schedulers.get(&def.name).and_then(|(_, started)| {
        started.then(|| RunningStatus {
            interval: def.interval.clone(),
            running: def.running,
        })
    });
    JobDescription {
        name: def.name,
        interval: def.interval,
        concurrency: def.concurrency,
        max_running: def.max_running,
        immediate: def.immediate,
        status,
    }
}
