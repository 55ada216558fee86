//! The Executions Ledger (the "Schedules Repository"): a shared record of
//! live schedule instances and per-job running counts, which binds the
//! liveness protocol to cap enforcement.

use crate::error::Result;
use async_trait::async_trait;
use jiff::Timestamp;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A live (or recently-live) schedule instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub schedule_id: String,
    pub name: String,
    pub last_alive: Timestamp,
    pub executions: HashMap<String, u32>,
}

#[async_trait]
pub trait ExecutionsLedger: Send + Sync {
    /// Register a new schedule instance, called once at `connect()`.
    async fn add_schedule(&self, schedule_id: &str, name: &str, now: Timestamp) -> Result<()>;

    /// Is `schedule_id` the active holder of `name`?
    ///
    /// Among entries sharing `name` whose `last_alive` is within
    /// `liveness_window_ms` of `now`, the winner is chosen by oldest
    /// `last_alive` first, then lexicographic `schedule_id`. This
    /// implementation reads then decides under a single lock held for the
    /// whole call, so election is atomic within one process; a real shared
    /// store only offers last-writer-wins on `last_alive`, so a true
    /// cluster race is possible. `start()`'s idempotence makes a spurious
    /// duplicate activation on the losing side harmless — see DESIGN.md.
    async fn is_active_schedule(
        &self,
        schedule_id: &str,
        name: &str,
        now: Timestamp,
        liveness_window_ms: u64,
    ) -> Result<bool>;

    /// Update `last_alive` to `now` for `schedule_id`.
    async fn ping(&self, schedule_id: &str, now: Timestamp) -> Result<()>;

    /// Remove this schedule instance's own entry (on disconnect).
    async fn delete_one(&self, schedule_id: &str) -> Result<()>;

    /// Remove entries matching `name` whose `last_alive` is older than
    /// `older_than_ms` relative to `now`. Returns the deleted schedule ids,
    /// for observability and tests.
    async fn delete_dead(&self, name: &str, now: Timestamp, older_than_ms: u64)
        -> Result<Vec<String>>;

    /// Cluster-wide count of currently-executing invocations of `job_name`.
    async fn count_running(&self, job_name: &str) -> Result<u32>;

    async fn increment_execution(&self, schedule_id: &str, job_name: &str) -> Result<()>;
    async fn decrement_execution(&self, schedule_id: &str, job_name: &str) -> Result<()>;
}

/// An in-memory [`ExecutionsLedger`]. Like [`crate::store::InMemoryJobStore`],
/// this stands in for the shared document-store collaborator, which is
/// out of scope here.
#[derive(Debug, Default)]
pub struct InMemoryExecutionsLedger {
    entries: Mutex<HashMap<String, ScheduleEntry>>,
}

impl InMemoryExecutionsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ExecutionsLedger for InMemoryExecutionsLedger {
    async fn add_schedule(&self, schedule_id: &str, name: &str, now: Timestamp) -> Result<()> {
        self.entries.lock().await.insert(
            schedule_id.to_string(),
            ScheduleEntry {
                schedule_id: schedule_id.to_string(),
                name: name.to_string(),
                last_alive: now,
                executions: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn is_active_schedule(
        &self,
        schedule_id: &str,
        name: &str,
        now: Timestamp,
        liveness_window_ms: u64,
    ) -> Result<bool> {
        let entries = self.entries.lock().await;
        let mut alive: Vec<&ScheduleEntry> = entries
            .values()
            .filter(|e| {
                e.name == name
                    && crate::clock::millis_between(e.last_alive, now) <= liveness_window_ms as i64
            })
            .collect();
        alive.sort_by(|a, b| {
            a.last_alive
                .cmp(&b.last_alive)
                .then_with(|| a.schedule_id.cmp(&b.schedule_id))
        });
        Ok(alive.first().is_some_and(|winner| winner.schedule_id == schedule_id))
    }

    async fn ping(&self, schedule_id: &str, now: Timestamp) -> Result<()> {
        if let Some(entry) = self.entries.lock().await.get_mut(schedule_id) {
            entry.last_alive = now;
        }
        Ok(())
    }

    async fn delete_one(&self, schedule_id: &str) -> Result<()> {
        self.entries.lock().await.remove(schedule_id);
        Ok(())
    }

    async fn delete_dead(
        &self,
        name: &str,
        now: Timestamp,
        older_than_ms: u64,
    ) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().await;
        let dead: Vec<String> = entries
            .values()
            .filter(|e| {
                e.name == name
                    && crate::clock::millis_between(e.last_alive, now) > older_than_ms as i64
            })
            .map(|e| e.schedule_id.clone())
            .collect();
        for id in &dead {
            entries.remove(id);
        }
        Ok(dead)
    }

    async fn count_running(&self, job_name: &str) -> Result<u32> {
        Ok(self
            .entries
            .lock()
            .await
            .values()
            .filter_map(|e| e.executions.get(job_name))
            .sum())
    }

    async fn increment_execution(&self, schedule_id: &str, job_name: &str) -> Result<()> {
        if let Some(entry) = self.entries.lock().await.get_mut(schedule_id) {
            *entry.executions.entry(job_name.to_string()).or_insert(0) += 1;
        }
        Ok(())
    }

    async fn decrement_execution(&self, schedule_id: &str, job_name: &str) -> Result<()> {
        if let Some(entry) = self.entries.lock().await.get_mut(schedule_id) {
            if let Some(count) = entry.executions.get_mut(job_name) {
                *count = count.saturating_sub(1);
            }
        }
        Ok(())
    }
}
