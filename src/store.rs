//! The Job Store collaborator: a shared record of job definitions.
//!
//! Expressed as an `async_trait` so a real document-store adapter can
//! implement it later; only an in-memory adapter ships here.

use crate::error::Result;
use crate::job::{ExecutionInfo, JobDefinition};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find_one(&self, name: &str) -> Result<Option<JobDefinition>>;
    async fn save(&self, definition: JobDefinition) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<JobDefinition>>;
    /// Atomically increments `running` for `name` and returns the new value.
    /// A no-op (returns `0`) if the job no longer exists.
    async fn increment_running(&self, name: &str) -> Result<u32>;
    /// Atomically decrements `running` for `name`, floored at zero.
    async fn decrement_running(&self, name: &str) -> Result<u32>;
    async fn update_execution_info(&self, name: &str, info: ExecutionInfo) -> Result<()>;
}

/// An in-memory [`JobStore`], suitable for single-process use and tests.
/// A real deployment backs this interface with a shared document store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, JobDefinition>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn find_one(&self, name: &str) -> Result<Option<JobDefinition>> {
        Ok(self.jobs.lock().await.get(name).cloned())
    }

    async fn save(&self, definition: JobDefinition) -> Result<()> {
        self.jobs
            .lock()
            .await
            .insert(definition.name.clone(), definition);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.jobs.lock().await.remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<JobDefinition>> {
        Ok(self.jobs.lock().await.values().cloned().collect())
    }

    async fn increment_running(&self, name: &str) -> Result<u32> {
        let mut jobs = self.jobs.lock().await;
        Ok(match jobs.get_mut(name) {
            Some(job) => {
                job.running += 1;
                job.running
            }
            None => 0,
        })
    }

    async fn decrement_running(&self, name: &str) -> Result<u32> {
        let mut jobs = self.jobs.lock().await;
        Ok(match jobs.get_mut(name) {
            Some(job) => {
                job.running = job.running.saturating_sub(1);
                job.running
            }
            None => 0,
        })
    }

    async fn update_execution_info(&self, name: &str, info: ExecutionInfo) -> Result<()> {
        if let Some(job) = self.jobs.lock().await.get_mut(name) {
            job.execution_info = Some(info);
        }
        Ok(())
    }
}
