//! Distributed, persistent job scheduling.
//!
//! A schedule instance defines named jobs against a shared Job Store and
//! Executions Ledger. Multiple instances may run against the same store
//! under the same schedule name; a liveness protocol (the [`ping`] module)
//! elects one instance at a time to own each job's dispatch, and hands
//! ownership to another instance when the holder goes quiet.
//!
//! ```no_run
//! use momo::{MomoSchedule, ScheduleOptions};
//! use momo::handler::FnHandler;
//! use momo::job::JobSpec;
//!
//! # async fn example() -> momo::error::Result<()> {
//! let schedule = MomoSchedule::connect(ScheduleOptions::new("my-app")).await?;
//! schedule
//!     .define_job(
//!         JobSpec::new("send-digest", "1 hour"),
//!         std::sync::Arc::new(FnHandler::new(|| async { Ok(()) })),
//!     )
//!     .await?;
//! schedule.start("send-digest").await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod executor;
pub mod handler;
pub mod interval;
pub mod job;
pub mod job_scheduler;
pub mod ledger;
pub mod ping;
pub mod schedule;
pub mod store;
pub mod timer;

use clock::{Clock, RealClock};
use error::Result;
use ledger::InMemoryExecutionsLedger;
use ping::SchedulePing;
use schedule::Schedule;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use store::InMemoryJobStore;

pub use job::{JobDescription, JobResult, JobSpec};
pub use schedule::Schedule as MomoSchedule;

/// The default Schedule Ping interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration accepted by [`connect`].
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// The logical schedule name. Instances sharing a name compete for
    /// liveness over the same set of job definitions.
    pub name: String,
    /// How often the Schedule Ping beats. The liveness window (how long a
    /// peer may go quiet before it's considered dead) is always `2 ×`
    /// this value.
    pub ping_interval: Duration,
    /// Force a specific `scheduleId` instead of generating one. Mainly
    /// useful for tests that need a deterministic identity.
    pub schedule_id: Option<String>,
}

impl ScheduleOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ping_interval: DEFAULT_PING_INTERVAL,
            schedule_id: None,
        }
    }

    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn schedule_id(mut self, schedule_id: impl Into<String>) -> Self {
        self.schedule_id = Some(schedule_id.into());
        self
    }
}

/// Connect to a new [`Schedule`] backed by in-memory collaborators,
/// registering it with a freshly-started [`SchedulePing`].
///
/// This is a convenience constructor, not an implicit global: a real
/// deployment swaps in a document-store-backed
/// [`store::JobStore`]/[`ledger::ExecutionsLedger`] pair and wires them the
/// same way this function does.
pub async fn connect(options: ScheduleOptions) -> Result<Arc<Schedule>> {
    let store = InMemoryJobStore::shared();
    let ledger = InMemoryExecutionsLedger::shared();
    let clock: Arc<dyn Clock> = Arc::new(RealClock);

    let schedule_id = options
        .schedule_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    ledger
        .add_schedule(&schedule_id, &options.name, clock.now())
        .await?;

    let schedule = Arc::new(Schedule::new(
        schedule_id.clone(),
        store,
        ledger.clone(),
        clock.clone(),
    ));

    let callback_schedule = schedule.clone();
    let start_all_jobs: ping::StartAllJobs = Arc::new(move || {
        let schedule = callback_schedule.clone();
        Box::pin(async move { schedule.start_all().await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });

    let ping = SchedulePing::new(
        schedule_id,
        options.name,
        ledger,
        clock,
        options.ping_interval,
        start_all_jobs,
    );
    ping.start().await;
    schedule.attach_ping(ping).await;

    Ok(schedule)
}

impl Schedule {
    /// See [`connect`]. Exposed as an associated function so callers can
    /// write `MomoSchedule::connect(options)`.
    pub async fn connect(options: ScheduleOptions) -> Result<Arc<Schedule>> {
        connect(options).await
    }
}
