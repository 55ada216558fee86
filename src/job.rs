//! The job data model: what's stored in the Job Store, and the outcomes an
//! execution can settle to.
//!
//! Definitions live in the Job Store rather than in a scheduler-owned
//! struct, so there is no stored `next_run` field — the next fire time is
//! always derived on demand from `interval`, `immediate` and the last
//! recorded execution.

use jiff::Timestamp;

/// How one invocation of a job handler settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handler returned normally.
    Finished,
    /// The handler raised or returned a failure. The message is captured
    /// plaintext, length-bounded (see [`Outcome::bound_message`]).
    Failed(String),
    /// The cluster-wide `maxRunning` cap would have been exceeded.
    MaxRunningReached,
    /// The job definition had disappeared by the time it would have run.
    NotFound,
}

/// Messages captured from failing handlers are bounded to this many bytes
/// so a misbehaving handler can't blow up the execution-info record.
pub const MAX_FAILURE_MESSAGE_LEN: usize = 4096;

impl Outcome {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_FAILURE_MESSAGE_LEN {
            let mut boundary = MAX_FAILURE_MESSAGE_LEN;
            while boundary > 0 && !message.is_char_boundary(boundary) {
                boundary -= 1;
            }
            message.truncate(boundary);
        }
        Outcome::Failed(message)
    }
}

/// The result of an ad-hoc `Schedule::run` / `JobScheduler::execute_once`
/// invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub name: String,
    pub status: Outcome,
}

/// Last-started / last-finished timestamps and the last outcome, attached
/// to a [`JobDefinition`] by the Job Executor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionInfo {
    pub last_started: Option<Timestamp>,
    pub last_finished: Option<Timestamp>,
    pub last_outcome: Option<Outcome>,
}

/// A job definition as held in the Job Store, keyed by unique `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    /// Unique identifier within a Job Store.
    pub name: String,
    /// The original human-readable interval string, preserved for display.
    pub interval: String,
    /// The interval parsed to a positive millisecond count.
    pub interval_ms: u64,
    /// How many invocations a single tick may launch on one instance.
    pub concurrency: u32,
    /// Cluster-wide cap on in-flight invocations. `0` means unbounded.
    pub max_running: u32,
    /// Cluster-wide count of currently-executing invocations.
    pub running: u32,
    /// If true, the first tick fires as soon as scheduling starts.
    pub immediate: bool,
    pub execution_info: Option<ExecutionInfo>,
}

impl JobDefinition {
    /// Build a new definition with `running = 0` and no execution history.
    pub fn new(
        name: impl Into<String>,
        interval: impl Into<String>,
        interval_ms: u64,
        concurrency: u32,
        max_running: u32,
        immediate: bool,
    ) -> Self {
        Self {
            name: name.into(),
            interval: interval.into(),
            interval_ms,
            concurrency,
            max_running,
            running: 0,
            immediate,
            execution_info: None,
        }
    }

    pub fn last_finished(&self) -> Option<Timestamp> {
        self.execution_info.as_ref().and_then(|i| i.last_finished)
    }
}

/// Parameters accepted by [`crate::schedule::Schedule::define_job`].
///
/// Separate from [`JobDefinition`] because callers never supply `running`
/// or `execution_info` — those are executor-maintained state.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    /// Human-readable interval, e.g. `"one minute"` or `"30 seconds"`.
    pub interval: String,
    pub concurrency: u32,
    pub max_running: u32,
    pub immediate: bool,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: interval.into(),
            concurrency: 1,
            max_running: 0,
            immediate: false,
        }
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn max_running(mut self, max_running: u32) -> Self {
        self.max_running = max_running;
        self
    }

    #[must_use]
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }
}

/// Per-instance status of a job shown by `Schedule::list`/`get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningStatus {
    pub interval: String,
    pub running: u32,
}

/// A description of one job as returned by `Schedule::list`/`get`: the
/// stored definition plus, if this instance has started a scheduler for
/// it, the running status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescription {
    pub name: String,
    pub interval: String,
    pub concurrency: u32,
    pub max_running: u32,
    pub immediate: bool,
    pub status: Option<RunningStatus>,
}
