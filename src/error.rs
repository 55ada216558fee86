//! The error type and `Result` alias used throughout the crate.

use thiserror::Error;

/// Errors surfaced to callers of the public API.
///
/// Runtime errors encountered during the periodic dispatch loop are *not*
/// represented here — they are absorbed, logged, and counted (see
/// `JobScheduler::unexpected_error_count`). Only validation and programmer
/// errors propagate as `MomoError`.
#[derive(Debug, Error)]
pub enum MomoError {
    /// A job definition with the given name does not exist.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// An interval string could not be parsed into a positive millisecond count.
    #[error("could not parse interval: {0:?}")]
    NonParsableInterval(String),

    /// `defineJob` was called for a name whose job is currently started.
    /// The caller must stop it before redefining it; defining a name that
    /// was never started (or already stopped) is a full replace instead.
    #[error("job already scheduled: {0}")]
    JobAlreadyScheduled(String),

    /// `concurrency` must be a positive integer.
    #[error("invalid concurrency for job {name}: {value}")]
    InvalidConcurrency { name: String, value: i64 },

    /// `maxRunning` must be non-negative. `JobSpec::max_running` is a
    /// `u32`, so the type system already rules out the negative case this
    /// variant would report — nothing in this crate constructs it today.
    #[error("invalid maxRunning for job {name}: {value}")]
    InvalidMaxRunning { name: String, value: i64 },

    /// An error from the Job Store or Executions Ledger collaborator.
    #[error("store error: {0}")]
    Store(String),

    /// Any other unexpected failure. Not normally returned from the public
    /// API; retained for completeness of the error taxonomy.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, MomoError>;
