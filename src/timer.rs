//! A single-shot-then-periodic timer: fires once after an initial delay,
//! then on a fixed period thereafter, until stopped.
//!
//! Built on `tokio::time` with a `JoinHandle`-as-stop-handle shape.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};

/// A nullary, cloneable, boxed-future-returning action. `Arc` rather than
/// `Box` because the timer loop calls it on every tick without consuming it.
pub type TimerAction = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The set of tick tasks a timer has fired, shared with whatever drains it
/// on stop. Each fire is registered here atomically at dispatch time, not
/// left to register itself after the fact — a task suspended between being
/// spawned and reaching its own first await point must already be visible
/// to a concurrent drain, or that drain can observe an empty set and return
/// before the task it raced with has done anything.
pub type PendingTicks = Arc<Mutex<JoinSet<()>>>;

/// A handle to a running timer. `stop()` is idempotent: calling it more
/// than once, or on a handle whose timer already stopped itself, is a
/// no-op.
pub struct TimerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Cancel future fires and wait for the timer's own loop task to exit.
    /// Does not wait for ticks already dispatched — those are registered in
    /// the `pending` set passed to [`start`], and the caller drains that set
    /// itself to wait for them.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Arm a timer: fire `action` once after `delay`, then every `period`
/// thereafter, until the returned handle is stopped. Each fire is spawned
/// directly into `pending`, under the same lock a caller's drain loop uses,
/// so a fire is always observable to `stop()` before the timer loop moves
/// on to wait for the next deadline (or exit).
///
/// Cadence is anchored to absolute deadlines (`now + delay`, `+= period`,
/// ...) rather than "sleep, then run, then sleep again" — so a slow action
/// does not skew subsequent fires. Each fire runs as its own task rather
/// than being awaited in the timer loop, so the timer itself never queues
/// backlog; the action is responsible for its own concurrency bookkeeping.
pub fn start(delay: Duration, period: Duration, action: TimerAction, pending: PendingTicks) -> TimerHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let join = tokio::spawn(async move {
        let mut deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    pending.lock().await.spawn(action());
                    deadline += period;
                }
                _ = &mut stop_rx => {
                    return;
                }
            }
        }
    });

    TimerHandle {
        stop_tx: Some(stop_tx),
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn pending() -> PendingTicks {
        Arc::new(Mutex::new(JoinSet::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_then_periodically() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let action: TimerAction = Arc::new(move || {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
        });

        let mut handle = start(StdDuration::ZERO, StdDuration::from_millis(100), action, pending());

        tokio::time::advance(StdDuration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::advance(StdDuration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tokio::time::advance(StdDuration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.stop().await;
        tokio::time::advance(StdDuration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let action: TimerAction = Arc::new(|| Box::pin(async {}));
        let mut handle = start(StdDuration::from_secs(60), StdDuration::from_secs(60), action, pending());
        handle.stop().await;
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_fire_is_registered_in_pending_before_the_next_deadline() {
        let pending = pending();
        let action: TimerAction = Arc::new(|| {
            Box::pin(async {
                tokio::time::sleep(StdDuration::from_millis(500)).await;
            })
        });
        let mut handle = start(StdDuration::ZERO, StdDuration::from_secs(60), action, pending.clone());

        tokio::time::advance(StdDuration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(pending.lock().await.len(), 1, "the fire must already be visible to a drain");

        handle.stop().await;
    }
}
