//! End-to-end scenarios spanning `Schedule`, `JobScheduler`, the Job
//! Executor and the Schedule Ping together.

use async_trait::async_trait;
use momo::clock::{Clock, MockClock, RealClock};
use momo::error::MomoError;
use momo::handler::{FnHandler, Handler};
use momo::job::{JobSpec, Outcome};
use momo::ledger::{ExecutionsLedger, InMemoryExecutionsLedger};
use momo::ping::{SchedulePing, StartAllJobs};
use momo::schedule::Schedule;
use momo::store::InMemoryJobStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn new_schedule(schedule_id: &str) -> Schedule {
    Schedule::new(
        schedule_id,
        InMemoryJobStore::shared(),
        InMemoryExecutionsLedger::shared(),
        Arc::new(RealClock),
    )
}

#[tokio::test]
async fn define_then_run_once() {
    let schedule = new_schedule("s1");
    schedule
        .define_job(JobSpec::new("j", "one minute"), Arc::new(FnHandler::new(|| async { Ok(()) })))
        .await
        .unwrap();

    let result = schedule.run("j").await.unwrap();
    assert_eq!(result.status, Outcome::Finished);

    let description = schedule.get("j").await.unwrap().unwrap();
    assert_eq!(description.name, "j");
}

#[tokio::test]
async fn max_running_enforced() {
    let store = InMemoryJobStore::shared();
    let ledger = InMemoryExecutionsLedger::shared();
    let clock: Arc<dyn Clock> = Arc::new(RealClock);
    ledger.add_schedule("s1", "grp", clock.now()).await.unwrap();

    // A second schedule instance pre-seeds one in-flight invocation.
    ledger.add_schedule("other", "grp", clock.now()).await.unwrap();
    ledger.increment_execution("other", "j").await.unwrap();

    let schedule = Schedule::new("s1", store.clone(), ledger.clone(), clock.clone());
    struct Holder(Arc<AtomicUsize>);
    #[async_trait]
    impl Handler for Holder {
        async fn call(&self) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
    let calls = Arc::new(AtomicUsize::new(0));
    schedule
        .define_job(
            JobSpec::new("j", "one minute").concurrency(5).max_running(2),
            Arc::new(Holder(calls.clone())),
        )
        .await
        .unwrap();

    let result = schedule.run("j").await.unwrap();
    assert_eq!(result.status, Outcome::Finished);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // The cap allowed exactly one more invocation (1 pre-seeded + 1 new = 2),
    // and it released back down to the pre-seeded count on completion.
    assert_eq!(ledger.count_running("j").await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn tick_dispatch_respects_cluster_max_running() {
    let store = InMemoryJobStore::shared();
    let ledger = InMemoryExecutionsLedger::shared();
    let clock: Arc<dyn Clock> = Arc::new(RealClock);
    ledger.add_schedule("s1", "grp", clock.now()).await.unwrap();

    // A second schedule instance pre-seeds one in-flight invocation.
    ledger.add_schedule("other", "grp", clock.now()).await.unwrap();
    ledger.increment_execution("other", "j").await.unwrap();

    let schedule = Schedule::new("s1", store.clone(), ledger.clone(), clock.clone());
    struct Counting(Arc<AtomicUsize>);
    #[async_trait]
    impl Handler for Counting {
        async fn call(&self) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
    let calls = Arc::new(AtomicUsize::new(0));
    schedule
        .define_job(
            JobSpec::new("j", "one hour")
                .immediate(true)
                .concurrency(5)
                .max_running(2),
            Arc::new(Counting(calls.clone())),
        )
        .await
        .unwrap();

    schedule.start("j").await.unwrap();
    tokio::time::advance(Duration::from_millis(1)).await;
    tokio::task::yield_now().await;

    // concurrency=5, max_running=2, one already running elsewhere in the
    // cluster: num_to_execute = min(5, max(0, 2 - 1)) = 1.
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "the tick must launch exactly one invocation, not the full concurrency"
    );

    schedule.stop("j").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn immediate_first_fire() {
    let store = InMemoryJobStore::shared();
    let ledger = InMemoryExecutionsLedger::shared();
    let clock: Arc<dyn Clock> = Arc::new(RealClock);
    ledger.add_schedule("s1", "grp", clock.now()).await.unwrap();

    let schedule = Schedule::new("s1", store.clone(), ledger.clone(), clock.clone());
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let handler = FnHandler::new(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    schedule
        .define_job(JobSpec::new("j", "one hour").immediate(true), Arc::new(handler))
        .await
        .unwrap();
    schedule.start("j").await.unwrap();

    tokio::time::advance(Duration::from_millis(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 1, "should fire immediately");

    tokio::time::advance(Duration::from_millis(3_600_000 - 1)).await;
    tokio::task::yield_now().await;
    assert_eq!(count.load(Ordering::SeqCst), 2, "second fire one hour later");

    schedule.stop("j").await.unwrap();
}

#[tokio::test]
async fn redefining_a_started_job_is_rejected() {
    let schedule = new_schedule("s1");
    schedule
        .define_job(JobSpec::new("j", "one hour"), Arc::new(FnHandler::new(|| async { Ok(()) })))
        .await
        .unwrap();
    schedule.start("j").await.unwrap();

    let result = schedule
        .define_job(JobSpec::new("j", "two hours"), Arc::new(FnHandler::new(|| async { Ok(()) })))
        .await;
    assert!(matches!(result, Err(MomoError::JobAlreadyScheduled(name)) if name == "j"));

    schedule.stop("j").await.unwrap();
}

#[tokio::test]
async fn redefining_a_stopped_job_is_a_full_replace() {
    let schedule = new_schedule("s1");
    schedule
        .define_job(JobSpec::new("j", "one hour"), Arc::new(FnHandler::new(|| async { Ok(()) })))
        .await
        .unwrap();
    schedule.start("j").await.unwrap();
    schedule.stop("j").await.unwrap();

    schedule
        .define_job(JobSpec::new("j", "two hours"), Arc::new(FnHandler::new(|| async { Ok(()) })))
        .await
        .unwrap();

    let description = schedule.get("j").await.unwrap().unwrap();
    assert_eq!(description.interval, "two hours");
}

#[tokio::test]
async fn unparseable_interval_rejects_and_persists_nothing() {
    let schedule = new_schedule("s1");
    let result = schedule
        .define_job(
            JobSpec::new("j", "every blue moon"),
            Arc::new(FnHandler::new(|| async { Ok(()) })),
        )
        .await;
    assert!(matches!(result, Err(MomoError::NonParsableInterval(_))));
    assert!(schedule.get("j").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_in_flight_handler() {
    let schedule = new_schedule("s1");
    let handler = FnHandler::new(|| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    });
    schedule
        .define_job(JobSpec::new("j", "one hour").immediate(true), Arc::new(handler))
        .await
        .unwrap();
    let fire_start = tokio::time::Instant::now();
    schedule.start("j").await.unwrap();

    tokio::time::advance(Duration::from_millis(1)).await;
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_millis(50)).await;
    schedule.stop("j").await.unwrap();
    assert!(
        fire_start.elapsed() >= Duration::from_millis(500),
        "stop must not resolve before the in-flight handler settles"
    );
}

#[tokio::test(start_paused = true)]
async fn ping_takeover_invokes_start_all_jobs_exactly_once() {
    let store = InMemoryJobStore::shared();
    let ledger: Arc<dyn ExecutionsLedger> = InMemoryExecutionsLedger::shared();
    let clock = Arc::new(MockClock::default());
    let clock_dyn: Arc<dyn Clock> = clock.clone();

    ledger.add_schedule("a", "grp", clock_dyn.now()).await.unwrap();
    ledger.add_schedule("b", "grp", clock_dyn.now()).await.unwrap();

    let schedule_b = Arc::new(Schedule::new("b", store, ledger.clone(), clock_dyn.clone()));
    let start_count = Arc::new(AtomicUsize::new(0));
    let sb = schedule_b.clone();
    let sc = start_count.clone();
    let start_all_jobs: StartAllJobs = Arc::new(move || {
        let sb = sb.clone();
        let sc = sc.clone();
        Box::pin(async move {
            sc.fetch_add(1, Ordering::SeqCst);
            sb.start_all().await;
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });

    // "a" never pings again after registration — it goes quiet while "b"
    // keeps beating, its own MockClock advanced in lockstep with each tick
    // so staleness is measured against the same timeline the ping sees.
    let ping_b = SchedulePing::new(
        "b",
        "grp",
        ledger.clone(),
        clock_dyn.clone(),
        Duration::from_secs(1),
        start_all_jobs,
    );
    ping_b.start().await;

    // Tick 1 (t=1s): "a" (elapsed 1s) still beats "b" (elapsed 1s) on the
    // lexicographic tie-break, so "b" is not yet active.
    clock.advance(1_000);
    tokio::time::advance(Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(start_count.load(Ordering::SeqCst), 0);

    // Tick 2 (t=2s): "a" is exactly at the liveness boundary, still alive
    // and still wins the tie-break; "b" has just refreshed its own entry.
    clock.advance(1_000);
    tokio::time::advance(Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(start_count.load(Ordering::SeqCst), 0);

    // Tick 3 (t=3s): "a" is now stale (3s > 2×pingInterval) and excluded;
    // "b" refreshed its own entry at tick 2, so it is the sole alive
    // entry and becomes active for the first time.
    clock.advance(1_000);
    tokio::time::advance(Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(start_count.load(Ordering::SeqCst), 1);
    assert!(!ledger.is_active_schedule("a", "grp", clock_dyn.now(), 2_000).await.unwrap());

    // A further tick must not re-invoke startAllJobs: only the transition fires it.
    clock.advance(1_000);
    tokio::time::advance(Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(start_count.load(Ordering::SeqCst), 1);

    ping_b.stop().await;
}
