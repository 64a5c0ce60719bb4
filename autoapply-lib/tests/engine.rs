//! End-to-end tests of the assembled engine: budgets, throttling, retry,
//! failure isolation, and crash recovery against the in-memory store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoapply_lib::session::{SessionLimits, SessionParams, SessionStatus};
use autoapply_lib::store::{MemoryStore, SessionStore};
use autoapply_lib::throttle::{DomainKey, DomainPolicy, ThrottleConfig};
use autoapply_lib::{
    EffortLevel, Engine, EngineBuilder, ErrorKind, RetryPolicy, Task, TaskStatus, Usage,
    WorkflowError, WorkflowExecutor, WorkflowOutcome,
};
use uuid::Uuid;

/// Executor that succeeds after an optional artificial delay, panics on
/// `/panic` paths, and flakes transiently on `/flaky` paths.
#[derive(Debug)]
struct TestExecutor {
    delay: Duration,
    flaky_calls: AtomicU32,
}

impl TestExecutor {
    fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
            flaky_calls: AtomicU32::new(0),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            flaky_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl WorkflowExecutor for TestExecutor {
    async fn execute(
        &self,
        task: &Task,
        effort: EffortLevel,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match task.url.path() {
            "/panic" => panic!("boom"),
            "/flaky" => {
                if self.flaky_calls.fetch_add(1, Ordering::SeqCst) < 1 {
                    return Err(WorkflowError::ProviderUnavailable("502".into()));
                }
                Ok(WorkflowOutcome {
                    effort,
                    usage: Usage::default(),
                })
            }
            _ => Ok(WorkflowOutcome {
                effort,
                usage: Usage {
                    tokens_input: 100,
                    tokens_output: 20,
                    cost_estimated: 0.01,
                },
            }),
        }
    }
}

/// A throttle wide enough that it never interferes with a test
fn open_throttle() -> ThrottleConfig {
    ThrottleConfig {
        default: DomainPolicy {
            max_applications_per_day: 100_000,
            min_interval: Duration::ZERO,
            max_concurrent: 1000,
            ..DomainPolicy::default()
        },
        ..ThrottleConfig::default()
    }
}

fn engine_with(
    store: Arc<MemoryStore>,
    executor: Arc<dyn WorkflowExecutor>,
    workers: usize,
) -> Engine {
    EngineBuilder::builder()
        .executor(executor)
        .store(store)
        .throttle(open_throttle())
        .retry(RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        })
        .workers(workers)
        .build()
        .engine()
}

async fn session(engine: &Engine, max_applications: u32, max_duration: Duration) -> Uuid {
    engine
        .create_session(
            SessionParams::builder()
                .owner(Uuid::new_v4())
                .name("integration")
                .limits(SessionLimits {
                    max_applications,
                    max_duration,
                    ..SessionLimits::default()
                })
                .build(),
        )
        .await
}

fn task(session_id: Uuid, domain: &str, path: &str) -> Task {
    Task::builder()
        .session_id(session_id)
        .url(format!("https://{domain}{path}").parse().unwrap())
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_of_n_counts_n_regardless_of_worker_count() {
    for workers in [1, 3, 8] {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store, Arc::new(TestExecutor::instant()), workers);
        let id = session(&engine, 1000, Duration::from_secs(60)).await;

        let tasks: Vec<_> = (0..20)
            .map(|i| task(id, &format!("site-{}.example.com", i % 5), &format!("/{i}")))
            .collect();
        let results = engine.run_batch(tasks).await.unwrap();
        assert_eq!(results.len(), 20);

        let snapshot = engine.current_snapshot(id).await.unwrap();
        assert_eq!(
            snapshot.counters.applications_attempted, 20,
            "attempted must equal batch size with {workers} workers"
        );
        engine.shutdown().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn results_correlate_by_application_id() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store, Arc::new(TestExecutor::instant()), 4);
    let id = session(&engine, 1000, Duration::from_secs(60)).await;

    let tasks: Vec<_> = (0..10)
        .map(|i| task(id, "jobs.example.com", &format!("/{i}")))
        .collect();
    let expected: Vec<_> = tasks.iter().map(|t| t.application_id).collect();

    let results = engine.run_batch(tasks).await.unwrap();
    let mut seen: Vec<_> = results.iter().map(|r| r.application_id).collect();
    seen.sort();
    let mut expected_sorted = expected;
    expected_sorted.sort();
    assert_eq!(seen, expected_sorted);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn application_budget_bounds_counted_results() {
    // max_applications = 2, three tasks, two workers: exactly two counted
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(
        Arc::clone(&store),
        Arc::new(TestExecutor::slow(Duration::from_millis(20))),
        2,
    );
    let id = session(&engine, 2, Duration::from_secs(60)).await;

    let tasks = vec![
        task(id, "a.example.com", "/1"),
        task(id, "b.example.com", "/2"),
        task(id, "c.example.com", "/3"),
    ];
    let results = engine.run_batch(tasks).await.unwrap();

    let counted = results.iter().filter(|r| r.counts_as_attempt()).count();
    let skipped = results
        .iter()
        .filter(|r| r.status == TaskStatus::Skipped)
        .count();
    assert_eq!(counted, 2);
    assert_eq!(skipped, 1);

    let snapshot = engine.current_snapshot(id).await.unwrap();
    assert_eq!(snapshot.counters.applications_attempted, 2);
    assert_eq!(snapshot.status, SessionStatus::Completed);

    // Terminal state holds; the digest reflects exactly the counted work
    let digest = store.digest(id).await.unwrap().unwrap();
    assert_eq!(digest.applications_total, 2);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn time_budget_terminates_with_few_results() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(
        Arc::clone(&store),
        Arc::new(TestExecutor::slow(Duration::from_millis(30))),
        1,
    );
    let id = session(&engine, 1000, Duration::from_millis(50)).await;

    // One slow batch; the time budget expires partway through
    let tasks: Vec<_> = (0..10)
        .map(|i| task(id, "slow.example.com", &format!("/{i}")))
        .collect();
    let results = engine.run_batch(tasks).await.unwrap();

    let snapshot = engine.current_snapshot(id).await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert!(
        snapshot.counters.applications_attempted < 10,
        "session must stop before the whole batch ran"
    );
    assert!(results
        .iter()
        .any(|r| r.status == TaskStatus::Skipped));
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_workflow_is_isolated() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store, Arc::new(TestExecutor::instant()), 2);
    let id = session(&engine, 1000, Duration::from_secs(60)).await;

    let results = engine
        .run_batch(vec![task(id, "jobs.example.com", "/panic")])
        .await
        .unwrap();
    assert_eq!(results[0].status, TaskStatus::Error);

    // The pool still serves
    let results = engine
        .run_batch(vec![task(id, "jobs.example.com", "/ok")])
        .await
        .unwrap();
    assert_eq!(results[0].status, TaskStatus::Success);

    let snapshot = engine.current_snapshot(id).await.unwrap();
    assert_eq!(snapshot.counters.applications_attempted, 2);
    assert_eq!(snapshot.counters.applications_successful, 1);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_failures_retry_and_usage_accumulates() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store, Arc::new(TestExecutor::instant()), 1);
    let id = session(&engine, 1000, Duration::from_secs(60)).await;

    let results = engine
        .run_batch(vec![task(id, "jobs.example.com", "/flaky")])
        .await
        .unwrap();
    assert_eq!(results[0].status, TaskStatus::Success);
    assert_eq!(results[0].attempts, 2);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn domain_concurrency_denial_skips_without_retry() {
    let store = Arc::new(MemoryStore::new());
    let mut throttle = open_throttle();
    throttle.domains.insert(
        DomainKey::from("tight.example.com"),
        DomainPolicy {
            max_concurrent: 1,
            min_interval: Duration::ZERO,
            max_applications_per_day: 1000,
            ..DomainPolicy::default()
        },
    );

    let engine = EngineBuilder::builder()
        .executor(Arc::new(TestExecutor::slow(Duration::from_millis(50))) as Arc<dyn WorkflowExecutor>)
        .store(store)
        .throttle(throttle)
        .workers(2)
        .build()
        .engine();
    let id = session(&engine, 1000, Duration::from_secs(60)).await;

    // Both tasks target the same single-slot domain at the same time; the
    // second one is denied and skipped, never queued for retry
    let results = engine
        .run_batch(vec![
            task(id, "tight.example.com", "/1"),
            task(id, "tight.example.com", "/2"),
        ])
        .await
        .unwrap();

    let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
    assert!(statuses.contains(&TaskStatus::Success));
    assert!(statuses.contains(&TaskStatus::Skipped));
    let skip = results
        .iter()
        .find(|r| r.status == TaskStatus::Skipped)
        .unwrap();
    assert_eq!(skip.attempts, 0);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_session_skips_the_rest_of_the_batch() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(
        Arc::clone(&store),
        Arc::new(TestExecutor::slow(Duration::from_millis(20))),
        1,
    );
    let id = session(&engine, 1000, Duration::from_secs(60)).await;

    let tasks: Vec<_> = (0..20)
        .map(|i| task(id, "jobs.example.com", &format!("/{i}")))
        .collect();

    let stopper = {
        let controller = Arc::clone(engine.controller());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            controller.stop_session(id, "operator stop").await
        })
    };

    let results = engine.run_batch(tasks).await.unwrap();
    stopper.await.unwrap().unwrap();

    let snapshot = engine.current_snapshot(id).await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert!(results.iter().any(|r| r.status == TaskStatus::Skipped));
    assert!(
        snapshot.counters.applications_attempted < 20,
        "stopping mid-batch must prevent the remaining dispatches"
    );

    // Exactly one digest despite the stop racing the budget machinery
    assert!(store.digest(id).await.unwrap().is_some());
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recovery_after_simulated_crash_is_idempotent() {
    let store = Arc::new(MemoryStore::new());

    // First process: session left running with some persisted counters
    {
        let engine = engine_with(
            Arc::clone(&store),
            Arc::new(TestExecutor::instant()),
            2,
        );
        let id = session(&engine, 1000, Duration::from_secs(60)).await;
        engine
            .run_batch(vec![task(id, "jobs.example.com", "/1")])
            .await
            .unwrap();
        // The process "crashes" here: the engine is dropped without
        // stopping the session
        engine.shutdown().await;
    }

    // Second process: recovery finds the stale session
    let engine = engine_with(Arc::clone(&store), Arc::new(TestExecutor::instant()), 2);
    let recovered = engine.recover_active_sessions().await.unwrap();
    assert_eq!(recovered.len(), 1);
    let id = recovered[0];

    let record = store.session(id).await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Interrupted);

    let digest = store.digest(id).await.unwrap().unwrap();
    assert_eq!(digest.applications_total, 1);

    // Running recovery again neither finds work nor duplicates the digest
    let recovered_again = engine.recover_active_sessions().await.unwrap();
    assert!(recovered_again.is_empty());
    assert_eq!(store.digest(id).await.unwrap().unwrap(), digest);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_session_yields_skip_and_snapshot_error() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store, Arc::new(TestExecutor::instant()), 1);

    let ghost = Uuid::new_v4();
    let results = engine
        .run_batch(vec![task(ghost, "jobs.example.com", "/1")])
        .await
        .unwrap();
    assert_eq!(results[0].status, TaskStatus::Skipped);

    assert!(matches!(
        engine.current_snapshot(ghost).await,
        Err(ErrorKind::SessionNotFound(_))
    ));
    engine.shutdown().await;
}
