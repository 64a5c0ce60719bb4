use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use super::worker;
use crate::executor::WorkflowExecutor;
use crate::retry::RetryPolicy;
use crate::rules::EffortRules;
use crate::session::SessionController;
use crate::throttle::DomainThrottle;
use crate::types::{ErrorKind, Result, Task, TaskResult};

/// Default number of workers in a pool, 5.
pub const DEFAULT_WORKER_COUNT: usize = 5;
/// Default upper bound on a single workflow attempt, 5 minutes.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);
/// Capacity of the shared work queue.
const QUEUE_CAPACITY: usize = 256;

/// Everything a worker needs to process tasks, shared across the pool.
///
/// Constructed once and injected; workers own no state of their own beyond
/// their loop.
#[derive(Debug)]
pub struct WorkerContext {
    /// Per-destination admission control
    pub throttle: Arc<DomainThrottle>,
    /// The externally supplied application workflow
    pub executor: Arc<dyn WorkflowExecutor>,
    /// Session counter/budget owner
    pub controller: Arc<SessionController>,
    /// Backoff policy for transient failures
    pub retry: RetryPolicy,
    /// Typed effort escalation rules
    pub rules: EffortRules,
    /// Upper bound on a single workflow attempt
    pub task_timeout: Duration,
}

/// A job travelling through the work queue.
pub(super) struct Job {
    pub(super) task: Task,
    pub(super) reply: oneshot::Sender<TaskResult>,
}

/// A fixed-size pool of long-lived workers over one shared work queue.
///
/// Workers are created once at pool construction and reused across tasks;
/// nothing is spawned per task except the contained workflow attempt.
/// Completion order is arbitrary — submitters correlate results by
/// application ID, never by position.
#[derive(Debug)]
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers (at least one) over a fresh queue
    #[must_use]
    pub fn new(worker_count: usize, ctx: WorkerContext) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let ctx = Arc::new(ctx);

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(worker::run(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&ctx),
                ))
            })
            .collect();

        log::info!("worker pool started with {worker_count} workers");
        Self { tx, workers }
    }

    /// Submit one task; resolve the returned receiver for its result.
    ///
    /// The receiver yields an error only if the pool is torn down before
    /// the task completes.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::PoolClosed`] when the pool has shut down.
    pub async fn submit(&self, task: Task) -> Result<oneshot::Receiver<TaskResult>> {
        let (reply, receiver) = oneshot::channel();
        self.tx
            .send(Job { task, reply })
            .await
            .map_err(|_| ErrorKind::PoolClosed)?;
        Ok(receiver)
    }

    /// Submit a batch and wait for every task to finish.
    ///
    /// Results carry no ordering guarantee relative to submission; each
    /// one identifies itself by application ID.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::PoolClosed`] when the pool has shut down.
    pub async fn run_batch(&self, tasks: Vec<Task>) -> Result<Vec<TaskResult>> {
        let mut receivers = Vec::with_capacity(tasks.len());
        for task in tasks {
            receivers.push(self.submit(task).await?);
        }

        let results = join_all(receivers).await;
        Ok(results
            .into_iter()
            .filter_map(|result| match result {
                Ok(result) => Some(result),
                Err(_) => {
                    log::error!("a worker dropped its reply channel");
                    None
                }
            })
            .collect())
    }

    /// Drain in-flight and queued work, then stop all workers.
    ///
    /// Every task that claimed a throttle slot has released it by the time
    /// this returns.
    pub async fn shutdown(self) {
        // Closing the queue lets workers finish what they hold and exit
        drop(self.tx);
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                log::error!("worker {worker_id} did not stop cleanly: {e}");
            }
        }
        log::info!("worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{WorkflowError, WorkflowOutcome};
    use crate::notify::LogNotifier;
    use crate::session::{SessionLimits, SessionParams};
    use crate::store::MemoryStore;
    use crate::throttle::{DomainPolicy, ThrottleConfig};
    use crate::types::{EffortLevel, TaskStatus, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    /// Executor whose behavior is keyed on the task URL path:
    /// `/panic` panics, `/flaky` fails transiently twice before
    /// succeeding, `/reject` fails permanently, anything else succeeds.
    #[derive(Debug, Default)]
    struct ScriptedExecutor {
        flaky_calls: AtomicU32,
    }

    #[async_trait]
    impl WorkflowExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            task: &Task,
            effort: EffortLevel,
        ) -> std::result::Result<WorkflowOutcome, WorkflowError> {
            match task.url.path() {
                "/panic" => panic!("scripted panic"),
                "/reject" => Err(WorkflowError::Rejected("scripted rejection".into())),
                "/flaky" => {
                    if self.flaky_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(WorkflowError::Network("scripted flake".into()))
                    } else {
                        Ok(WorkflowOutcome {
                            effort,
                            usage: Usage::default(),
                        })
                    }
                }
                _ => Ok(WorkflowOutcome {
                    effort,
                    usage: Usage {
                        tokens_input: 10,
                        tokens_output: 5,
                        cost_estimated: 0.001,
                    },
                }),
            }
        }
    }

    struct Harness {
        pool: WorkerPool,
        controller: Arc<SessionController>,
        session_id: Uuid,
    }

    async fn harness(workers: usize, throttle: ThrottleConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let controller = Arc::new(SessionController::new(store, Arc::new(LogNotifier)));
        let session_id = controller
            .create_session(
                SessionParams::builder()
                    .owner(Uuid::new_v4())
                    .name("pool test")
                    .limits(SessionLimits {
                        max_applications: 1000,
                        ..SessionLimits::default()
                    })
                    .build(),
            )
            .await;

        let ctx = WorkerContext {
            throttle: Arc::new(DomainThrottle::new(throttle)),
            executor: Arc::new(ScriptedExecutor::default()),
            controller: Arc::clone(&controller),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
            rules: EffortRules::default(),
            task_timeout: Duration::from_secs(5),
        };
        Harness {
            pool: WorkerPool::new(workers, ctx),
            controller,
            session_id,
        }
    }

    fn relaxed_throttle() -> ThrottleConfig {
        ThrottleConfig {
            default: DomainPolicy {
                min_interval: Duration::ZERO,
                max_concurrent: 100,
                max_applications_per_day: 10_000,
                ..DomainPolicy::default()
            },
            ..ThrottleConfig::default()
        }
    }

    fn task(session_id: Uuid, path: &str) -> Task {
        Task::builder()
            .session_id(session_id)
            .url(format!("https://jobs.example.com{path}")
                .parse()
                .unwrap())
            .build()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_counts_every_task() {
        let h = harness(3, relaxed_throttle()).await;
        let tasks: Vec<_> = (0..10).map(|i| task(h.session_id, &format!("/{i}"))).collect();

        let results = h.pool.run_batch(tasks).await.unwrap();
        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|r| r.status == TaskStatus::Success));

        let snapshot = h.controller.current_snapshot(h.session_id).await.unwrap();
        assert_eq!(snapshot.counters.applications_attempted, 10);
        assert_eq!(snapshot.counters.applications_successful, 10);
        h.pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panic_is_isolated() {
        let h = harness(2, relaxed_throttle()).await;

        let crashed = h
            .pool
            .run_batch(vec![task(h.session_id, "/panic")])
            .await
            .unwrap();
        assert_eq!(crashed[0].status, TaskStatus::Error);
        assert!(crashed[0].detail.as_deref().unwrap().contains("panicked"));

        // The pool keeps serving after the crash
        let next = h
            .pool
            .run_batch(vec![task(h.session_id, "/fine")])
            .await
            .unwrap();
        assert_eq!(next[0].status, TaskStatus::Success);
        h.pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transient_failures_retry_to_success() {
        let h = harness(1, relaxed_throttle()).await;

        let results = h
            .pool
            .run_batch(vec![task(h.session_id, "/flaky")])
            .await
            .unwrap();
        assert_eq!(results[0].status, TaskStatus::Success);
        assert_eq!(results[0].attempts, 3);
        h.pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_permanent_failure_is_not_retried() {
        let h = harness(1, relaxed_throttle()).await;

        let results = h
            .pool
            .run_batch(vec![task(h.session_id, "/reject")])
            .await
            .unwrap();
        assert_eq!(results[0].status, TaskStatus::Failed);
        assert_eq!(results[0].attempts, 1);
        h.pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_throttle_denial_becomes_skip() {
        // Default policy: one concurrent slot, 30s min interval. The
        // second task to the same domain gets denied while the first holds
        // the slot or by the interval afterwards.
        let h = harness(2, ThrottleConfig::default()).await;

        let results = h
            .pool
            .run_batch(vec![
                task(h.session_id, "/a"),
                task(h.session_id, "/b"),
            ])
            .await
            .unwrap();

        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert!(statuses.contains(&TaskStatus::Success));
        assert!(statuses.contains(&TaskStatus::Skipped));

        let snapshot = h.controller.current_snapshot(h.session_id).await.unwrap();
        assert_eq!(snapshot.counters.applications_attempted, 1);
        h.pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submit_after_shutdown_errors() {
        let session_id = Uuid::new_v4();

        // A pool whose queue is already closed
        let (tx, rx) = mpsc::channel::<Job>(1);
        drop(rx);
        let pool = WorkerPool {
            tx,
            workers: Vec::new(),
        };

        assert!(matches!(
            pool.submit(task(session_id, "/late")).await,
            Err(ErrorKind::PoolClosed)
        ));
    }
}
