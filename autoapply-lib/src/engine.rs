//! Wiring of the three core components into one runtime object graph.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::executor::WorkflowExecutor;
use crate::notify::{LogNotifier, Notifier};
use crate::pool::{WorkerContext, WorkerPool, DEFAULT_TASK_TIMEOUT, DEFAULT_WORKER_COUNT};
use crate::retry::RetryPolicy;
use crate::rules::EffortRules;
use crate::session::{SessionController, SessionParams, SessionSnapshot};
use crate::store::{MemoryStore, SessionStore};
use crate::throttle::{DomainThrottle, ThrottleConfig};
use crate::types::{Result, Task, TaskResult};

fn default_store() -> Arc<dyn SessionStore> {
    Arc::new(MemoryStore::new())
}

fn default_notifier() -> Arc<dyn Notifier> {
    Arc::new(LogNotifier)
}

/// Builder for [`Engine`].
///
/// All components are constructed exactly once when
/// [`engine`](EngineBuilder::engine) is called and passed by reference to
/// every call site; lifecycle is explicit construction and
/// [`Engine::shutdown`], never import-time side effects.
///
/// See the crate-level documentation for a usage example.
#[derive(Debug, TypedBuilder)]
pub struct EngineBuilder {
    /// The externally supplied application workflow
    executor: Arc<dyn WorkflowExecutor>,

    /// Durable session persistence; defaults to the in-memory store
    #[builder(default = default_store())]
    store: Arc<dyn SessionStore>,

    /// Digest delivery; defaults to logging
    #[builder(default = default_notifier())]
    notifier: Arc<dyn Notifier>,

    /// Per-domain limits and pacing
    #[builder(default)]
    throttle: ThrottleConfig,

    /// Backoff policy for transient workflow failures
    #[builder(default)]
    retry: RetryPolicy,

    /// Typed effort escalation rules
    #[builder(default)]
    rules: EffortRules,

    /// Number of pool workers
    #[builder(default = DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Upper bound on a single workflow attempt
    #[builder(default = DEFAULT_TASK_TIMEOUT)]
    task_timeout: Duration,
}

impl EngineBuilder {
    /// Construct the engine: throttle, controller, and worker pool, wired
    #[must_use]
    pub fn engine(self) -> Engine {
        let throttle = Arc::new(DomainThrottle::new(self.throttle));
        let controller = Arc::new(SessionController::new(self.store, self.notifier));

        let pool = WorkerPool::new(
            self.workers,
            WorkerContext {
                throttle: Arc::clone(&throttle),
                executor: self.executor,
                controller: Arc::clone(&controller),
                retry: self.retry,
                rules: self.rules,
                task_timeout: self.task_timeout,
            },
        );

        Engine {
            controller,
            throttle,
            pool,
        }
    }
}

/// The assembled application engine.
///
/// Owns the worker pool and shares the controller and throttle with it.
/// One engine per process is the expected shape, but nothing prevents
/// several with separate stores.
#[derive(Debug)]
pub struct Engine {
    controller: Arc<SessionController>,
    throttle: Arc<DomainThrottle>,
    pool: WorkerPool,
}

impl Engine {
    /// Create a new session; see [`SessionController::create_session`]
    pub async fn create_session(&self, params: SessionParams) -> Uuid {
        self.controller.create_session(params).await
    }

    /// Submit one task for asynchronous execution
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::PoolClosed`](crate::ErrorKind::PoolClosed)
    /// when the pool has shut down.
    pub async fn submit(&self, task: Task) -> Result<oneshot::Receiver<TaskResult>> {
        self.pool.submit(task).await
    }

    /// Run a batch of tasks and wait for all results
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::PoolClosed`](crate::ErrorKind::PoolClosed)
    /// when the pool has shut down.
    pub async fn run_batch(&self, tasks: Vec<Task>) -> Result<Vec<TaskResult>> {
        self.pool.run_batch(tasks).await
    }

    /// Stop a session; see [`SessionController::stop_session`]
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::SessionNotFound`](crate::ErrorKind::SessionNotFound)
    /// for unknown sessions.
    pub async fn stop_session(&self, id: Uuid, reason: &str) -> Result<()> {
        self.controller.stop_session(id, reason).await
    }

    /// Read-only monitoring view; see [`SessionController::current_snapshot`]
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::SessionNotFound`](crate::ErrorKind::SessionNotFound)
    /// for unknown sessions.
    pub async fn current_snapshot(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.controller.current_snapshot(id).await
    }

    /// Crash-recovery scan; see [`SessionController::recover_active_sessions`]
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) when the scan
    /// fails.
    pub async fn recover_active_sessions(&self) -> Result<Vec<Uuid>> {
        self.controller.recover_active_sessions().await
    }

    /// The session controller, for pause/resume and direct registration
    #[must_use]
    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// The domain throttle, for external block signals and pacing lookups
    #[must_use]
    pub fn throttle(&self) -> &Arc<DomainThrottle> {
        &self.throttle
    }

    /// Drain in-flight work and stop all workers
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}
