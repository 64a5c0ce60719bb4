//! The bounded worker pool.
//!
//! A fixed set of long-lived workers pulls tasks from one shared queue,
//! consults the domain throttle before touching a destination, runs the
//! externally supplied workflow with per-attempt timeouts and
//! exponential-backoff retries, and reports every outcome to the session
//! controller. Failures are isolated at the task boundary: a panicking
//! workflow costs one `Error` result, never a worker or the pool.

#[allow(clippy::module_inception)]
mod pool;
mod worker;

pub use pool::{WorkerContext, WorkerPool, DEFAULT_TASK_TIMEOUT, DEFAULT_WORKER_COUNT};
