//! `autoapply-lib` runs many independent job-application workflows under
//! global resource limits: a session time budget, an application count
//! budget, bounded worker concurrency, and per-destination throttling.
//!
//! The crate is built from three cooperating components:
//!
//! - [`throttle::DomainThrottle`] arbitrates concurrent access to any
//!   single destination site (daily caps, minimum intervals, concurrency
//!   slots, temporary blocks, avoid lists) and paces form input;
//! - [`pool::WorkerPool`] executes tasks on a fixed set of long-lived
//!   workers with per-task retry, timeouts, and failure isolation;
//! - [`session::SessionController`] owns session budgets and counters,
//!   persists digests, and recovers interrupted sessions after a crash.
//!
//! The actual form-filling workflow is supplied by the caller through the
//! [`WorkflowExecutor`] trait; persistence and notification go through the
//! [`store::SessionStore`] and [`notify::Notifier`] seams.
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use autoapply_lib::{
//!     EffortLevel, EngineBuilder, SessionParams, Task, Usage, WorkflowError,
//!     WorkflowExecutor, WorkflowOutcome,
//! };
//!
//! #[derive(Debug)]
//! struct NoopWorkflow;
//!
//! #[async_trait]
//! impl WorkflowExecutor for NoopWorkflow {
//!     async fn execute(
//!         &self,
//!         _task: &Task,
//!         effort: EffortLevel,
//!     ) -> Result<WorkflowOutcome, WorkflowError> {
//!         Ok(WorkflowOutcome {
//!             effort,
//!             usage: Usage::default(),
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = EngineBuilder::builder()
//!         .executor(Arc::new(NoopWorkflow))
//!         .build()
//!         .engine();
//!
//!     let session = engine
//!         .create_session(
//!             SessionParams::builder()
//!                 .owner(uuid::Uuid::new_v4())
//!                 .name("docs session")
//!                 .build(),
//!         )
//!         .await;
//!
//!     let task = Task::builder()
//!         .session_id(session)
//!         .url("https://jobs.example.com/postings/1".parse().unwrap())
//!         .build();
//!
//!     let results = engine.run_batch(vec![task]).await.unwrap();
//!     assert_eq!(results.len(), 1);
//!     engine.shutdown().await;
//! }
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![deny(missing_docs)]

mod engine;
mod executor;
mod retry;
mod rules;
mod types;

pub mod notify;
pub mod pool;
pub mod session;
pub mod store;
pub mod throttle;

pub use engine::{Engine, EngineBuilder};
pub use executor::{WorkflowError, WorkflowExecutor, WorkflowOutcome};
pub use retry::RetryPolicy;
pub use rules::{
    EffortDecision, EffortRule, EffortRules, RuleAction, RuleCondition, RuleField, RuleOp,
};
pub use session::{SessionLimits, SessionParams, SessionSnapshot, SessionStatus};
pub use types::*;
