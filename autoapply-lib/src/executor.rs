//! The workflow executor seam.
//!
//! The engine never fills forms itself. Matching, answer generation, and
//! browser automation live behind [`WorkflowExecutor`], supplied by the
//! caller; the core only schedules, throttles, retries, and accounts for
//! what the executor reports back.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{EffortLevel, Task, Usage};

/// What a completed workflow run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome {
    /// Effort level the workflow actually spent (it may have downgraded)
    pub effort: EffortLevel,
    /// Token and cost accounting for this run
    pub usage: Usage,
}

/// Failure taxonomy for workflow runs.
///
/// The split drives the retry policy: transient variants are retried with
/// exponential backoff up to the attempt cap, permanent variants fail the
/// task on the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// Network-level failure reaching the destination (transient)
    #[error("network error: {0}")]
    Network(String),

    /// The destination or an upstream provider answered with a 5xx-class
    /// failure (transient)
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The workflow hit its own internal deadline (transient)
    #[error("workflow timed out: {0}")]
    Timeout(String),

    /// The generated application failed validation and resubmitting the
    /// same content cannot succeed (permanent)
    #[error("validation failed: {0}")]
    Validation(String),

    /// The destination actively rejected the application (permanent)
    #[error("application rejected: {0}")]
    Rejected(String),
}

impl WorkflowError {
    /// Whether the retry loop may try this failure again
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::ProviderUnavailable(_) | Self::Timeout(_)
        )
    }
}

/// Executes one application workflow for a task.
///
/// Implementations encapsulate everything between "this task may start"
/// and "the application was submitted": profile matching, content
/// generation, form filling, CAPTCHA handling. They may run for seconds to
/// minutes; the worker pool bounds each attempt with its own timeout and
/// contains panics at the task boundary.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync + std::fmt::Debug {
    /// Run the application workflow for `task` at the given effort level
    ///
    /// # Errors
    ///
    /// Returns a [`WorkflowError`] describing the failure; its
    /// classification decides whether the pool retries.
    async fn execute(
        &self,
        task: &Task,
        effort: EffortLevel,
    ) -> Result<WorkflowOutcome, WorkflowError>;
}
