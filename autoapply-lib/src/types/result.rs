use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::throttle::DomainKey;
use crate::types::{EffortLevel, Task};

/// Terminal status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    /// The application was submitted
    Success,
    /// The workflow reported an unrecoverable failure (never retried)
    Failed,
    /// A policy denied the task before any work happened (never retried)
    Skipped,
    /// Transient failures exhausted the retry budget, the task timed out,
    /// or the workflow crashed
    Error,
}

/// Token and cost accounting reported by the workflow executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens consumed by generation calls
    pub tokens_input: u64,
    /// Output tokens produced by generation calls
    pub tokens_output: u64,
    /// Estimated cost in USD
    pub cost_estimated: f64,
}

impl Usage {
    /// Merge another usage record into this one
    pub fn merge(&mut self, other: &Usage) {
        self.tokens_input += other.tokens_input;
        self.tokens_output += other.tokens_output;
        self.cost_estimated += other.cost_estimated;
    }
}

/// The outcome of one [`Task`], produced by a worker and consumed by the
/// session controller.
///
/// Results arrive in completion order, not submission order; correlate by
/// [`application_id`](TaskResult::application_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// The application attempt this result belongs to
    pub application_id: Uuid,

    /// The owning session
    pub session_id: Uuid,

    /// Destination domain, when the URL had one
    pub domain: Option<DomainKey>,

    /// How the task ended
    pub status: TaskStatus,

    /// Effort level actually used
    pub effort: EffortLevel,

    /// Token/cost usage accumulated across attempts
    #[serde(default)]
    pub usage: Usage,

    /// Number of execution attempts made (0 for skips)
    pub attempts: u32,

    /// Denial reason or error detail, if any
    pub detail: Option<String>,
}

impl TaskResult {
    /// A submitted application
    #[must_use]
    pub fn success(task: &Task, effort: EffortLevel, usage: Usage, attempts: u32) -> Self {
        Self::new(task, TaskStatus::Success, effort, usage, attempts, None)
    }

    /// A permanent workflow failure
    #[must_use]
    pub fn failed(task: &Task, effort: EffortLevel, attempts: u32, detail: String) -> Self {
        Self::new(
            task,
            TaskStatus::Failed,
            effort,
            Usage::default(),
            attempts,
            Some(detail),
        )
    }

    /// A policy denial; carries the denial reason and consumed no attempt
    #[must_use]
    pub fn skipped(task: &Task, reason: String) -> Self {
        Self::new(
            task,
            TaskStatus::Skipped,
            task.effort_hint,
            Usage::default(),
            0,
            Some(reason),
        )
    }

    /// Retries exhausted, timeout, or workflow crash
    #[must_use]
    pub fn error(task: &Task, effort: EffortLevel, attempts: u32, detail: String) -> Self {
        Self::new(
            task,
            TaskStatus::Error,
            effort,
            Usage::default(),
            attempts,
            Some(detail),
        )
    }

    fn new(
        task: &Task,
        status: TaskStatus,
        effort: EffortLevel,
        usage: Usage,
        attempts: u32,
        detail: Option<String>,
    ) -> Self {
        Self {
            application_id: task.application_id,
            session_id: task.session_id,
            domain: task.domain().ok(),
            status,
            effort,
            usage,
            attempts,
            detail,
        }
    }

    /// Whether this result consumed an application attempt.
    ///
    /// Skips never reached the destination; they are recorded as events but
    /// do not move the session's `applications_attempted` counter.
    #[must_use]
    pub const fn counts_as_attempt(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Error
        )
    }
}
