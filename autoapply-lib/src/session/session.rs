use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::types::{EffortLevel, TaskResult, TaskStatus};

/// Default application cap per session
pub const DEFAULT_MAX_APPLICATIONS: u32 = 100;
/// Default wall-clock budget per session, 1 hour
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(3600);
/// Default number of parallel workers per session
pub const DEFAULT_MAX_PARALLEL_WORKERS: usize = 5;

/// Lifecycle state of a session.
///
/// `Planned`, `Running`, and `Paused` are live; `Completed`,
/// `Interrupted`, and `Failed` are terminal and immutable once entered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SessionStatus {
    /// Created but not yet executing
    Planned,
    /// Actively processing tasks
    Running,
    /// Temporarily suspended; can resume
    Paused,
    /// Finished normally (budget reached or explicitly stopped)
    Completed,
    /// Recovered after a crash of a previous process
    Interrupted,
    /// Lifecycle-level fault
    Failed,
}

impl SessionStatus {
    /// Whether this status is terminal
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `to`
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        match self {
            Self::Planned => matches!(
                to,
                Self::Running | Self::Completed | Self::Interrupted | Self::Failed
            ),
            Self::Running => matches!(
                to,
                Self::Paused | Self::Completed | Self::Interrupted | Self::Failed
            ),
            Self::Paused => matches!(
                to,
                Self::Running | Self::Completed | Self::Interrupted | Self::Failed
            ),
            // Terminal states never move again
            Self::Completed | Self::Interrupted | Self::Failed => false,
        }
    }
}

/// The budgets a session runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionLimits {
    /// Maximum counted application attempts before auto-completion
    pub max_applications: u32,

    /// Maximum wall-clock time since session start before auto-completion
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,

    /// Worker parallelism requested for this session
    pub max_parallel_workers: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_applications: DEFAULT_MAX_APPLICATIONS,
            max_duration: DEFAULT_MAX_DURATION,
            max_parallel_workers: DEFAULT_MAX_PARALLEL_WORKERS,
        }
    }
}

/// The six running counters of a session.
///
/// Invariants: `applications_attempted >= applications_successful` and
/// `applications_attempted == count_low + count_medium + count_high`.
/// Both hold because counters are only ever mutated through
/// [`apply`](SessionCounters::apply) under the controller's per-session
/// lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Counted application attempts (success, failed, or error)
    pub applications_attempted: u64,
    /// Applications that were actually submitted
    pub applications_successful: u64,
    /// Attempts executed at low effort
    pub count_low_effort: u64,
    /// Attempts executed at medium effort
    pub count_medium_effort: u64,
    /// Attempts executed at high effort
    pub count_high_effort: u64,
    /// Input tokens across all attempts
    pub tokens_input_total: u64,
    /// Output tokens across all attempts
    pub tokens_output_total: u64,
    /// Estimated total cost in USD
    pub cost_estimated_total: f64,
}

impl SessionCounters {
    /// Fold one counter delta into the totals
    pub fn apply(&mut self, delta: &CounterDelta) {
        self.applications_attempted += u64::from(delta.attempted);
        self.applications_successful += u64::from(delta.successful);
        if delta.attempted > 0 {
            match delta.effort {
                EffortLevel::Low => self.count_low_effort += 1,
                EffortLevel::Medium => self.count_medium_effort += 1,
                EffortLevel::High => self.count_high_effort += 1,
            }
        }
        self.tokens_input_total += delta.tokens_input;
        self.tokens_output_total += delta.tokens_output;
        self.cost_estimated_total += delta.cost_estimated;
    }
}

/// The increment one task result contributes to its session.
///
/// Built once per result and applied both to the in-memory runtime and to
/// the store, so the two views cannot diverge on what a result was worth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterDelta {
    /// 1 when the result consumed an attempt, else 0
    pub attempted: u8,
    /// 1 when the application was submitted, else 0
    pub successful: u8,
    /// Effort dimension the attempt counts under
    pub effort: EffortLevel,
    /// Input tokens spent
    pub tokens_input: u64,
    /// Output tokens spent
    pub tokens_output: u64,
    /// Estimated cost spent
    pub cost_estimated: f64,
}

impl From<&TaskResult> for CounterDelta {
    fn from(result: &TaskResult) -> Self {
        Self {
            attempted: u8::from(result.counts_as_attempt()),
            successful: u8::from(result.status == TaskStatus::Success),
            effort: result.effort,
            tokens_input: result.usage.tokens_input,
            tokens_output: result.usage.tokens_output,
            cost_estimated: result.usage.cost_estimated,
        }
    }
}

/// Parameters for creating a new session.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SessionParams {
    /// The user this session applies on behalf of
    pub owner: Uuid,

    /// Human-readable session name
    #[builder(setter(into))]
    pub name: String,

    /// Budgets; defaults to 100 applications / 1 hour / 5 workers
    #[builder(default)]
    pub limits: SessionLimits,

    /// Opaque configuration snapshot stored alongside the session
    #[builder(default)]
    pub config: HashMap<String, String>,
}

/// The persisted representation of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identity
    pub id: Uuid,
    /// Owning user
    pub owner: Uuid,
    /// Human-readable name
    pub name: String,
    /// Lifecycle state
    pub status: SessionStatus,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal state
    pub ended_at: Option<DateTime<Utc>>,
    /// Budgets
    pub limits: SessionLimits,
    /// Opaque configuration snapshot
    pub config: HashMap<String, String>,
    /// Running counters
    pub counters: SessionCounters,
}

impl SessionRecord {
    /// Create a fresh record in `Running` state with zeroed counters
    #[must_use]
    pub fn new(params: SessionParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: params.owner,
            name: params.name,
            status: SessionStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            limits: params.limits,
            config: params.config,
            counters: SessionCounters::default(),
        }
    }

    /// Wall-clock time this session has been (or was) running
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}

/// Read-only aggregate view of a session for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Session identity
    pub session_id: Uuid,
    /// Lifecycle state at snapshot time
    pub status: SessionStatus,
    /// Counter values at snapshot time
    pub counters: SessionCounters,
    /// Wall-clock time since session start
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// The budgets the session runs under
    pub limits: SessionLimits,
}
