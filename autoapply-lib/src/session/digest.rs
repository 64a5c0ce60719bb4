use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::SessionRecord;

/// Immutable end-of-session summary.
///
/// Generated exactly once per session from its final counters, persisted,
/// and handed to the notifier. A digest for a recovered session reflects
/// whatever counters survived the crash, which may undercount work that
/// was in flight; that gap is accepted rather than guessed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    /// The summarized session
    pub session_id: Uuid,
    /// Session name at generation time
    pub session_name: String,
    /// Wall-clock duration of the session
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Counted application attempts
    pub applications_total: u64,
    /// Submitted applications
    pub applications_successful: u64,
    /// Attempts that failed or errored
    pub applications_failed: u64,
    /// Attempts at low effort
    pub count_low_effort: u64,
    /// Attempts at medium effort
    pub count_medium_effort: u64,
    /// Attempts at high effort
    pub count_high_effort: u64,
    /// Total input tokens
    pub tokens_input_total: u64,
    /// Total output tokens
    pub tokens_output_total: u64,
    /// Total estimated cost in USD
    pub cost_estimated_total: f64,
    /// Most recent recorded error details
    pub errors: Vec<String>,
    /// When this digest was generated
    pub generated_at: DateTime<Utc>,
}

impl Digest {
    /// Build a digest from a session's final record
    #[must_use]
    pub fn from_record(record: &SessionRecord, errors: Vec<String>) -> Self {
        let counters = &record.counters;
        Self {
            session_id: record.id,
            session_name: record.name.clone(),
            duration: record.elapsed(),
            applications_total: counters.applications_attempted,
            applications_successful: counters.applications_successful,
            applications_failed: counters
                .applications_attempted
                .saturating_sub(counters.applications_successful),
            count_low_effort: counters.count_low_effort,
            count_medium_effort: counters.count_medium_effort,
            count_high_effort: counters.count_high_effort,
            tokens_input_total: counters.tokens_input_total,
            tokens_output_total: counters.tokens_output_total,
            cost_estimated_total: counters.cost_estimated_total,
            errors,
            generated_at: Utc::now(),
        }
    }

    /// Human-readable summary text
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Session '{}' finished after {}s: {} attempted, {} successful, {} failed \
             (effort low/medium/high: {}/{}/{}), {} input / {} output tokens, est. cost ${:.2}",
            self.session_name,
            self.duration.as_secs(),
            self.applications_total,
            self.applications_successful,
            self.applications_failed,
            self.count_low_effort,
            self.count_medium_effort,
            self.count_high_effort,
            self.tokens_input_total,
            self.tokens_output_total,
            self.cost_estimated_total,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionParams, SessionStatus};

    #[test]
    fn test_digest_from_record() {
        let mut record = SessionRecord::new(
            SessionParams::builder()
                .owner(Uuid::new_v4())
                .name("evening batch")
                .build(),
        );
        record.counters.applications_attempted = 5;
        record.counters.applications_successful = 3;
        record.counters.count_medium_effort = 5;
        record.counters.cost_estimated_total = 1.25;
        record.status = SessionStatus::Completed;
        record.ended_at = Some(record.started_at + chrono::Duration::seconds(90));

        let digest = Digest::from_record(&record, vec!["timeout on form".into()]);

        assert_eq!(digest.applications_total, 5);
        assert_eq!(digest.applications_failed, 2);
        assert_eq!(digest.duration, Duration::from_secs(90));
        let summary = digest.summary();
        assert!(summary.contains("evening batch"));
        assert!(summary.contains("5 attempted"));
        assert!(summary.contains("$1.25"));
    }
}
