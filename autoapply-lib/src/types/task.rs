use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use url::Url;
use uuid::Uuid;

use crate::throttle::DomainKey;
use crate::types::{EffortLevel, Result};

/// Facts about the job posting a task applies to.
///
/// Scoring and keyword extraction happen upstream (matching is an external
/// collaborator); the engine only reads these fields when evaluating typed
/// effort rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Job title as scraped from the posting
    #[serde(default)]
    pub title: String,

    /// Company name
    #[serde(default)]
    pub company: String,

    /// Match score in `[0, 1]` from the profile matcher, if available
    #[serde(default)]
    pub match_score: Option<f64>,

    /// Number of profile keywords found in the posting, if available
    #[serde(default)]
    pub keyword_overlap: Option<u32>,
}

/// One application attempt: apply to one destination on behalf of one
/// session.
///
/// Tasks are created by the caller when submitting a batch, consumed exactly
/// once by exactly one worker, and never mutated after dispatch. Outcomes
/// are reported separately as [`TaskResult`](crate::TaskResult)s and
/// correlated by [`application_id`](Task::application_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct Task {
    /// Identity of this application attempt
    #[builder(default = Uuid::new_v4())]
    pub application_id: Uuid,

    /// The session this task counts against
    pub session_id: Uuid,

    /// Destination posting URL; its host is the rate-limiting unit
    pub url: Url,

    /// Job posting facts consumed by effort rules
    #[builder(default)]
    pub job: JobMetadata,

    /// Suggested effort level; typed rules may upgrade, downgrade, or skip
    #[builder(default)]
    pub effort_hint: EffortLevel,
}

impl Task {
    /// The destination domain this task is throttled on
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MissingHost`](crate::ErrorKind::MissingHost) if
    /// the URL has no host component (e.g. a `file:` URL).
    pub fn domain(&self) -> Result<DomainKey> {
        DomainKey::try_from(&self.url)
    }
}
