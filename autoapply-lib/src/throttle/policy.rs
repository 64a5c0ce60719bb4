use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::key::DomainKey;
use super::pacing::DelaySpec;
use crate::types::{ErrorKind, Result};

/// Default daily application cap per domain
const DEFAULT_MAX_PER_DAY: u32 = 50;

/// Default minimum interval between applications to the same domain
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of concurrent applications per domain
const DEFAULT_MAX_CONCURRENT: usize = 1;

/// Per-domain throttling and pacing policy.
///
/// Immutable once loaded; the live counters it governs live in
/// [`DomainThrottle`](super::DomainThrottle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DomainPolicy {
    /// Maximum applications per calendar day
    pub max_applications_per_day: u32,

    /// Minimum pause between two application starts
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,

    /// Maximum applications running against this domain at once
    pub max_concurrent: usize,

    /// Never apply here (aggressive bot detection, user blocklist, ...)
    pub avoid: bool,

    /// Keystroke pacing when typing into this domain's forms
    pub keystroke_delay: DelaySpec,

    /// Pause between individual form actions
    pub inter_action_pause: DelaySpec,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            max_applications_per_day: DEFAULT_MAX_PER_DAY,
            min_interval: DEFAULT_MIN_INTERVAL,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            avoid: false,
            keystroke_delay: DelaySpec::normal(
                Duration::from_millis(10),
                Duration::from_millis(400),
                Duration::from_millis(120),
                Duration::from_millis(40),
            ),
            inter_action_pause: DelaySpec::uniform(
                Duration::from_millis(500),
                Duration::from_secs(3),
            ),
        }
    }
}

impl DomainPolicy {
    /// Sample a keystroke delay for this domain
    #[must_use]
    pub fn keystroke_delay(&self) -> Duration {
        self.keystroke_delay.sample(&mut rand::rng())
    }

    /// Sample an inter-action pause for this domain
    #[must_use]
    pub fn inter_action_pause(&self) -> Duration {
        self.inter_action_pause.sample(&mut rand::rng())
    }
}

/// Throttle configuration: a default policy plus per-domain overrides.
///
/// Unknown domains fall back to the default policy, so a single config file
/// covers the long tail of one-off company career pages while the big job
/// boards get explicit, tighter limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ThrottleConfig {
    /// Fallback policy for domains without an override
    pub default: DomainPolicy,

    /// Per-domain policy overrides, keyed by exact domain
    pub domains: HashMap<DomainKey, DomainPolicy>,
}

impl ThrottleConfig {
    /// Load a throttle configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ConfigRead`] when the file cannot be read and
    /// [`ErrorKind::ConfigParse`] when it is not valid for this schema.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ErrorKind::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ErrorKind::ConfigParse(Box::new(e)))
    }

    /// The effective policy for a domain, falling back to the default
    #[must_use]
    pub fn effective_policy(&self, domain: &DomainKey) -> &DomainPolicy {
        self.domains.get(domain).unwrap_or(&self.default)
    }
}
