//! Randomized delay generation for human-like pacing.
//!
//! Pacing is pure sampling from a configured distribution, clamped to
//! `[min, max]`. It has no shared state and is not part of the admission
//! path: callers invoke it between individual browser actions (keystrokes,
//! form fields, navigation), never to gate whether a task may start.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};

/// Shape of the sampled delay distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayDistribution {
    /// Uniform over `[min, max]`
    Uniform,
    /// Normal around `mean` with `stddev`, clamped to `[min, max]`
    Normal,
    /// Exponential with the given `mean`, clamped to `[min, max]`
    Exponential,
}

/// A randomized delay specification.
///
/// `mean` defaults to the midpoint of `[min, max]` and `stddev` to a quarter
/// of the range when unset; both are only consulted by the distributions
/// that need them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelaySpec {
    /// Distribution to sample from
    pub distribution: DelayDistribution,

    /// Lower clamp bound
    #[serde(with = "humantime_serde")]
    pub min: Duration,

    /// Upper clamp bound
    #[serde(with = "humantime_serde")]
    pub max: Duration,

    /// Mean for normal/exponential sampling
    #[serde(default, with = "humantime_serde")]
    pub mean: Option<Duration>,

    /// Standard deviation for normal sampling
    #[serde(default, with = "humantime_serde")]
    pub stddev: Option<Duration>,
}

impl DelaySpec {
    /// Uniform delay over `[min, max]`
    #[must_use]
    pub const fn uniform(min: Duration, max: Duration) -> Self {
        Self {
            distribution: DelayDistribution::Uniform,
            min,
            max,
            mean: None,
            stddev: None,
        }
    }

    /// Normal delay around `mean` with `stddev`, clamped to `[min, max]`
    #[must_use]
    pub const fn normal(min: Duration, max: Duration, mean: Duration, stddev: Duration) -> Self {
        Self {
            distribution: DelayDistribution::Normal,
            min,
            max,
            mean: Some(mean),
            stddev: Some(stddev),
        }
    }

    /// Exponential delay with the midpoint of `[min, max]` as its mean
    #[must_use]
    pub const fn exponential(min: Duration, max: Duration) -> Self {
        Self {
            distribution: DelayDistribution::Exponential,
            min,
            max,
            mean: None,
            stddev: None,
        }
    }

    /// Sample one delay from this specification, clamped to `[min, max]`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_secs_f64();
        let max = self.max.as_secs_f64().max(min);
        let mean = self
            .mean
            .map_or_else(|| (min + max) / 2.0, |d| d.as_secs_f64());

        let sampled = match self.distribution {
            DelayDistribution::Uniform => rng.random_range(min..=max),
            DelayDistribution::Normal => {
                let stddev = self
                    .stddev
                    .map_or_else(|| (max - min) / 4.0, |d| d.as_secs_f64());
                match Normal::new(mean, stddev) {
                    Ok(normal) => normal.sample(rng),
                    // Degenerate stddev (zero range); fall back to the mean
                    Err(_) => mean,
                }
            }
            DelayDistribution::Exponential => {
                if mean <= 0.0 {
                    0.0
                } else {
                    match Exp::new(1.0 / mean) {
                        Ok(exp) => exp.sample(rng),
                        Err(_) => mean,
                    }
                }
            }
        };

        Duration::from_secs_f64(sampled.clamp(min, max))
    }
}
