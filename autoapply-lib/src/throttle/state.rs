use std::time::{Duration, Instant};

use chrono::NaiveDate;
use thiserror::Error;

use super::policy::DomainPolicy;

/// Why a task may not start against a domain right now.
///
/// Denials are policy decisions, not errors: workers convert them into
/// `Skipped` results and never retry them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    /// The policy marks this domain as avoid
    #[error("domain is marked as avoid")]
    Avoided,

    /// A temporary block is still active
    #[error("domain temporarily blocked for another {}s", remaining.as_secs())]
    Blocked {
        /// Time until the block expires
        remaining: Duration,
    },

    /// The daily application cap is exhausted
    #[error("daily limit reached ({count}/{max})")]
    DailyCapReached {
        /// Applications already started today
        count: u32,
        /// The configured cap
        max: u32,
    },

    /// All concurrent slots for this domain are taken
    #[error("concurrent limit reached ({running}/{max} running)")]
    ConcurrencyCapReached {
        /// Applications currently running
        running: usize,
        /// The configured cap
        max: usize,
    },

    /// The minimum interval since the last application has not elapsed
    #[error("must wait {}s before next application", wait.as_secs().max(1))]
    MinInterval {
        /// Remaining wait time
        wait: Duration,
    },
}

/// Mutable runtime counters for one domain.
///
/// Every mutation happens under the owning mutex in
/// [`DomainThrottle`](super::DomainThrottle); check-then-act is always a
/// single critical section.
#[derive(Debug)]
pub(crate) struct DomainState {
    /// Calendar day the daily counter belongs to
    day: NaiveDate,
    /// Applications started on `day`
    applications_today: u32,
    /// When the last application started
    last_application: Option<Instant>,
    /// Applications currently running
    currently_running: usize,
    /// Active temporary block, if any
    blocked_until: Option<Instant>,
}

impl DomainState {
    pub(crate) fn new(today: NaiveDate) -> Self {
        Self {
            day: today,
            applications_today: 0,
            last_application: None,
            currently_running: 0,
            blocked_until: None,
        }
    }

    /// Evaluate all admission checks in policy order.
    ///
    /// Mutation here is limited to housekeeping: expired blocks are cleared
    /// and the daily counter rolls over when the calendar day changed.
    pub(crate) fn check(
        &mut self,
        policy: &DomainPolicy,
        now: Instant,
        today: NaiveDate,
    ) -> Result<(), Denial> {
        if policy.avoid {
            return Err(Denial::Avoided);
        }

        if let Some(until) = self.blocked_until {
            if now < until {
                return Err(Denial::Blocked {
                    remaining: until - now,
                });
            }
            self.blocked_until = None;
        }

        if self.day != today {
            self.day = today;
            self.applications_today = 0;
        }

        if self.applications_today >= policy.max_applications_per_day {
            return Err(Denial::DailyCapReached {
                count: self.applications_today,
                max: policy.max_applications_per_day,
            });
        }

        if self.currently_running >= policy.max_concurrent {
            return Err(Denial::ConcurrencyCapReached {
                running: self.currently_running,
                max: policy.max_concurrent,
            });
        }

        if let Some(last) = self.last_application {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < policy.min_interval {
                return Err(Denial::MinInterval {
                    wait: policy.min_interval - elapsed,
                });
            }
        }

        Ok(())
    }

    /// Record an application start
    pub(crate) fn start(&mut self, now: Instant) {
        self.applications_today += 1;
        self.last_application = Some(now);
        self.currently_running += 1;
    }

    /// Record an application end; never underflows even on double release
    pub(crate) fn end(&mut self) {
        self.currently_running = self.currently_running.saturating_sub(1);
    }

    /// Impose a temporary block until `until`
    pub(crate) fn block(&mut self, until: Instant) {
        self.blocked_until = Some(until);
    }

    pub(crate) const fn currently_running(&self) -> usize {
        self.currently_running
    }

    pub(crate) const fn applications_today(&self) -> u32 {
        self.applications_today
    }
}
