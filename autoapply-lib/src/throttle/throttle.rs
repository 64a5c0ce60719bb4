use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;

use super::key::DomainKey;
use super::policy::{DomainPolicy, ThrottleConfig};
use super::state::{Denial, DomainState};

/// Per-destination admission control for application tasks.
///
/// One [`DomainThrottle`] arbitrates all concurrent access to external
/// sites: daily caps, minimum intervals between applications, per-domain
/// concurrency limits, avoid flags, and temporary blocks triggered by
/// downstream rate-limit signals.
///
/// # Atomicity
///
/// Each domain's runtime state sits behind its own mutex. [`acquire`]
/// evaluates every admission check *and* records the start inside one
/// critical section, so two workers racing on the same domain can never
/// both pass the concurrency check when only one slot remains.
///
/// [`acquire`]: DomainThrottle::acquire
#[derive(Debug)]
pub struct DomainThrottle {
    /// Static policies: default plus per-domain overrides
    config: ThrottleConfig,

    /// Live per-domain counters, created lazily on first access
    states: DashMap<DomainKey, Arc<Mutex<DomainState>>>,
}

impl DomainThrottle {
    /// Create a throttle from the given configuration
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        log::info!(
            "domain throttle initialized with {} domain policies",
            config.domains.len()
        );
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// The effective policy for a domain (override or default)
    #[must_use]
    pub fn policy(&self, domain: &DomainKey) -> &DomainPolicy {
        self.config.effective_policy(domain)
    }

    /// Check whether a task may start against `domain` right now.
    ///
    /// This is the advisory form: it does not reserve anything, so the
    /// answer may already be stale by the time the caller acts on it. Task
    /// admission goes through [`acquire`](DomainThrottle::acquire) instead.
    ///
    /// # Errors
    ///
    /// Returns the strongest applicable [`Denial`], in policy order:
    /// avoid flag, active block, daily cap, concurrency cap, minimum
    /// interval.
    ///
    /// # Panics
    ///
    /// Panics if a domain state mutex is poisoned.
    pub fn can_start(&self, domain: &DomainKey) -> Result<(), Denial> {
        let policy = self.config.effective_policy(domain);
        let state = self.state(domain);
        let mut state = state.lock().unwrap();
        state.check(policy, Instant::now(), Utc::now().date_naive())
    }

    /// Atomically check all admission rules and claim a slot.
    ///
    /// On success the returned [`ThrottleGuard`] holds the slot; dropping
    /// it releases the slot on every exit path, including panics. Callers
    /// that want to be explicit can call [`ThrottleGuard::release`].
    ///
    /// # Errors
    ///
    /// Returns the applicable [`Denial`] without mutating any counter.
    ///
    /// # Panics
    ///
    /// Panics if a domain state mutex is poisoned.
    pub fn acquire(&self, domain: &DomainKey) -> Result<ThrottleGuard, Denial> {
        let policy = self.config.effective_policy(domain);
        let state = self.state(domain);
        {
            let mut guard = state.lock().unwrap();
            let now = Instant::now();
            guard.check(policy, now, Utc::now().date_naive())?;
            guard.start(now);
            log::debug!(
                "application started for {domain}: {} today, {} running",
                guard.applications_today(),
                guard.currently_running()
            );
        }
        Ok(ThrottleGuard {
            state,
            domain: domain.clone(),
        })
    }

    /// Record an application start without checking.
    ///
    /// Part of the low-level contract for callers that already hold a
    /// positive [`can_start`](DomainThrottle::can_start) answer under
    /// external serialization. Workers use
    /// [`acquire`](DomainThrottle::acquire).
    ///
    /// # Panics
    ///
    /// Panics if the domain state mutex is poisoned.
    pub fn start(&self, domain: &DomainKey) {
        let state = self.state(domain);
        let mut state = state.lock().unwrap();
        state.start(Instant::now());
    }

    /// Release a slot for `domain`.
    ///
    /// Must be called on every exit path of a task that called
    /// [`start`](DomainThrottle::start); releasing more often than started
    /// is tolerated and clamps at zero.
    ///
    /// # Panics
    ///
    /// Panics if the domain state mutex is poisoned.
    pub fn end(&self, domain: &DomainKey) {
        let state = self.state(domain);
        let mut state = state.lock().unwrap();
        state.end();
        log::debug!(
            "application ended for {domain}: {} still running",
            state.currently_running()
        );
    }

    /// Temporarily block a domain, e.g. after a downstream 403 or
    /// rate-limit response.
    ///
    /// Blocking is the strongest denial; it overrides the daily and
    /// concurrency counters until it expires, at which point the domain
    /// unblocks on the next check.
    ///
    /// # Panics
    ///
    /// Panics if the domain state mutex is poisoned.
    pub fn block(&self, domain: &DomainKey, duration: Duration) {
        let state = self.state(domain);
        let mut state = state.lock().unwrap();
        state.block(Instant::now() + duration);
        log::warn!(
            "{domain} blocked for {}s due to rate limiting",
            duration.as_secs()
        );
    }

    /// Number of applications currently running against `domain`
    ///
    /// # Panics
    ///
    /// Panics if the domain state mutex is poisoned.
    #[must_use]
    pub fn currently_running(&self, domain: &DomainKey) -> usize {
        self.state(domain).lock().unwrap().currently_running()
    }

    /// Get an existing domain state or lazily create one
    fn state(&self, domain: &DomainKey) -> Arc<Mutex<DomainState>> {
        if let Some(state) = self.states.get(domain) {
            return Arc::clone(&state);
        }

        let today = Utc::now().date_naive();
        // Handle the race where another thread created it in between
        match self.states.entry(domain.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Arc::clone(entry.get()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                Arc::clone(&entry.insert(Arc::new(Mutex::new(DomainState::new(today)))))
            }
        }
    }
}

/// A claimed throttle slot.
///
/// Dropping the guard releases the slot, which makes release behave like a
/// `finally` block: success, error, and panic paths all decrement the
/// domain's running counter exactly once.
#[must_use = "dropping the guard releases the throttle slot immediately"]
#[derive(Debug)]
pub struct ThrottleGuard {
    state: Arc<Mutex<DomainState>>,
    domain: DomainKey,
}

impl ThrottleGuard {
    /// Release the slot now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ThrottleGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.end();
            log::debug!(
                "application ended for {}: {} still running",
                self.domain,
                state.currently_running()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn throttle_with(domain: &str, policy: DomainPolicy) -> DomainThrottle {
        let mut domains = HashMap::new();
        domains.insert(DomainKey::from(domain), policy);
        DomainThrottle::new(ThrottleConfig {
            default: DomainPolicy::default(),
            domains,
        })
    }

    fn relaxed(max_concurrent: usize, max_per_day: u32) -> DomainPolicy {
        DomainPolicy {
            max_applications_per_day: max_per_day,
            min_interval: Duration::ZERO,
            max_concurrent,
            ..DomainPolicy::default()
        }
    }

    #[test]
    fn test_concurrency_cap_denies_excess() {
        let domain = DomainKey::from("jobs.example.com");
        let throttle = throttle_with("jobs.example.com", relaxed(2, 100));

        let first = throttle.acquire(&domain).unwrap();
        let _second = throttle.acquire(&domain).unwrap();

        // Third concurrent start is exactly the one that gets denied
        assert!(matches!(
            throttle.acquire(&domain),
            Err(Denial::ConcurrencyCapReached { running: 2, max: 2 })
        ));

        first.release();
        assert!(throttle.acquire(&domain).is_ok());
    }

    #[test]
    fn test_daily_cap_reason() {
        let domain = DomainKey::from("board.example.com");
        let throttle = throttle_with("board.example.com", relaxed(10, 3));

        for _ in 0..3 {
            throttle.acquire(&domain).unwrap().release();
        }

        match throttle.can_start(&domain) {
            Err(Denial::DailyCapReached { count, max }) => {
                assert_eq!(count, 3);
                assert_eq!(max, 3);
            }
            other => panic!("expected daily cap denial, got {other:?}"),
        }
    }

    #[test]
    fn test_block_and_auto_unblock() {
        let domain = DomainKey::from("ats.example.com");
        let throttle = throttle_with("ats.example.com", relaxed(5, 100));

        throttle.block(&domain, Duration::from_millis(30));
        assert!(matches!(
            throttle.can_start(&domain),
            Err(Denial::Blocked { .. })
        ));

        std::thread::sleep(Duration::from_millis(50));
        assert!(throttle.can_start(&domain).is_ok());
    }

    #[test]
    fn test_unknown_domain_uses_default_policy() {
        let throttle = DomainThrottle::new(ThrottleConfig::default());
        let domain = DomainKey::from("never-seen.example.com");

        // Default policy allows exactly one concurrent application
        let guard = throttle.acquire(&domain).unwrap();
        assert!(matches!(
            throttle.can_start(&domain),
            Err(Denial::ConcurrencyCapReached { .. })
        ));
        guard.release();
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let domain = DomainKey::from("jobs.example.com");
        let throttle = std::sync::Arc::new(throttle_with("jobs.example.com", relaxed(1, 100)));

        let t = Arc::clone(&throttle);
        let d = domain.clone();
        let result = std::thread::spawn(move || {
            let _guard = t.acquire(&d).unwrap();
            panic!("workflow blew up");
        })
        .join();
        assert!(result.is_err());

        // The slot must have been released by the guard's drop
        assert_eq!(throttle.currently_running(&domain), 0);
        assert!(throttle.acquire(&domain).is_ok());
    }

    #[test]
    fn test_racing_acquires_respect_cap() {
        let domain = DomainKey::from("jobs.example.com");
        let throttle = Arc::new(throttle_with("jobs.example.com", relaxed(3, 100)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                let domain = domain.clone();
                std::thread::spawn(move || throttle.acquire(&domain).ok())
            })
            .collect();

        // Keep the granted guards alive so slots stay claimed while counting
        let guards: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(guards.len(), 3);
        assert_eq!(throttle.currently_running(&domain), 3);
    }

    #[test]
    fn test_explicit_start_end_contract() {
        let domain = DomainKey::from("jobs.example.com");
        let throttle = throttle_with("jobs.example.com", relaxed(2, 100));

        // Two outstanding starts without matching ends fill the slots
        assert!(throttle.can_start(&domain).is_ok());
        throttle.start(&domain);
        assert!(throttle.can_start(&domain).is_ok());
        throttle.start(&domain);

        assert!(matches!(
            throttle.can_start(&domain),
            Err(Denial::ConcurrencyCapReached { running: 2, max: 2 })
        ));

        throttle.end(&domain);
        assert!(throttle.can_start(&domain).is_ok());
    }

    #[test]
    fn test_end_never_underflows() {
        let throttle = DomainThrottle::new(ThrottleConfig::default());
        let domain = DomainKey::from("jobs.example.com");
        throttle.end(&domain);
        assert_eq!(throttle.currently_running(&domain), 0);
    }
}
