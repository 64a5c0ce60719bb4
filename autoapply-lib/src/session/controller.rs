use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::digest::Digest;
use super::session::{
    CounterDelta, SessionParams, SessionRecord, SessionSnapshot, SessionStatus,
};
use super::window::Window;
use crate::notify::Notifier;
use crate::store::{SessionEvent, SessionEventKind, SessionStore};
use crate::types::{ErrorKind, Result, TaskResult, TaskStatus};

/// Live state of one session in this process.
#[derive(Debug)]
struct SessionRuntime {
    /// Authoritative in-memory copy of the session row
    record: SessionRecord,
    /// Monotonic start time for budget evaluation
    started: Instant,
    /// Admitted tasks that have not registered a counted result yet.
    /// Admission reserves budget so that parallel workers cannot overrun
    /// `max_applications` between two registrations.
    in_flight: u64,
    /// Most recent error details, bounded, feeding the digest
    errors: Window<String>,
    /// Whether this process already generated the digest
    digest_generated: bool,
}

/// Owns session lifecycles: budgets, counters, digests, crash recovery.
///
/// All counter mutation funnels through [`register_result`], which holds a
/// per-session async mutex for the whole read-modify-write. Workers never
/// touch session state directly.
///
/// One controller is constructed at process start and shared by reference;
/// there is no global instance.
///
/// [`register_result`]: SessionController::register_result
#[derive(Debug)]
pub struct SessionController {
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    live: DashMap<Uuid, Arc<Mutex<SessionRuntime>>>,
}

impl SessionController {
    /// Create a controller over the given store and notifier
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            live: DashMap::new(),
        }
    }

    /// Create and persist a new session in `Running` state with zeroed
    /// counters, returning its ID.
    ///
    /// A store failure is logged and does not abort creation; the session
    /// still runs, it just will not be visible to a later recovery scan.
    pub async fn create_session(&self, params: SessionParams) -> Uuid {
        let record = SessionRecord::new(params);
        let id = record.id;

        if let Err(e) = self.store.insert_session(record.clone()).await {
            log::error!("failed to persist new session {id}: {e}");
        }
        self.record_event(id, SessionEventKind::Created, format!("session '{}' created", record.name))
            .await;

        log::info!(
            "created session {id} ('{}', max {} applications, {}s budget)",
            record.name,
            record.limits.max_applications,
            record.limits.max_duration.as_secs()
        );

        self.live.insert(
            id,
            Arc::new(Mutex::new(SessionRuntime {
                record,
                started: Instant::now(),
                in_flight: 0,
                errors: Window::default(),
                digest_generated: false,
            })),
        );
        id
    }

    /// Register one task result against its session.
    ///
    /// This is the single choke point for counter updates and is safe
    /// under concurrent invocation from any number of workers. After the
    /// counters move, the session's budgets are evaluated; crossing one
    /// transitions the session to `Completed` and generates the digest
    /// exactly once. Results arriving after termination still count but
    /// never re-trigger termination.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::SessionNotFound`] when the result references a
    /// session this controller does not own.
    pub async fn register_result(&self, result: &TaskResult) -> Result<()> {
        let runtime = self.runtime(result.session_id)?;
        let mut rt = runtime.lock().await;
        let id = rt.record.id;

        if matches!(result.status, TaskStatus::Failed | TaskStatus::Error) {
            if let Some(detail) = &result.detail {
                rt.errors.push(format!("{}: {detail}", result.application_id));
            }
        }

        if result.counts_as_attempt() {
            // This result settles one admission reservation
            rt.in_flight = rt.in_flight.saturating_sub(1);
            let delta = CounterDelta::from(result);
            rt.record.counters.apply(&delta);
            if let Err(e) = self.store.apply_delta(id, &delta).await {
                log::error!("failed to persist counters for session {id}: {e}");
            }
        } else {
            let reason = result.detail.clone().unwrap_or_default();
            self.record_event(
                id,
                SessionEventKind::TaskSkipped,
                format!("task {} skipped: {reason}", result.application_id),
            )
            .await;
        }

        log::debug!(
            "session {id}: {} -> {}/{} attempted",
            result.status,
            rt.record.counters.applications_attempted,
            rt.record.limits.max_applications
        );

        if !rt.record.status.is_terminal() {
            if let Some(reason) = Self::over_budget(&rt) {
                log::info!("session {id} over budget: {reason}");
                self.record_event(id, SessionEventKind::BudgetExhausted, reason)
                    .await;
                self.finish(&mut rt, SessionStatus::Completed).await;
            }
        }

        Ok(())
    }

    /// Externally stop a session, transitioning it to `Completed`.
    ///
    /// Idempotent: stopping an already-terminal session is a no-op, and
    /// the digest is generated at most once.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::SessionNotFound`] for unknown sessions.
    pub async fn stop_session(&self, id: Uuid, reason: &str) -> Result<()> {
        let runtime = self.runtime(id)?;
        let mut rt = runtime.lock().await;
        if rt.record.status.is_terminal() {
            return Ok(());
        }

        log::info!("stopping session {id}: {reason}");
        self.record_event(id, SessionEventKind::Stopped, format!("session stopped: {reason}"))
            .await;
        self.finish(&mut rt, SessionStatus::Completed).await;
        Ok(())
    }

    /// Pause a running session
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidTransition`] unless the session is
    /// `Running`, and [`ErrorKind::SessionNotFound`] for unknown sessions.
    pub async fn pause_session(&self, id: Uuid) -> Result<()> {
        self.transition_live(id, SessionStatus::Paused, SessionEventKind::Paused)
            .await
    }

    /// Resume a paused session
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidTransition`] unless the session is
    /// `Paused`, and [`ErrorKind::SessionNotFound`] for unknown sessions.
    pub async fn resume_session(&self, id: Uuid) -> Result<()> {
        self.transition_live(id, SessionStatus::Running, SessionEventKind::Resumed)
            .await
    }

    /// Check the session's budgets right now, terminating it when one is
    /// exhausted, and report whether the session is terminal.
    ///
    /// Workers call this before dispatching a task so a session whose time
    /// budget ran out stops admitting work even when no result has arrived
    /// in a while.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::SessionNotFound`] for unknown sessions.
    pub async fn check_budget(&self, id: Uuid) -> Result<bool> {
        let runtime = self.runtime(id)?;
        let mut rt = runtime.lock().await;
        if rt.record.status.is_terminal() {
            return Ok(true);
        }
        if let Some(reason) = Self::over_budget(&rt) {
            log::info!("session {id} over budget: {reason}");
            self.record_event(id, SessionEventKind::BudgetExhausted, reason)
                .await;
            self.finish(&mut rt, SessionStatus::Completed).await;
            return Ok(true);
        }
        Ok(false)
    }

    /// Reserve budget for one task about to execute.
    ///
    /// Admission counts both registered attempts and admitted-but-
    /// unfinished tasks against `max_applications`, so a batch wider than
    /// the remaining budget cannot overrun it no matter how workers
    /// interleave. Returns `false` when the session is not `Running` or
    /// has no budget left (terminating it when a budget is found
    /// exhausted).
    pub(crate) async fn try_admit(&self, id: Uuid) -> Result<bool> {
        let runtime = self.runtime(id)?;
        let mut rt = runtime.lock().await;

        if rt.record.status.is_terminal() {
            return Ok(false);
        }
        if let Some(reason) = Self::over_budget(&rt) {
            log::info!("session {id} over budget: {reason}");
            self.record_event(id, SessionEventKind::BudgetExhausted, reason)
                .await;
            self.finish(&mut rt, SessionStatus::Completed).await;
            return Ok(false);
        }
        if rt.record.status != SessionStatus::Running {
            return Ok(false);
        }

        let budget = u64::from(rt.record.limits.max_applications);
        if rt.record.counters.applications_attempted + rt.in_flight >= budget {
            log::debug!("session {id}: no remaining application budget to admit into");
            return Ok(false);
        }

        rt.in_flight += 1;
        Ok(true)
    }

    /// Return an admission reservation that will not produce a counted
    /// result (the task was denied by the throttle after admission).
    pub(crate) async fn cancel_admission(&self, id: Uuid) {
        if let Ok(runtime) = self.runtime(id) {
            let mut rt = runtime.lock().await;
            rt.in_flight = rt.in_flight.saturating_sub(1);
        }
    }

    /// Read-only aggregate view for monitoring.
    ///
    /// Falls back to the store for sessions of a previous process.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::SessionNotFound`] when neither the live map
    /// nor the store knows the session, and [`ErrorKind::Store`] when the
    /// store lookup itself fails.
    pub async fn current_snapshot(&self, id: Uuid) -> Result<SessionSnapshot> {
        if let Some(runtime) = self.live.get(&id).map(|r| Arc::clone(&r)) {
            let rt = runtime.lock().await;
            return Ok(SessionSnapshot {
                session_id: id,
                status: rt.record.status,
                counters: rt.record.counters,
                elapsed: if rt.record.status.is_terminal() {
                    rt.record.elapsed()
                } else {
                    rt.started.elapsed()
                },
                limits: rt.record.limits,
            });
        }

        let record = self
            .store
            .session(id)
            .await?
            .ok_or(ErrorKind::SessionNotFound(id))?;
        Ok(SessionSnapshot {
            session_id: id,
            status: record.status,
            counters: record.counters,
            elapsed: record.elapsed(),
            limits: record.limits,
        })
    }

    /// Find sessions left `Running`/`Paused` by a previous process and
    /// transition each to `Interrupted`, generating a partial digest from
    /// whatever counters were persisted.
    ///
    /// Run once at process start. Idempotent: a recovered session that
    /// already has a digest (from an earlier recovery run) is not digested
    /// again, and sessions live in *this* process are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`] when the recovery scan itself fails;
    /// per-session persistence failures are logged and skipped instead.
    pub async fn recover_active_sessions(&self) -> Result<Vec<Uuid>> {
        let stale = self.store.active_sessions().await?;
        let mut recovered = Vec::new();

        for mut record in stale {
            if self.live.contains_key(&record.id) {
                continue;
            }
            let id = record.id;
            log::warn!("recovering interrupted session {id} ('{}')", record.name);

            let now = Utc::now();
            record.status = SessionStatus::Interrupted;
            record.ended_at = Some(now);
            if let Err(e) = self
                .store
                .update_status(id, SessionStatus::Interrupted, Some(now))
                .await
            {
                log::error!("failed to mark session {id} interrupted: {e}");
                continue;
            }
            self.record_event(
                id,
                SessionEventKind::Recovered,
                "session marked interrupted during startup recovery",
            )
            .await;

            match self.store.digest(id).await {
                Ok(Some(_)) => {
                    log::debug!("session {id} already has a digest; skipping");
                }
                Ok(None) => {
                    // Whatever counters were persisted before the crash;
                    // in-flight work at crash time is not reconstructed
                    let digest = Digest::from_record(&record, Vec::new());
                    self.persist_and_send_digest(digest).await;
                }
                Err(e) => {
                    log::error!("digest lookup failed for session {id}: {e}");
                }
            }

            recovered.push(id);
        }

        if !recovered.is_empty() {
            log::info!("recovered {} interrupted session(s)", recovered.len());
        }
        Ok(recovered)
    }

    /// Evaluate the session's budgets; `Some(reason)` when one is exhausted
    fn over_budget(rt: &SessionRuntime) -> Option<String> {
        let limits = &rt.record.limits;
        let elapsed = rt.started.elapsed();
        if elapsed >= limits.max_duration {
            return Some(format!(
                "time budget exhausted ({}s >= {}s)",
                elapsed.as_secs(),
                limits.max_duration.as_secs()
            ));
        }
        let attempted = rt.record.counters.applications_attempted;
        if attempted >= u64::from(limits.max_applications) {
            return Some(format!(
                "application budget exhausted ({attempted}/{})",
                limits.max_applications
            ));
        }
        None
    }

    /// Terminal transition plus exactly-once digest generation.
    ///
    /// Persistence failures are logged; termination proceeds regardless.
    async fn finish(&self, rt: &mut SessionRuntime, status: SessionStatus) {
        let id = rt.record.id;
        let now = Utc::now();
        rt.record.status = status;
        rt.record.ended_at = Some(now);

        if let Err(e) = self.store.update_status(id, status, Some(now)).await {
            log::error!("failed to persist terminal status for session {id}: {e}");
        }

        if rt.digest_generated {
            return;
        }
        match self.store.digest(id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let digest = Digest::from_record(&rt.record, rt.errors.to_vec());
                self.persist_and_send_digest(digest).await;
            }
            Err(e) => log::error!("digest lookup failed for session {id}: {e}"),
        }
        rt.digest_generated = true;
    }

    /// Persist the digest, then hand it to the notifier without waiting
    async fn persist_and_send_digest(&self, digest: Digest) {
        let id = digest.session_id;
        if let Err(e) = self.store.insert_digest(digest.clone()).await {
            log::error!("failed to persist digest for session {id}: {e}");
        }

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&digest).await {
                log::warn!("notifier failed for session {id}: {e}");
            }
        });
    }

    /// `Running <-> Paused` transitions for live sessions
    async fn transition_live(
        &self,
        id: Uuid,
        to: SessionStatus,
        kind: SessionEventKind,
    ) -> Result<()> {
        let runtime = self.runtime(id)?;
        let mut rt = runtime.lock().await;
        let from = rt.record.status;
        if !from.can_transition_to(to) {
            return Err(ErrorKind::InvalidTransition { from, to });
        }
        rt.record.status = to;
        if let Err(e) = self.store.update_status(id, to, None).await {
            log::error!("failed to persist status {to} for session {id}: {e}");
        }
        self.record_event(id, kind, format!("session {to}")).await;
        log::info!("session {id} {to}");
        Ok(())
    }

    /// Append to the session's event log, best-effort
    async fn record_event(&self, id: Uuid, kind: SessionEventKind, message: impl Into<String>) {
        let event = SessionEvent::now(id, kind, message);
        if let Err(e) = self.store.record_event(event).await {
            log::warn!("failed to record event for session {id}: {e}");
        }
    }

    fn runtime(&self, id: Uuid) -> Result<Arc<Mutex<SessionRuntime>>> {
        self.live
            .get(&id)
            .map(|r| Arc::clone(&r))
            .ok_or(ErrorKind::SessionNotFound(id))
    }
}
