//! The persistence seam.
//!
//! The controller survives crashes by persisting session rows, counter
//! increments, events, and digests through [`SessionStore`]. The physical
//! representation is the implementation's business; the contract only
//! requires atomic counter increments and strict-consistency reads for
//! the crash-recovery scan.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::session::{CounterDelta, Digest, SessionRecord, SessionStatus};
use crate::types::Result;

pub use memory::MemoryStore;

/// What happened to a session, for the persisted event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionEventKind {
    /// Session row created
    Created,
    /// Session paused
    Paused,
    /// Session resumed
    Resumed,
    /// Session explicitly stopped
    Stopped,
    /// A budget was exhausted
    BudgetExhausted,
    /// Session recovered as interrupted at process start
    Recovered,
    /// A task was skipped by policy
    TaskSkipped,
}

/// One entry in a session's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// The session this event belongs to
    pub session_id: Uuid,
    /// Event classification
    pub kind: SessionEventKind,
    /// Free-form detail message
    pub message: String,
    /// When the event happened
    pub at: DateTime<Utc>,
}

impl SessionEvent {
    /// Create an event stamped with the current time
    #[must_use]
    pub fn now(session_id: Uuid, kind: SessionEventKind, message: impl Into<String>) -> Self {
        Self {
            session_id,
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Durable CRUD for sessions, counter deltas, events, and digests.
///
/// Implementations must make [`apply_delta`](SessionStore::apply_delta) an
/// atomic increment (a transactional `UPDATE ... SET x = x + ?`, or an
/// in-process lock); the controller additionally serializes per session,
/// but the store must not lose updates on its own.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Persist a new session row
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn insert_session(&self, record: SessionRecord) -> Result<()>;

    /// Fetch one session by ID
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn session(&self, id: Uuid) -> Result<Option<SessionRecord>>;

    /// All sessions currently in a live state (`Running` or `Paused`).
    ///
    /// Used by the crash-recovery scan; reads must observe all writes
    /// acknowledged before the calling process started.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn active_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// Update a session's status, and its end timestamp when terminal
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Atomically fold a counter delta into a session's totals
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn apply_delta(&self, id: Uuid, delta: &CounterDelta) -> Result<()>;

    /// Append to a session's event log
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn record_event(&self, event: SessionEvent) -> Result<()>;

    /// Read a session's event log, oldest first
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn events(&self, session_id: Uuid) -> Result<Vec<SessionEvent>>;

    /// Persist a digest; the first write for a session wins
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn insert_digest(&self, digest: Digest) -> Result<()>;

    /// Fetch the digest for a session, if one was generated
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Store`](crate::ErrorKind::Store) on failure.
    async fn digest(&self, session_id: Uuid) -> Result<Option<Digest>>;
}
