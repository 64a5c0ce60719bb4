use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{SessionEvent, SessionStore};
use crate::session::{CounterDelta, Digest, SessionRecord, SessionStatus};
use crate::types::{ErrorKind, Result};

/// In-memory reference implementation of [`SessionStore`].
///
/// Backs tests and the dry-run simulator. Counter deltas mutate the row
/// under the map's write guard, which makes them atomic with respect to
/// concurrent `apply_delta` calls; digests are first-write-wins.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<Uuid, SessionRecord>,
    events: DashMap<Uuid, Vec<SessionEvent>>,
    digests: DashMap<Uuid, Digest>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, record: SessionRecord) -> Result<()> {
        self.sessions.insert(record.id, record);
        Ok(())
    }

    async fn session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.get(&id).map(|r| r.value().clone()))
    }

    async fn active_sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(self
            .sessions
            .iter()
            .filter(|r| matches!(r.status, SessionStatus::Running | SessionStatus::Paused))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut record = self
            .sessions
            .get_mut(&id)
            .ok_or(ErrorKind::SessionNotFound(id))?;
        record.status = status;
        if ended_at.is_some() {
            record.ended_at = ended_at;
        }
        Ok(())
    }

    async fn apply_delta(&self, id: Uuid, delta: &CounterDelta) -> Result<()> {
        let mut record = self
            .sessions
            .get_mut(&id)
            .ok_or(ErrorKind::SessionNotFound(id))?;
        record.counters.apply(delta);
        Ok(())
    }

    async fn record_event(&self, event: SessionEvent) -> Result<()> {
        self.events
            .entry(event.session_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn events(&self, session_id: Uuid) -> Result<Vec<SessionEvent>> {
        Ok(self
            .events
            .get(&session_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn insert_digest(&self, digest: Digest) -> Result<()> {
        // First write wins; recovery may race with itself
        self.digests.entry(digest.session_id).or_insert(digest);
        Ok(())
    }

    async fn digest(&self, session_id: Uuid) -> Result<Option<Digest>> {
        Ok(self.digests.get(&session_id).map(|d| d.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionParams;
    use crate::types::EffortLevel;
    use pretty_assertions::assert_eq;

    fn record() -> SessionRecord {
        SessionRecord::new(
            SessionParams::builder()
                .owner(Uuid::new_v4())
                .name("test")
                .build(),
        )
    }

    #[tokio::test]
    async fn test_roundtrip_and_active_scan() {
        let store = MemoryStore::new();
        let record = record();
        let id = record.id;

        store.insert_session(record.clone()).await.unwrap();
        assert_eq!(store.session(id).await.unwrap(), Some(record));
        assert_eq!(store.active_sessions().await.unwrap().len(), 1);

        store
            .update_status(id, SessionStatus::Completed, Some(Utc::now()))
            .await
            .unwrap();
        assert!(store.active_sessions().await.unwrap().is_empty());
        let stored = store.session(id).await.unwrap().unwrap();
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_deltas_do_not_lose_updates() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let record = record();
        let id = record.id;
        store.insert_session(record).await.unwrap();

        let delta = CounterDelta {
            attempted: 1,
            successful: 1,
            effort: EffortLevel::Medium,
            tokens_input: 10,
            tokens_output: 5,
            cost_estimated: 0.001,
        };

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move { store.apply_delta(id, &delta).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let counters = store.session(id).await.unwrap().unwrap().counters;
        assert_eq!(counters.applications_attempted, 50);
        assert_eq!(counters.applications_successful, 50);
        assert_eq!(counters.count_medium_effort, 50);
        assert_eq!(counters.tokens_input_total, 500);
    }

    #[tokio::test]
    async fn test_digest_first_write_wins() {
        let store = MemoryStore::new();
        let record = record();
        let id = record.id;

        let first = Digest::from_record(&record, vec!["first".into()]);
        let second = Digest::from_record(&record, vec!["second".into()]);

        store.insert_digest(first).await.unwrap();
        store.insert_digest(second).await.unwrap();

        let stored = store.digest(id).await.unwrap().unwrap();
        assert_eq!(stored.errors, vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_delta_for_unknown_session_errors() {
        let store = MemoryStore::new();
        let delta = CounterDelta {
            attempted: 1,
            successful: 0,
            effort: EffortLevel::Low,
            tokens_input: 0,
            tokens_output: 0,
            cost_estimated: 0.0,
        };
        assert!(store.apply_delta(Uuid::new_v4(), &delta).await.is_err());
    }
}
