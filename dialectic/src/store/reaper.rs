//! Stale-session reaper.
//!
//! A session nobody is advancing would otherwise keep both participants out
//! of the reviewer pool forever. The reaper is an explicit operation — run
//! opportunistically before eligibility checks and on a background cadence —
//! rather than a side effect hidden inside read paths, so its cost and
//! effect stay observable and testable in isolation.

use chrono::{Duration, Utc};
use tracing::info;

use super::store::{SharedSessionStore, StoreResult};
use crate::protocol::{DialecticMessage, DialecticPhase};

/// Outcome of a reap pass.
#[derive(Debug, Clone, Default)]
pub struct ReapSummary {
    /// Non-terminal sessions examined.
    pub examined: usize,
    /// Sessions marked FAILED this pass.
    pub reaped: usize,
    /// Ids of the sessions marked FAILED.
    pub reaped_ids: Vec<String>,
}

/// Marks inactive non-terminal sessions FAILED.
pub struct StaleSessionReaper {
    store: SharedSessionStore,
}

impl StaleSessionReaper {
    pub fn new(store: SharedSessionStore) -> Self {
        Self { store }
    }

    /// Sweep all non-terminal sessions whose last activity is older than
    /// `inactivity_threshold` and mark them FAILED with a system transcript
    /// entry. Already-terminal sessions are never touched, so re-running
    /// with no intervening activity is a no-op.
    pub fn reap(&self, inactivity_threshold: Duration) -> StoreResult<ReapSummary> {
        let cutoff = Utc::now() - inactivity_threshold;
        let mut summary = ReapSummary::default();

        for mut session in self.store.active_sessions()? {
            summary.examined += 1;
            if session.last_activity() >= cutoff {
                continue;
            }

            let idle_secs = (Utc::now() - session.last_activity()).num_seconds();
            session.append(DialecticMessage::system(&format!(
                "session reaped after {}s of inactivity in phase {}",
                idle_secs, session.phase
            )));
            // Failed is reachable from every non-terminal phase.
            session
                .transition(DialecticPhase::Failed)
                .expect("non-terminal phases can always fail");
            self.store.persist(&session)?;

            info!(
                session_id = %session.session_id,
                idle_secs,
                "stale session marked FAILED"
            );
            summary.reaped += 1;
            summary.reaped_ids.push(session.session_id.clone());
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DialecticSession, MessageBody, SYSTEM_AGENT_ID};
    use crate::registry::HealthSnapshot;
    use crate::store::SessionStore;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    fn snapshot() -> HealthSnapshot {
        HealthSnapshot {
            coherence: 0.5,
            attention_score: 0.5,
            void_active: false,
        }
    }

    fn setup() -> (SharedSessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(
            dir.path().join("sessions.db"),
            StdDuration::from_secs(30),
        )
        .unwrap()
        .shared();
        (store, dir)
    }

    fn stale_session(paused: &str, reviewer: &str) -> DialecticSession {
        let mut session = DialecticSession::new(paused, reviewer, Some(snapshot()), 3).unwrap();
        session.created_at = Utc::now() - Duration::minutes(30);
        session
    }

    #[test]
    fn test_reaps_stale_session_with_system_entry() {
        let (store, _dir) = setup();
        let session = stale_session("agent-p", "agent-r");
        let id = session.session_id.clone();
        store.persist(&session).unwrap();

        let reaper = StaleSessionReaper::new(store.clone());
        let summary = reaper.reap(Duration::minutes(5)).unwrap();
        assert_eq!(summary.reaped, 1);
        assert_eq!(summary.reaped_ids, vec![id.clone()]);

        let reaped = store.get(&id).unwrap().unwrap();
        assert_eq!(reaped.phase, DialecticPhase::Failed);
        let note = reaped.transcript.last().unwrap();
        assert_eq!(note.agent_id, SYSTEM_AGENT_ID);
        assert!(matches!(
            &note.body,
            MessageBody::System { note } if note.contains("inactivity")
        ));
    }

    #[test]
    fn test_fresh_session_untouched() {
        let (store, _dir) = setup();
        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3).unwrap();
        let id = session.session_id.clone();
        store.persist(&session).unwrap();

        let reaper = StaleSessionReaper::new(store.clone());
        let summary = reaper.reap(Duration::minutes(5)).unwrap();
        assert_eq!(summary.examined, 1);
        assert_eq!(summary.reaped, 0);
        assert_eq!(
            store.get(&id).unwrap().unwrap().phase,
            DialecticPhase::Thesis
        );
    }

    #[test]
    fn test_reap_is_idempotent() {
        let (store, _dir) = setup();
        store.persist(&stale_session("agent-p", "agent-r")).unwrap();

        let reaper = StaleSessionReaper::new(store.clone());
        assert_eq!(reaper.reap(Duration::minutes(5)).unwrap().reaped, 1);

        // Second pass: the session is terminal and not even examined.
        let second = reaper.reap(Duration::minutes(5)).unwrap();
        assert_eq!(second.examined, 0);
        assert_eq!(second.reaped, 0);
    }

    #[test]
    fn test_transcript_activity_keeps_session_alive() {
        let (store, _dir) = setup();
        let mut session = stale_session("agent-p", "agent-r");
        // A recent message overrides the old created_at.
        session.append(DialecticMessage::thesis("agent-p", "drift", vec![], "r"));
        store.persist(&session).unwrap();

        let reaper = StaleSessionReaper::new(store.clone());
        assert_eq!(reaper.reap(Duration::minutes(5)).unwrap().reaped, 0);
    }

    #[test]
    fn test_reaping_frees_participants_for_selection() {
        let (store, _dir) = setup();
        store.persist(&stale_session("agent-p", "agent-r")).unwrap();
        assert!(store.in_active_session("agent-r").unwrap());

        StaleSessionReaper::new(store.clone())
            .reap(Duration::minutes(5))
            .unwrap();
        assert!(!store.in_active_session("agent-r").unwrap());
    }
}
