//! RocksDB-backed session store.
//!
//! The backing store is the single source of truth shared across service
//! instances. Session records are stored as JSON — the persisted shape is a
//! stable contract other tooling reads directly. Two read-side layers sit on
//! top:
//!
//! - a short-TTL cache for the hot eligibility query ("is this agent party
//!   to an active session?"), invalidated on every write touching either
//!   party;
//! - a last-known-good map serving reads only while the backend errors.
//!   Writes never fall back; a failed persist surfaces to the caller.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use moka::sync::Cache;
use tracing::{debug, warn};

use super::schema::{self, ALL_CFS};
use crate::protocol::DialecticSession;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Result type for session store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a SessionStore.
pub type SharedSessionStore = Arc<SessionStore>;

/// Durable session store with a TTL'd eligibility cache and a degraded-mode
/// read fallback.
pub struct SessionStore {
    db: RwLock<DB>,
    path: PathBuf,
    /// agent_id → currently party to a non-terminal session.
    party_cache: Cache<String, bool>,
    /// Last-known-good session snapshots, refreshed on every successful
    /// read/write. Read availability only — never consulted while the
    /// backend is healthy.
    fallback: RwLock<HashMap<String, DialecticSession>>,
}

impl SessionStore {
    /// Open or create a session store at the given path.
    pub fn open(path: impl Into<PathBuf>, cache_ttl: StdDuration) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
            party_cache: Cache::builder().time_to_live(cache_ttl).build(),
            fallback: RwLock::new(HashMap::new()),
        })
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> SharedSessionStore {
        Arc::new(self)
    }

    /// The database path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Durably persist a session. The write must land before the mutating
    /// operation that produced it returns; on failure the caller treats the
    /// in-memory mutation as if it never happened.
    pub fn persist(&self, session: &DialecticSession) -> StoreResult<()> {
        let key = schema::keys::session(&session.session_id);
        let bytes = serde_json::to_vec(session)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        {
            let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
            let cf = db
                .cf_handle(schema::CF_SESSIONS)
                .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_SESSIONS.to_string()))?;
            db.put_cf(&cf, key.as_bytes(), bytes)?;
        }

        // A stale "not in session" entry can wrongly block a new session; a
        // stale "in session" entry can wrongly exclude an eligible reviewer.
        self.invalidate_party(&session.paused_agent_id);
        self.invalidate_party(&session.reviewer_agent_id);

        if let Ok(mut fallback) = self.fallback.write() {
            fallback.insert(session.session_id.clone(), session.clone());
        }

        Ok(())
    }

    /// Fetch a session by id. Serves from the last-known-good map, with a
    /// warning, only when the backend read path errors.
    pub fn get(&self, session_id: &str) -> StoreResult<Option<DialecticSession>> {
        match self.get_from_backend(session_id) {
            Ok(found) => {
                if let Some(ref session) = found {
                    if let Ok(mut fallback) = self.fallback.write() {
                        fallback.insert(session.session_id.clone(), session.clone());
                    }
                }
                Ok(found)
            }
            Err(err) => {
                let cached = self
                    .fallback
                    .read()
                    .ok()
                    .and_then(|m| m.get(session_id).cloned());
                match cached {
                    Some(session) => {
                        warn!(
                            session_id,
                            error = %err,
                            "session backend read failed; serving last-known-good snapshot"
                        );
                        Ok(Some(session))
                    }
                    None => Err(err),
                }
            }
        }
    }

    fn get_from_backend(&self, session_id: &str) -> StoreResult<Option<DialecticSession>> {
        let key = schema::keys::session(session_id);
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_SESSIONS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_SESSIONS.to_string()))?;

        match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => {
                let session = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// All sessions, newest first.
    pub fn list_sessions(&self) -> StoreResult<Vec<DialecticSession>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_SESSIONS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_SESSIONS.to_string()))?;

        let mut sessions = Vec::new();
        let iter = db.prefix_iterator_cf(&cf, schema::keys::SESSION_PREFIX.as_bytes());
        for result in iter {
            let (key, value) = result?;
            let key_str = String::from_utf8_lossy(&key);
            if !key_str.starts_with(schema::keys::SESSION_PREFIX) {
                break;
            }
            let session: DialecticSession = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            sessions.push(session);
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// All sessions where the agent is either party, newest first.
    pub fn sessions_for_agent(&self, agent_id: &str) -> StoreResult<Vec<DialecticSession>> {
        Ok(self
            .list_sessions()?
            .into_iter()
            .filter(|s| s.is_party(agent_id))
            .collect())
    }

    /// Whether the agent is currently party to any non-terminal session.
    ///
    /// Served from the TTL cache when warm; the cache is advisory and is
    /// invalidated on every write touching the agent.
    pub fn in_active_session(&self, agent_id: &str) -> StoreResult<bool> {
        if let Some(cached) = self.party_cache.get(agent_id) {
            debug!(agent_id, cached, "eligibility cache hit");
            return Ok(cached);
        }

        let active = self
            .list_sessions()?
            .iter()
            .any(|s| !s.phase.is_terminal() && s.is_party(agent_id));
        self.party_cache.insert(agent_id.to_string(), active);
        Ok(active)
    }

    /// Whether `reviewer_id` was the reviewer of a **resolved** session for
    /// `paused_agent_id` within the trailing window. Anti-collusion check.
    pub fn recent_resolved_reviewer(
        &self,
        reviewer_id: &str,
        paused_agent_id: &str,
        window: Duration,
    ) -> StoreResult<bool> {
        let cutoff = Utc::now() - window;
        Ok(self.list_sessions()?.iter().any(|s| {
            s.phase == crate::protocol::DialecticPhase::Resolved
                && s.reviewer_agent_id == reviewer_id
                && s.paused_agent_id == paused_agent_id
                && s.resolution
                    .as_ref()
                    .map(|r| r.timestamp >= cutoff)
                    .unwrap_or(s.last_activity() >= cutoff)
        }))
    }

    /// All non-terminal sessions.
    pub fn active_sessions(&self) -> StoreResult<Vec<DialecticSession>> {
        Ok(self
            .list_sessions()?
            .into_iter()
            .filter(|s| !s.phase.is_terminal())
            .collect())
    }

    /// Drop the eligibility cache entry for an agent.
    pub fn invalidate_party(&self, agent_id: &str) {
        self.party_cache.invalidate(agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HealthSnapshot;
    use tempfile::tempdir;

    fn snapshot() -> HealthSnapshot {
        HealthSnapshot {
            coherence: 0.5,
            attention_score: 0.5,
            void_active: false,
        }
    }

    fn test_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(
            dir.path().join("sessions.db"),
            StdDuration::from_secs(30),
        )
        .unwrap();
        (store, dir)
    }

    fn make_session(paused: &str, reviewer: &str) -> DialecticSession {
        DialecticSession::new(paused, reviewer, Some(snapshot()), 3).unwrap()
    }

    #[test]
    fn test_persist_and_get() {
        let (store, _dir) = test_store();
        let session = make_session("agent-p", "agent-r");
        let id = session.session_id.clone();

        store.persist(&session).unwrap();
        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.session_id, id);
        assert_eq!(loaded.paused_agent_id, "agent-p");
    }

    #[test]
    fn test_get_unknown_returns_none() {
        let (store, _dir) = test_store();
        assert!(store.get("ghost").unwrap().is_none());
    }

    #[test]
    fn test_persisted_record_is_readable_json() {
        let (store, _dir) = test_store();
        let session = make_session("agent-p", "agent-r");
        store.persist(&session).unwrap();

        // Raw bytes in the backend must parse as the documented schema.
        let db = store.db.read().unwrap();
        let cf = db.cf_handle(schema::CF_SESSIONS).unwrap();
        let raw = db
            .get_cf(&cf, schema::keys::session(&session.session_id).as_bytes())
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["phase"], "THESIS");
        assert_eq!(value["paused_agent_id"], "agent-p");
    }

    #[test]
    fn test_sessions_for_agent_covers_both_roles() {
        let (store, _dir) = test_store();
        store.persist(&make_session("agent-a", "agent-b")).unwrap();
        store.persist(&make_session("agent-c", "agent-a")).unwrap();
        store.persist(&make_session("agent-c", "agent-d")).unwrap();

        assert_eq!(store.sessions_for_agent("agent-a").unwrap().len(), 2);
        assert_eq!(store.sessions_for_agent("agent-d").unwrap().len(), 1);
        assert!(store.sessions_for_agent("ghost").unwrap().is_empty());
    }

    #[test]
    fn test_in_active_session() {
        let (store, _dir) = test_store();
        assert!(!store.in_active_session("agent-p").unwrap());

        let session = make_session("agent-p", "agent-r");
        store.persist(&session).unwrap();
        assert!(store.in_active_session("agent-p").unwrap());
        assert!(store.in_active_session("agent-r").unwrap());
        assert!(!store.in_active_session("bystander").unwrap());
    }

    #[test]
    fn test_cache_invalidated_on_terminal_transition() {
        let (store, _dir) = test_store();
        let mut session = make_session("agent-p", "agent-r");
        store.persist(&session).unwrap();

        // Warm the cache with "in session".
        assert!(store.in_active_session("agent-p").unwrap());

        session
            .transition(crate::protocol::DialecticPhase::Failed)
            .unwrap();
        store.persist(&session).unwrap();

        // The terminal write must not leave a stale "in session" entry.
        assert!(!store.in_active_session("agent-p").unwrap());
        assert!(!store.in_active_session("agent-r").unwrap());
    }

    #[test]
    fn test_cache_invalidated_on_creation() {
        let (store, _dir) = test_store();
        // Warm the cache with "not in session".
        assert!(!store.in_active_session("agent-p").unwrap());

        store.persist(&make_session("agent-p", "agent-r")).unwrap();
        assert!(store.in_active_session("agent-p").unwrap());
    }

    #[test]
    fn test_recent_resolved_reviewer_window() {
        let (store, _dir) = test_store();
        let mut session = make_session("agent-p", "agent-r");
        session
            .transition(crate::protocol::DialecticPhase::Antithesis)
            .unwrap();
        session
            .transition(crate::protocol::DialecticPhase::Synthesis)
            .unwrap();
        session
            .transition(crate::protocol::DialecticPhase::Resolved)
            .unwrap();
        store.persist(&session).unwrap();

        assert!(store
            .recent_resolved_reviewer("agent-r", "agent-p", Duration::hours(24))
            .unwrap());
        // Different pairing is unaffected.
        assert!(!store
            .recent_resolved_reviewer("agent-r", "agent-x", Duration::hours(24))
            .unwrap());
        assert!(!store
            .recent_resolved_reviewer("agent-p", "agent-r", Duration::hours(24))
            .unwrap());
    }

    #[test]
    fn test_non_resolved_sessions_do_not_trip_anti_collusion() {
        let (store, _dir) = test_store();
        let mut session = make_session("agent-p", "agent-r");
        session
            .transition(crate::protocol::DialecticPhase::Failed)
            .unwrap();
        store.persist(&session).unwrap();

        assert!(!store
            .recent_resolved_reviewer("agent-r", "agent-p", Duration::hours(24))
            .unwrap());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let session = make_session("agent-p", "agent-r");
        let id = session.session_id.clone();

        {
            let store = SessionStore::open(&path, StdDuration::from_secs(30)).unwrap();
            store.persist(&session).unwrap();
        }

        let store = SessionStore::open(&path, StdDuration::from_secs(30)).unwrap();
        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.paused_agent_id, "agent-p");
    }
}
