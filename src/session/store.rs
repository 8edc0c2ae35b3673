//! `UptoSessionStore`: a concurrent `sessionId -> Session` map with per-key
//! atomic mutation (spec.md §4.4).
//!
//! Grounded in the corpus's per-key `DashMap` nonce-store idiom
//! (`InMemoryNonceStore` in the retrieved `tempo-x402` example): lock-free
//! reads, per-shard locking on writes, and compound read-modify-write
//! operations (`accrue`, `transition`) done via `DashMap::entry`, which
//! holds the shard lock for the closure's duration — the "per-key guard"
//! this crate's concurrency contract requires.

use alloy_primitives::U256;
use dashmap::DashMap;

use crate::timestamp::UnixTimestamp;

use super::{AccrueError, Session, SessionId, SessionStatus, TransitionError};

#[derive(Default)]
pub struct UptoSessionStore {
    sessions: DashMap<SessionId, Session>,
}

impl UptoSessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Inserts or replaces the whole record for `session.id`.
    pub fn set(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    /// Atomically increments `pendingSpent` by `delta` iff `status=open`,
    /// `settledTotal + pendingSpent + delta <= cap`, and
    /// `deadline > now + deadline_buffer_sec`.
    pub fn accrue(
        &self,
        id: &str,
        delta: U256,
        now: UnixTimestamp,
        deadline_buffer_sec: u64,
    ) -> Result<Session, AccrueError> {
        let mut entry = self.sessions.get_mut(id).ok_or(AccrueError::NotFound)?;
        let session = entry.value_mut();

        if session.status != SessionStatus::Open {
            return Err(AccrueError::NotOpen);
        }
        if session.deadline.as_secs() <= now.as_secs().saturating_add(deadline_buffer_sec) {
            return Err(AccrueError::DeadlineTooClose);
        }
        let projected = session
            .settled_total
            .saturating_add(session.pending_spent)
            .saturating_add(delta);
        if projected > session.cap {
            return Err(AccrueError::CapExceeded);
        }

        session.pending_spent += delta;
        Ok(session.clone())
    }

    /// CAS on `status`: succeeds only if the session is currently `from`.
    pub fn transition(
        &self,
        id: &str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<Session, TransitionError> {
        let mut entry = self.sessions.get_mut(id).ok_or(TransitionError::NotFound)?;
        let session = entry.value_mut();
        if session.status != from {
            return Err(TransitionError::UnexpectedStatus);
        }
        session.status = to;
        Ok(session.clone())
    }

    /// Applies `update` to the session under its per-key guard and returns
    /// the resulting record. Used by the orchestrator to persist settlement
    /// outcomes in a single atomic step.
    pub fn update<F>(&self, id: &str, update: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut entry = self.sessions.get_mut(id)?;
        update(entry.value_mut());
        Some(entry.value().clone())
    }

    /// Snapshot view of every session, for the sweeper.
    pub fn iterate(&self) -> Vec<Session> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Scans for sessions left in `settling` (e.g. after an unclean
    /// restart) and logs a warning per session. Conservatively leaves their
    /// status untouched pending operator action (spec.md §5, §9 "crash
    /// recovery" open question).
    pub fn recover_settling(&self) {
        for entry in self.sessions.iter() {
            if entry.value().status == SessionStatus::Settling {
                tracing::warn!(
                    session_id = %entry.key(),
                    "session left in settling status at startup, outcome unknown"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{PaymentPayload, PaymentRequirements};

    fn sample_session(id: &str, cap: u64, deadline_secs: u64) -> Session {
        let requirements = PaymentRequirements {
            scheme: "upto".to_string(),
            network: "eip155:8453".parse().unwrap(),
            asset: "0xusdc".to_string(),
            pay_to: "0xb".to_string(),
            amount: "0".to_string(),
            max_timeout_seconds: 60,
            extra: None,
        };
        let payload = PaymentPayload {
            x402_version: 1,
            resource: None,
            extensions: vec![],
            accepted: requirements.clone(),
            payload: serde_json::json!({}),
        };
        Session::new(
            id.to_string(),
            payload,
            requirements,
            U256::from(cap),
            UnixTimestamp::from_secs(deadline_secs),
        )
    }

    #[test]
    fn accrue_rejects_when_cap_would_be_exceeded() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 10_000));

        store
            .accrue("s1", U256::from(900_000u64), UnixTimestamp::from_secs(0), 60)
            .unwrap();
        let err = store
            .accrue("s1", U256::from(200_000u64), UnixTimestamp::from_secs(0), 60)
            .unwrap_err();
        assert_eq!(err, AccrueError::CapExceeded);
    }

    #[test]
    fn accrue_rejects_when_session_not_open() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 10_000));
        store
            .transition("s1", SessionStatus::Open, SessionStatus::Settling)
            .unwrap();
        let err = store
            .accrue("s1", U256::from(1u64), UnixTimestamp::from_secs(0), 60)
            .unwrap_err();
        assert_eq!(err, AccrueError::NotOpen);
    }

    #[test]
    fn accrue_rejects_when_deadline_within_buffer() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 100));
        let err = store
            .accrue("s1", U256::from(1u64), UnixTimestamp::from_secs(50), 60)
            .unwrap_err();
        assert_eq!(err, AccrueError::DeadlineTooClose);
    }

    #[test]
    fn transition_cas_only_succeeds_from_expected_status() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 10_000));
        store
            .transition("s1", SessionStatus::Open, SessionStatus::Settling)
            .unwrap();
        let err = store
            .transition("s1", SessionStatus::Open, SessionStatus::Settling)
            .unwrap_err();
        assert_eq!(err, TransitionError::UnexpectedStatus);
    }

    #[test]
    fn recover_settling_leaves_status_untouched() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 10_000));
        store
            .transition("s1", SessionStatus::Open, SessionStatus::Settling)
            .unwrap();
        store.recover_settling();
        assert_eq!(store.get("s1").unwrap().status, SessionStatus::Settling);
    }
}
