use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::session::CandidateSession;

/// One candidate's session behind its own lock. Holding it serializes every
/// read-modify-write for that candidate without blocking anyone else.
pub type SessionHandle = Arc<Mutex<CandidateSession>>;

/// Candidate id to live session. The map lock is only held to look up,
/// insert or remove a handle, never across a store or notifier call.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn handle(&self, candidate_id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&candidate_id).cloned()
    }

    /// Inserts `session` unless another request got there first; either way
    /// returns the handle that is now live.
    pub async fn insert_if_absent(&self, candidate_id: Uuid, session: CandidateSession) -> SessionHandle {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(candidate_id)
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone()
    }

    /// Snapshot of the current state.
    pub async fn read(&self, candidate_id: Uuid) -> Result<CandidateSession> {
        let handle = self
            .handle(candidate_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("No live session for candidate {}", candidate_id)))?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Unconditional replace, last writer wins.
    pub async fn write(&self, candidate_id: Uuid, session: CandidateSession) {
        match self.handle(candidate_id).await {
            Some(handle) => *handle.lock().await = session,
            None => {
                self.sessions
                    .write()
                    .await
                    .insert(candidate_id, Arc::new(Mutex::new(session)));
            }
        }
    }

    /// Removes the entry only if it is still `handle`, so a stale caller
    /// cannot drop a session that was rehydrated in the meantime.
    pub async fn remove(&self, candidate_id: Uuid, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&candidate_id) {
            Some(live) if Arc::ptr_eq(live, handle) => {
                sessions.remove(&candidate_id);
                true
            }
            _ => false,
        }
    }

    pub async fn handles(&self) -> Vec<(Uuid, SessionHandle)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
