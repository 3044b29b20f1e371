//! In-memory [`MockStore`] guarded by a single mutex.

use super::session::{Session, SessionSummary};
use super::{Consumption, MockStore, StoreError};
use crate::history::{Entry, History};
use crate::mock::Mock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

struct SessionState {
    id: String,
    name: String,
    date: DateTime<Utc>,
    history: VecDeque<Entry>,
    mocks: VecDeque<Mock>,
}

impl SessionState {
    fn snapshot(&self) -> Session {
        Session {
            id: self.id.clone(),
            name: self.name.clone(),
            date: self.date,
            history: self.history.iter().cloned().collect(),
            mocks: self.mocks.iter().cloned().collect(),
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            date: self.date,
        }
    }

    fn mock_mut(&mut self, mock_id: &str) -> Result<&mut Mock, StoreError> {
        self.mocks
            .iter_mut()
            .find(|m| m.state.id == mock_id)
            .ok_or(StoreError::MockNotFound)
    }
}

/// Sessions kept in process memory, oldest first.
pub struct InMemoryStore {
    sessions: Mutex<Vec<SessionState>>,
    history_retention: usize,
}

impl InMemoryStore {
    /// `history_retention` bounds each session's history; `0` keeps everything.
    pub fn new(history_retention: usize) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            history_retention,
        }
    }

    fn session_mut<'a>(
        sessions: &'a mut [SessionState],
        session_id: &str,
    ) -> Result<&'a mut SessionState, StoreError> {
        sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(StoreError::SessionNotFound)
    }

    fn push_session(&self, sessions: &mut Vec<SessionState>, name: &str, mocks: VecDeque<Mock>) {
        let name = match name.trim() {
            "" => format!("Session #{}", sessions.len() + 1),
            _ => name.to_string(),
        };
        debug!(session = %name, carried_mocks = mocks.len(), "Creating session");
        sessions.push(SessionState {
            id: Uuid::new_v4().simple().to_string(),
            name,
            date: Utc::now(),
            history: VecDeque::with_capacity(self.history_retention),
            mocks,
        });
    }

    fn locked_clones(session: Option<&SessionState>) -> VecDeque<Mock> {
        session
            .map(|s| {
                s.mocks
                    .iter()
                    .filter(|m| m.state.locked)
                    .map(Mock::clone_and_reset)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn last_session_mut<'a>(&self, sessions: &'a mut Vec<SessionState>) -> &'a mut SessionState {
        if sessions.is_empty() {
            self.push_session(sessions, "", VecDeque::new());
        }
        let last = sessions.len() - 1;
        &mut sessions[last]
    }

    fn set_locked(&self, ids: &[String], locked: bool) -> Vec<Mock> {
        let mut sessions = self.sessions.lock();
        let session = self.last_session_mut(&mut sessions);
        for mock in session.mocks.iter_mut() {
            if ids.iter().any(|id| *id == mock.state.id) {
                mock.state.locked = locked;
            }
        }
        session.mocks.iter().cloned().collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MockStore for InMemoryStore {
    fn add_mock(&self, session_id: &str, mock: Mock) -> Result<Mock, StoreError> {
        let mut sessions = self.sessions.lock();
        let session = Self::session_mut(&mut sessions, session_id)?;
        session.mocks.push_front(mock.clone());
        Ok(mock)
    }

    fn get_mocks(&self, session_id: &str) -> Result<Vec<Mock>, StoreError> {
        let mut sessions = self.sessions.lock();
        let session = Self::session_mut(&mut sessions, session_id)?;
        Ok(session.mocks.iter().cloned().collect())
    }

    fn get_mock_by_id(&self, session_id: &str, mock_id: &str) -> Result<Mock, StoreError> {
        let mut sessions = self.sessions.lock();
        let session = Self::session_mut(&mut sessions, session_id)?;
        session.mock_mut(mock_id).map(|m| m.clone())
    }

    fn lock_mocks(&self, ids: &[String]) -> Vec<Mock> {
        self.set_locked(ids, true)
    }

    fn unlock_mocks(&self, ids: &[String]) -> Vec<Mock> {
        self.set_locked(ids, false)
    }

    fn try_consume(&self, session_id: &str, mock_id: &str) -> Result<Consumption, StoreError> {
        let mut sessions = self.sessions.lock();
        let mock = Self::session_mut(&mut sessions, session_id)?.mock_mut(mock_id)?;
        if mock.is_exhausted() {
            return Ok(Consumption::Exhausted(mock.clone()));
        }
        mock.state.times_count += 1;
        Ok(Consumption::Granted(mock.state.times_count))
    }

    fn release(&self, session_id: &str, mock_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock();
        let mock = Self::session_mut(&mut sessions, session_id)?.mock_mut(mock_id)?;
        mock.state.times_count = mock.state.times_count.saturating_sub(1);
        Ok(())
    }

    fn increment_times_count(&self, session_id: &str, mock_id: &str) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.lock();
        let mock = Self::session_mut(&mut sessions, session_id)?.mock_mut(mock_id)?;
        mock.state.times_count += 1;
        Ok(mock.state.times_count)
    }

    fn add_history_entry(&self, session_id: &str, entry: Entry) -> Result<Entry, StoreError> {
        let mut sessions = self.sessions.lock();
        let session = Self::session_mut(&mut sessions, session_id)?;
        if self.history_retention > 0 {
            while session.history.len() >= self.history_retention {
                session.history.pop_front();
            }
        }
        session.history.push_back(entry.clone());
        Ok(entry)
    }

    fn get_history(&self, session_id: &str) -> Result<History, StoreError> {
        let mut sessions = self.sessions.lock();
        let session = Self::session_mut(&mut sessions, session_id)?;
        Ok(session.history.iter().cloned().collect())
    }

    fn get_history_by_path(&self, session_id: &str, filter: &str) -> Result<History, StoreError> {
        let regex = Regex::new(filter).map_err(|e| StoreError::InvalidPathFilter {
            filter: filter.to_string(),
            message: e.to_string(),
        })?;
        let mut sessions = self.sessions.lock();
        let session = Self::session_mut(&mut sessions, session_id)?;
        Ok(session
            .history
            .iter()
            .filter(|e| regex.is_match(&e.request.path))
            .cloned()
            .collect())
    }

    fn new_session(&self, name: &str) -> Session {
        let mut sessions = self.sessions.lock();
        let carried = Self::locked_clones(sessions.last());
        self.push_session(&mut sessions, name, carried);
        self.last_session_mut(&mut sessions).snapshot()
    }

    fn update_session(&self, session_id: &str, name: &str) -> Result<SessionSummary, StoreError> {
        let mut sessions = self.sessions.lock();
        let session = Self::session_mut(&mut sessions, session_id)?;
        session.name = name.to_string();
        Ok(session.summary())
    }

    fn get_last_session(&self) -> Session {
        let mut sessions = self.sessions.lock();
        self.last_session_mut(&mut sessions).snapshot()
    }

    fn last_session_id(&self) -> String {
        let mut sessions = self.sessions.lock();
        self.last_session_mut(&mut sessions).id.clone()
    }

    fn get_session_by_id(&self, session_id: &str) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.lock();
        Self::session_mut(&mut sessions, session_id).map(|s| s.snapshot())
    }

    fn get_session_by_name(&self, name: &str) -> Result<Session, StoreError> {
        if name.is_empty() {
            return Err(StoreError::SessionNotFound);
        }
        let sessions = self.sessions.lock();
        sessions
            .iter()
            .find(|s| s.name == name)
            .map(SessionState::snapshot)
            .ok_or(StoreError::SessionNotFound)
    }

    fn get_sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .lock()
            .iter()
            .map(SessionState::summary)
            .collect()
    }

    fn reset(&self, force: bool) {
        let mut sessions = self.sessions.lock();
        let carried = if force {
            VecDeque::new()
        } else {
            Self::locked_clones(sessions.last())
        };
        sessions.clear();
        if !carried.is_empty() {
            self.push_session(&mut sessions, "", carried);
        }
        debug!(force, "Store reset");
    }
}
