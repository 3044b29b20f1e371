//! Mock, history and session storage.
//!
//! [`MockStore`] is the seam between the dispatch pipeline and whatever keeps
//! sessions around. It is synchronous: every operation is a short critical
//! section and readers always receive copies, never live references.

pub mod memory;
pub mod session;
pub mod verify;

pub use memory::InMemoryStore;
pub use session::{Session, SessionSummary};
pub use verify::{verify_session, HistoryVerification, MocksVerification, VerifyResult};

use crate::history::{Entry, History};
use crate::mock::Mock;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("session not found")]
    SessionNotFound,

    #[error("mock not found")]
    MockNotFound,

    #[error("invalid path filter {filter:?}: {message}")]
    InvalidPathFilter { filter: String, message: String },
}

/// Result of an atomic check-and-increment on a mock's call counter.
#[derive(Debug, Clone, PartialEq)]
pub enum Consumption {
    /// The call was counted; holds the new counter value.
    Granted(u64),
    /// The budget was already used up; holds the mock as currently stored.
    Exhausted(Mock),
}

/// Backend-agnostic session store.
///
/// Implementations must serialize all mutations of a session's mocks and
/// history, and must hand out copies.
pub trait MockStore: Send + Sync {
    /// Register a mock at the front of the session's list.
    fn add_mock(&self, session_id: &str, mock: Mock) -> Result<Mock, StoreError>;

    /// Snapshot of the session's mocks, newest first.
    fn get_mocks(&self, session_id: &str) -> Result<Vec<Mock>, StoreError>;

    fn get_mock_by_id(&self, session_id: &str, mock_id: &str) -> Result<Mock, StoreError>;

    /// Lock mocks of the last session; returns that session's mocks.
    fn lock_mocks(&self, ids: &[String]) -> Vec<Mock>;

    /// Unlock mocks of the last session; returns that session's mocks.
    fn unlock_mocks(&self, ids: &[String]) -> Vec<Mock>;

    /// Count one call if the mock still has budget left, atomically.
    fn try_consume(&self, session_id: &str, mock_id: &str) -> Result<Consumption, StoreError>;

    /// Undo a [`Consumption::Granted`] whose response could not be produced.
    fn release(&self, session_id: &str, mock_id: &str) -> Result<(), StoreError>;

    /// Unconditionally count one call; returns the new counter value.
    fn increment_times_count(&self, session_id: &str, mock_id: &str) -> Result<u64, StoreError>;

    /// Append to the session's history, evicting the oldest entries past retention.
    fn add_history_entry(&self, session_id: &str, entry: Entry) -> Result<Entry, StoreError>;

    fn get_history(&self, session_id: &str) -> Result<History, StoreError>;

    /// History entries whose request path matches the `filter` regex.
    fn get_history_by_path(&self, session_id: &str, filter: &str) -> Result<History, StoreError>;

    /// Start a new session; locked mocks of the previous last session carry over.
    fn new_session(&self, name: &str) -> Session;

    fn update_session(&self, session_id: &str, name: &str) -> Result<SessionSummary, StoreError>;

    /// The most recent session, created on demand.
    fn get_last_session(&self) -> Session;

    /// Id of the most recent session, created on demand.
    fn last_session_id(&self) -> String;

    fn get_session_by_id(&self, session_id: &str) -> Result<Session, StoreError>;

    fn get_session_by_name(&self, name: &str) -> Result<Session, StoreError>;

    /// All sessions, oldest first.
    fn get_sessions(&self) -> Vec<SessionSummary>;

    /// Drop all sessions. Unless `force` is set, locked mocks of the last
    /// session survive into a fresh session.
    fn reset(&self, force: bool);
}

/// A granted call that is released on drop unless committed.
///
/// Keeps counters exact when resolution fails or the request is cancelled
/// while the response is being produced.
pub struct Reservation {
    store: Arc<dyn MockStore>,
    session_id: String,
    mock_id: String,
    committed: bool,
}

impl Reservation {
    pub fn new(store: Arc<dyn MockStore>, session_id: &str, mock_id: &str) -> Self {
        Self {
            store,
            session_id: session_id.to_string(),
            mock_id: mock_id.to_string(),
            committed: false,
        }
    }

    /// Keep the call counted.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.store.release(&self.session_id, &self.mock_id) {
            tracing::debug!(mock_id = %self.mock_id, "release after failed resolution: {}", e);
        }
    }
}
