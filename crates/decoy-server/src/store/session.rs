//! Session snapshots.

use crate::history::History;
use crate::mock::Mock;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Copy of a session, as handed out by a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub date: DateTime<Utc>,
    pub history: History,
    pub mocks: Vec<Mock>,
}

impl Session {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            date: self.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub date: DateTime<Utc>,
}
