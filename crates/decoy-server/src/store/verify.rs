//! Session verification: were mocks called as declared, and is the history clean.

use super::{MockStore, StoreError};
use crate::config::StatusCodes;
use crate::history::History;
use crate::mock::Mock;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MocksVerification {
    pub verified: bool,
    pub all_used: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Mock>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unused: Vec<Mock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryVerification {
    pub verified: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: History,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyResult {
    pub mocks: MocksVerification,
    pub history: HistoryVerification,
}

/// Verify a session (the last one when `session_id` is `None`).
///
/// History entries answered with one of the `codes` outcomes count as failures.
pub fn verify_session(
    store: &dyn MockStore,
    session_id: Option<&str>,
    codes: &StatusCodes,
) -> Result<VerifyResult, StoreError> {
    let session = match session_id {
        Some(id) => store.get_session_by_id(id)?,
        None => store.get_last_session(),
    };

    let failures: Vec<Mock> = session.mocks.iter().filter(|m| !m.verify()).cloned().collect();
    let unused: Vec<Mock> = session
        .mocks
        .iter()
        .filter(|m| m.state.times_count == 0)
        .cloned()
        .collect();
    let history_failures: History = session
        .history
        .into_iter()
        .filter(|e| codes.is_sentinel(e.response.status))
        .collect();

    let verified = failures.is_empty();
    let all_used = unused.is_empty();
    let message = if verified && all_used {
        "All mocks match expectations"
    } else {
        "Some mocks don't match expectations"
    };

    let clean = history_failures.is_empty();
    Ok(VerifyResult {
        mocks: MocksVerification {
            verified,
            all_used,
            message: message.to_string(),
            failures,
            unused,
        },
        history: HistoryVerification {
            verified: clean,
            message: if clean {
                "History is clean".to_string()
            } else {
                "There are errors in the history".to_string()
            },
            failures: history_failures,
        },
    })
}
