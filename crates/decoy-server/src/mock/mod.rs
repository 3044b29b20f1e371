//! Mock definitions and registered mocks.
//!
//! A [`MockDefinition`] is what clients send. [`MockDefinition::validate`] turns it
//! into a [`Mock`]: defaults applied, exactly one response variant, matchers
//! compiled against the [`AssertionRegistry`], engine name resolved, state
//! initialized. A `Mock` can therefore never hold an invalid configuration.

pub mod delay;
pub mod response;

pub use delay::Delay;
pub use response::{
    DynamicResponse, DynamicResponseDefinition, Engine, MockProxy, MockResponse, ResponseKind,
};

use crate::history::{MockType, Request};
use crate::matcher::{AssertionRegistry, CompiledMockRequest, MatcherError, MockRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Registration-time validation failure.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("at least one response variant must be set (response, dynamic_response or proxy)")]
    NoResponse,

    #[error("only one response variant may be set, found: {}", .0.join(", "))]
    ConflictingResponses(Vec<&'static str>),

    #[error("invalid request matcher: {0}")]
    Matcher(#[from] MatcherError),

    #[error("invalid engine {0:?}")]
    UnknownEngine(String),

    #[error("context.times must be >= 0, got {0}")]
    NegativeTimes(i64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDefinition {
    #[serde(default)]
    pub times: i64,
}

/// A mock as submitted for registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockDefinition {
    #[serde(default)]
    pub request: MockRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<MockResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_response: Option<DynamicResponseDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<MockProxy>,
    #[serde(default)]
    pub context: ContextDefinition,
}

impl MockDefinition {
    /// Validate and compile into a registrable [`Mock`] with fresh state.
    pub fn validate(self, registry: &AssertionRegistry) -> Result<Mock, ValidationError> {
        let mut declared = Vec::new();
        if self.response.is_some() {
            declared.push("response");
        }
        if self.dynamic_response.is_some() {
            declared.push("dynamic_response");
        }
        if self.proxy.is_some() {
            declared.push("proxy");
        }
        if declared.len() > 1 {
            return Err(ValidationError::ConflictingResponses(declared));
        }

        let response = match (self.response, self.dynamic_response, self.proxy) {
            (Some(r), _, _) => ResponseKind::Static(r),
            (_, Some(d), _) => {
                let engine = d
                    .engine
                    .parse::<Engine>()
                    .map_err(ValidationError::UnknownEngine)?;
                ResponseKind::Dynamic(DynamicResponse {
                    engine,
                    script: d.script,
                })
            }
            (_, _, Some(p)) => ResponseKind::Proxy(p),
            (None, None, None) => return Err(ValidationError::NoResponse),
        };

        let times = u64::try_from(self.context.times)
            .map_err(|_| ValidationError::NegativeTimes(self.context.times))?;

        let request = self.request.with_defaults();
        let matcher = CompiledMockRequest::compile(&request, registry)?;

        Ok(Mock {
            request,
            response,
            context: MockContext { times },
            state: MockState::new(),
            matcher: Arc::new(matcher),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MockContext {
    /// Maximum number of calls; `0` means unlimited.
    #[serde(skip_serializing_if = "is_zero")]
    pub times: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MockState {
    pub id: String,
    pub times_count: u64,
    pub locked: bool,
    pub creation_date: DateTime<Utc>,
}

impl MockState {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            times_count: 0,
            locked: false,
            creation_date: Utc::now(),
        }
    }
}

/// A validated, registered mock.
#[derive(Debug, Clone, Serialize)]
pub struct Mock {
    pub request: MockRequest,
    #[serde(flatten)]
    pub response: ResponseKind,
    pub context: MockContext,
    pub state: MockState,
    #[serde(skip)]
    matcher: Arc<CompiledMockRequest>,
}

impl Mock {
    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn mock_type(&self) -> MockType {
        self.response.mock_type()
    }

    pub fn matches(&self, request: &Request) -> bool {
        self.matcher.matches(request)
    }

    /// Whether the call budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.context.times > 0 && self.state.times_count >= self.context.times
    }

    /// Whether the mock was called exactly as often as declared.
    pub fn verify(&self) -> bool {
        self.context.times == 0 || self.state.times_count == self.context.times
    }

    /// Copy with a fresh id, a zeroed counter and a new creation date.
    ///
    /// The `locked` flag is kept.
    pub fn clone_and_reset(&self) -> Mock {
        let mut mock = self.clone();
        mock.state = MockState {
            locked: self.state.locked,
            ..MockState::new()
        };
        mock
    }
}

impl PartialEq for Mock {
    fn eq(&self, other: &Self) -> bool {
        self.request == other.request
            && self.response == other.response
            && self.context == other.context
            && self.state == other.state
    }
}
