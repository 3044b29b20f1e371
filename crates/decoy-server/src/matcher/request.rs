//! Whole-request matcher.

use super::assertion::AssertionRegistry;
use super::body_matcher::{BodyMatcher, CompiledBodyMatcher};
use super::multimap::{CompiledMultiMapMatcher, MultiMapMatcher};
use super::string_matcher::{CompiledStringMatcher, StringMatcher};
use super::MatcherError;
use crate::history::Request;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Request side of a mock definition. Unset optional matchers mean "don't care".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockRequest {
    #[serde(default)]
    pub path: StringMatcher,
    #[serde(default)]
    pub method: StringMatcher,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<MultiMapMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<MultiMapMatcher>,
}

impl MockRequest {
    /// Trim path/method values and replace blank ones with match-anything.
    pub fn with_defaults(mut self) -> Self {
        self.path.value = self.path.value.trim().to_string();
        self.method.value = self.method.value.trim().to_string();
        if self.path.is_blank() {
            self.path = StringMatcher::any();
        }
        if self.method.is_blank() {
            self.method = StringMatcher::any();
        }
        self
    }
}

/// Compiled request matcher, evaluated Method, Path, Headers, Query, Body.
#[derive(Debug, Clone)]
pub struct CompiledMockRequest {
    method: CompiledStringMatcher,
    path: CompiledStringMatcher,
    headers: Option<CompiledMultiMapMatcher>,
    query_params: Option<CompiledMultiMapMatcher>,
    body: Option<CompiledBodyMatcher>,
}

impl CompiledMockRequest {
    /// Compile a request matcher whose defaults have already been applied.
    pub fn compile(
        request: &MockRequest,
        registry: &AssertionRegistry,
    ) -> Result<Self, MatcherError> {
        let field = |name: &str| {
            let name = name.to_string();
            move |e: MatcherError| MatcherError::Field {
                field: name,
                source: Box::new(e),
            }
        };

        Ok(Self {
            method: CompiledStringMatcher::compile(&request.method, registry)
                .map_err(field("method"))?,
            path: CompiledStringMatcher::compile(&request.path, registry)
                .map_err(field("path"))?,
            headers: request
                .headers
                .as_ref()
                .map(|h| CompiledMultiMapMatcher::compile_headers(h, registry))
                .transpose()
                .map_err(field("headers"))?,
            query_params: request
                .query_params
                .as_ref()
                .map(|q| CompiledMultiMapMatcher::compile(q, registry))
                .transpose()
                .map_err(field("query_params"))?,
            body: request
                .body
                .as_ref()
                .map(|b| CompiledBodyMatcher::compile(b, registry))
                .transpose()
                .map_err(field("body"))?,
        })
    }

    pub fn matches(&self, req: &Request) -> bool {
        if !self.method.matches(&req.method) {
            trace!(method = %req.method, "method did not match");
            return false;
        }
        if !self.path.matches(&req.path) {
            trace!(path = %req.path, "path did not match");
            return false;
        }
        if let Some(headers) = &self.headers {
            if !headers.matches(&req.headers) {
                trace!("headers did not match");
                return false;
            }
        }
        if let Some(query) = &self.query_params {
            if !query.matches(&req.query_params) {
                trace!("query params did not match");
                return false;
            }
        }
        if let Some(body) = &self.body {
            if !body.matches(&req.headers, &req.body_string) {
                trace!("body did not match");
                return false;
            }
        }
        true
    }
}
