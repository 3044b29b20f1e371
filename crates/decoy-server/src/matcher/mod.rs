//! Request matchers.
//!
//! Definitions deserialize into plain config types ([`StringMatcher`],
//! [`BodyMatcher`], [`MultiMapMatcher`], [`MockRequest`]) and are compiled once at
//! registration into their `Compiled*` counterparts, so invalid regexes, JSON or
//! assertion names fail registration instead of a live request.

pub mod assertion;
pub mod body_matcher;
pub mod json;
pub mod multimap;
pub mod request;
pub mod string_matcher;

pub use assertion::{Assertion, AssertionRegistry};
pub use body_matcher::{BodyMatcher, CompiledBodyMatcher};
pub use json::JsonPattern;
pub use multimap::{
    canonical_header_key, parse_query, CompiledMultiMapMatcher, MultiMap, MultiMapMatcher,
    StringMatcherSlice,
};
pub use request::{CompiledMockRequest, MockRequest};
pub use string_matcher::{CompiledStringMatcher, StringMatcher};

use thiserror::Error;

/// Error raised while compiling a matcher.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("invalid matcher {0:?}")]
    UnknownAssertion(String),

    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{assertion} expects a valid JSON value: {source}")]
    InvalidJson {
        assertion: Assertion,
        #[source]
        source: serde_json::Error,
    },

    #[error("ShouldAlmostEqual expects a number, got {0:?}")]
    InvalidNumber(String),

    #[error("{field}: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<MatcherError>,
    },
}
