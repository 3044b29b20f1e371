//! String matcher configuration and its compiled form.
//!
//! On the wire a string matcher is either a bare string (shorthand for
//! `ShouldEqual`) or an object `{matcher, value}`. Compilation resolves the
//! assertion name against an [`AssertionRegistry`] and pre-computes whatever the
//! assertion needs (regex, JSON pattern, number) so requests never parse it again.

use super::assertion::{Assertion, AssertionRegistry};
use super::json::JsonPattern;
use super::MatcherError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

/// Tolerance used by `ShouldAlmostEqual`.
pub const ALMOST_EQUAL_DELTA: f64 = 1e-10;

/// A named assertion plus its expected value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StringMatcher {
    pub matcher: String,
    pub value: String,
}

impl StringMatcher {
    pub fn new(assertion: Assertion, value: impl Into<String>) -> Self {
        Self {
            matcher: assertion.name().to_string(),
            value: value.into(),
        }
    }

    /// `ShouldEqual` on the given value.
    pub fn equal(value: impl Into<String>) -> Self {
        Self::new(Assertion::Equal, value)
    }

    /// Matcher accepting anything (`ShouldMatch ".*"`).
    pub fn any() -> Self {
        Self::new(Assertion::Match, ".*")
    }

    /// Whether the value was left blank (or only whitespace), whatever the matcher.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum StringMatcherRepr {
    Plain(String),
    Full {
        matcher: String,
        #[serde(default)]
        value: String,
    },
}

impl From<StringMatcherRepr> for StringMatcher {
    fn from(repr: StringMatcherRepr) -> Self {
        match repr {
            StringMatcherRepr::Plain(value) => StringMatcher::equal(value),
            StringMatcherRepr::Full { matcher, value } => StringMatcher { matcher, value },
        }
    }
}

impl<'de> Deserialize<'de> for StringMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        StringMatcherRepr::deserialize(deserializer).map(Into::into)
    }
}

#[derive(Debug, Clone)]
enum Expected {
    Text(String),
    Regex(Arc<Regex>),
    Json(Arc<JsonPattern>),
    Number(f64),
    Nothing,
}

/// String matcher ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledStringMatcher {
    assertion: Assertion,
    expected: Expected,
}

impl CompiledStringMatcher {
    pub fn compile(
        matcher: &StringMatcher,
        registry: &AssertionRegistry,
    ) -> Result<Self, MatcherError> {
        let assertion = registry
            .lookup(&matcher.matcher)
            .ok_or_else(|| MatcherError::UnknownAssertion(matcher.matcher.clone()))?;
        let value = &matcher.value;

        let expected = match assertion.positive() {
            Assertion::Match => {
                let regex = Regex::new(value).map_err(|source| MatcherError::InvalidRegex {
                    pattern: value.clone(),
                    source,
                })?;
                Expected::Regex(Arc::new(regex))
            }
            Assertion::EqualJson | Assertion::EqualUnorderedJson => {
                let parsed: serde_json::Value = serde_json::from_str(value).map_err(|source| {
                    MatcherError::InvalidJson {
                        assertion,
                        source,
                    }
                })?;
                let pattern = if assertion.positive() == Assertion::EqualUnorderedJson {
                    JsonPattern::unordered(&parsed)
                } else {
                    JsonPattern::ordered(&parsed)
                };
                Expected::Json(Arc::new(pattern))
            }
            Assertion::AlmostEqual => {
                let number = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| MatcherError::InvalidNumber(value.clone()))?;
                Expected::Number(number)
            }
            Assertion::BeEmpty => Expected::Nothing,
            _ => Expected::Text(value.clone()),
        };

        Ok(Self {
            assertion,
            expected,
        })
    }

    pub fn assertion(&self) -> Assertion {
        self.assertion
    }

    /// Evaluate the matcher against an actual value.
    pub fn matches(&self, actual: &str) -> bool {
        // JSON assertions never match a value that is not JSON, negated or not.
        if let Expected::Json(pattern) = &self.expected {
            let Ok(actual) = serde_json::from_str::<serde_json::Value>(actual) else {
                return false;
            };
            return pattern.matches(&actual) != self.assertion.is_negated();
        }
        if let Expected::Number(expected) = &self.expected {
            let Ok(actual) = actual.trim().parse::<f64>() else {
                return false;
            };
            let close = (actual - expected).abs() <= ALMOST_EQUAL_DELTA;
            return close != self.assertion.is_negated();
        }
        self.positive_matches(actual) != self.assertion.is_negated()
    }

    fn positive_matches(&self, actual: &str) -> bool {
        match (&self.expected, self.assertion.positive()) {
            (Expected::Regex(regex), _) => regex.is_match(actual),
            (Expected::Nothing, _) => actual.is_empty(),
            (Expected::Text(value), Assertion::ContainSubstring) => actual.contains(value.as_str()),
            (Expected::Text(value), Assertion::StartWith) => actual.starts_with(value.as_str()),
            (Expected::Text(value), Assertion::EndWith) => actual.ends_with(value.as_str()),
            (Expected::Text(value), _) => actual == value,
            (Expected::Json(_) | Expected::Number(_), _) => false,
        }
    }
}
