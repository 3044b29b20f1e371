//! Multi-value matchers for headers and query parameters.

use super::assertion::AssertionRegistry;
use super::string_matcher::{CompiledStringMatcher, StringMatcher, StringMatcherRepr};
use super::MatcherError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Key to list-of-values map used for headers and query parameters.
pub type MultiMap = BTreeMap<String, Vec<String>>;

/// Canonical MIME header form: `x-request-id` becomes `X-Request-Id`.
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// Parse an `application/x-www-form-urlencoded` string (also used for URL queries).
///
/// `+` decodes to a space; pairs that fail to decode are kept raw.
pub fn parse_query(raw: &str) -> MultiMap {
    let mut params = MultiMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(decode_component(key))
            .or_default()
            .push(decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// List of matchers declared for one key.
///
/// Accepts a bare string, a single matcher object, or a list of either.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StringMatcherSlice(pub Vec<StringMatcher>);

impl<'de> Deserialize<'de> for StringMatcherSlice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            // Tried first: a struct variant would also accept a two-element sequence.
            Many(Vec<StringMatcherRepr>),
            One(StringMatcherRepr),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Many(ms) => StringMatcherSlice(ms.into_iter().map(Into::into).collect()),
            Repr::One(m) => StringMatcherSlice(vec![m.into()]),
        })
    }
}

impl From<Vec<StringMatcher>> for StringMatcherSlice {
    fn from(matchers: Vec<StringMatcher>) -> Self {
        StringMatcherSlice(matchers)
    }
}

/// Declared key to matcher-list mapping.
pub type MultiMapMatcher = BTreeMap<String, StringMatcherSlice>;

/// Compiled multi-map matcher.
///
/// Every declared key must exist in the actual map, and each declared matcher
/// must be satisfied by at least one actual value under that key.
#[derive(Debug, Clone)]
pub struct CompiledMultiMapMatcher {
    entries: Vec<(String, Vec<CompiledStringMatcher>)>,
}

impl CompiledMultiMapMatcher {
    /// Compile a query-parameter matcher (keys are case-sensitive).
    pub fn compile(
        matcher: &MultiMapMatcher,
        registry: &AssertionRegistry,
    ) -> Result<Self, MatcherError> {
        Self::compile_with(matcher, registry, |k| k.to_string())
    }

    /// Compile a header matcher (keys are canonicalized).
    pub fn compile_headers(
        matcher: &MultiMapMatcher,
        registry: &AssertionRegistry,
    ) -> Result<Self, MatcherError> {
        Self::compile_with(matcher, registry, canonical_header_key)
    }

    fn compile_with(
        matcher: &MultiMapMatcher,
        registry: &AssertionRegistry,
        key: impl Fn(&str) -> String,
    ) -> Result<Self, MatcherError> {
        let mut entries = Vec::with_capacity(matcher.len());
        for (name, slice) in matcher {
            let compiled = slice
                .0
                .iter()
                .map(|m| CompiledStringMatcher::compile(m, registry))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MatcherError::Field {
                    field: name.clone(),
                    source: Box::new(e),
                })?;
            entries.push((key(name), compiled));
        }
        Ok(Self { entries })
    }

    pub fn matches(&self, actual: &MultiMap) -> bool {
        if self.entries.len() > actual.len() {
            return false;
        }
        self.entries.iter().all(|(key, matchers)| {
            let Some(values) = actual.get(key) else {
                return false;
            };
            matchers.len() <= values.len()
                && matchers
                    .iter()
                    .all(|m| values.iter().any(|v| m.matches(v)))
        })
    }
}
