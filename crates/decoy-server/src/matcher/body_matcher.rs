//! Body matching.
//!
//! A body matcher is either one string matcher applied to the raw body, or a
//! map of JSON paths to string matchers applied to the decoded body. Form bodies
//! (`application/x-www-form-urlencoded`) are decoded to `{key: [values]}` first.

use super::assertion::AssertionRegistry;
use super::multimap::{parse_query, MultiMap};
use super::string_matcher::{CompiledStringMatcher, StringMatcher, StringMatcherRepr};
use super::MatcherError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BodyMatcher {
    /// Matcher over the raw body text.
    Whole(StringMatcher),
    /// JSON path to matcher.
    Fields(BTreeMap<String, StringMatcher>),
}

impl<'de> Deserialize<'de> for BodyMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Plain(String),
            Map(BTreeMap<String, StringMatcherRepr>),
        }

        let mut map = match Repr::deserialize(deserializer)? {
            Repr::Plain(value) => return Ok(BodyMatcher::Whole(StringMatcher::equal(value))),
            Repr::Map(map) => map,
        };

        // `{matcher: <name>, value: <text>}` reads as a whole-body matcher; compile
        // turns it back into fields when the registry does not know the name.
        let whole_body = map.keys().all(|k| k == "matcher" || k == "value")
            && matches!(map.get("matcher"), Some(StringMatcherRepr::Plain(_)))
            && !matches!(map.get("value"), Some(StringMatcherRepr::Full { .. }));
        if whole_body {
            let matcher = match map.remove("matcher") {
                Some(StringMatcherRepr::Plain(name)) => name,
                _ => String::new(),
            };
            let value = match map.remove("value") {
                Some(StringMatcherRepr::Plain(value)) => value,
                _ => String::new(),
            };
            return Ok(BodyMatcher::Whole(StringMatcher { matcher, value }));
        }

        Ok(BodyMatcher::Fields(
            map.into_iter().map(|(k, v)| (k, v.into())).collect(),
        ))
    }
}

#[derive(Debug, Clone)]
pub enum CompiledBodyMatcher {
    Whole(CompiledStringMatcher),
    Fields(Vec<(String, CompiledStringMatcher)>),
}

impl CompiledBodyMatcher {
    pub fn compile(
        matcher: &BodyMatcher,
        registry: &AssertionRegistry,
    ) -> Result<Self, MatcherError> {
        match matcher {
            BodyMatcher::Whole(m) if registry.lookup(&m.matcher).is_some() => {
                Ok(Self::Whole(CompiledStringMatcher::compile(m, registry)?))
            }
            BodyMatcher::Whole(m) => Self::compile_fields(&unknown_whole_as_fields(m), registry),
            BodyMatcher::Fields(fields) => Self::compile_fields(fields, registry),
        }
    }

    fn compile_fields(
        fields: &BTreeMap<String, StringMatcher>,
        registry: &AssertionRegistry,
    ) -> Result<Self, MatcherError> {
        let compiled = fields
            .iter()
            .map(|(path, m)| {
                CompiledStringMatcher::compile(m, registry)
                    .map(|c| (path.clone(), c))
                    .map_err(|e| MatcherError::Field {
                        field: path.clone(),
                        source: Box::new(e),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self::Fields(compiled))
    }

    /// Match against the raw body; `headers` must use canonical keys.
    pub fn matches(&self, headers: &MultiMap, body: &str) -> bool {
        let fields = match self {
            Self::Whole(m) => return m.matches(body),
            Self::Fields(fields) => fields,
        };

        let document = if is_form(headers) {
            form_to_json(body)
        } else {
            match serde_json::from_str::<Value>(body) {
                Ok(v) => v,
                Err(_) => return false,
            }
        };

        fields.iter().all(|(path, matcher)| {
            lookup_path(&document, path)
                .map(value_text)
                .is_some_and(|text| matcher.matches(&text))
        })
    }
}

/// `{matcher: ShouldRock, value: x}` with an unregistered name: two body fields.
fn unknown_whole_as_fields(matcher: &StringMatcher) -> BTreeMap<String, StringMatcher> {
    let mut fields = BTreeMap::from([(
        "matcher".to_string(),
        StringMatcher::equal(matcher.matcher.clone()),
    )]);
    if !matcher.value.is_empty() {
        fields.insert("value".to_string(), StringMatcher::equal(matcher.value.clone()));
    }
    fields
}

fn is_form(headers: &MultiMap) -> bool {
    headers
        .get("Content-Type")
        .and_then(|values| values.first())
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

fn form_to_json(body: &str) -> Value {
    let object = parse_query(body)
        .into_iter()
        .map(|(k, vs)| (k, Value::Array(vs.into_iter().map(Value::String).collect())))
        .collect();
    Value::Object(object)
}

/// Text form of a JSON value for string assertions.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Walk a dotted path such as `user.tags[0]` or `items.1.name`.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() {
        return Some(value);
    }

    // Split on the first . or [
    let (segment, rest) = match path.find(['.', '[']) {
        Some(pos) if path.as_bytes()[pos] == b'.' => (&path[..pos], &path[pos + 1..]),
        Some(pos) => (&path[..pos], &path[pos..]),
        None => (path, ""),
    };

    if segment.is_empty() {
        // Leading [n]
        let inner = path.strip_prefix('[')?;
        let end = inner.find(']')?;
        let index = inner[..end].trim().parse::<usize>().ok()?;
        let rest = &inner[end + 1..];
        let rest = rest.strip_prefix('.').unwrap_or(rest);
        return lookup_path(value.as_array()?.get(index)?, rest);
    }

    let next = match value {
        Value::Object(map) => map.get(segment)?,
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
        _ => return None,
    };
    lookup_path(next, rest)
}
