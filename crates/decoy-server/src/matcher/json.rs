//! Structural JSON comparison.
//!
//! Expected documents are compiled once into a [`JsonPattern`]. Numbers compare
//! numerically and objects need the exact same key set. Arrays compare
//! positionally unless the pattern was built with [`JsonPattern::unordered`], in
//! which case every array of two or more elements is compared as a multiset.

use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum JsonPattern {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array {
        items: Vec<JsonPattern>,
        unordered: bool,
    },
    Object(BTreeMap<String, JsonPattern>),
}

impl JsonPattern {
    /// Pattern where arrays are compared element by element.
    pub fn ordered(expected: &Value) -> Self {
        Self::build(expected, false)
    }

    /// Pattern where arrays of length >= 2 accept any permutation.
    pub fn unordered(expected: &Value) -> Self {
        Self::build(expected, true)
    }

    fn build(value: &Value, unordered: bool) -> Self {
        match value {
            Value::Null => JsonPattern::Null,
            Value::Bool(b) => JsonPattern::Bool(*b),
            Value::Number(n) => JsonPattern::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => JsonPattern::String(s.clone()),
            Value::Array(items) => JsonPattern::Array {
                unordered: unordered && items.len() >= 2,
                items: items.iter().map(|v| Self::build(v, unordered)).collect(),
            },
            Value::Object(map) => JsonPattern::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::build(v, unordered)))
                    .collect(),
            ),
        }
    }

    pub fn matches(&self, actual: &Value) -> bool {
        match (self, actual) {
            (JsonPattern::Null, Value::Null) => true,
            (JsonPattern::Bool(expected), Value::Bool(b)) => expected == b,
            (JsonPattern::Number(expected), Value::Number(n)) => {
                n.as_f64().is_some_and(|n| n == *expected)
            }
            (JsonPattern::String(expected), Value::String(s)) => expected == s,
            (JsonPattern::Object(expected), Value::Object(map)) => {
                expected.len() == map.len()
                    && expected
                        .iter()
                        .all(|(k, p)| map.get(k).is_some_and(|v| p.matches(v)))
            }
            (JsonPattern::Array { items, unordered }, Value::Array(values)) => {
                if items.len() != values.len() {
                    return false;
                }
                if *unordered {
                    permutation_matches(items, values)
                } else {
                    items.iter().zip(values).all(|(p, v)| p.matches(v))
                }
            }
            _ => false,
        }
    }
}

/// Perfect bipartite matching between expected items and actual values.
///
/// Greedy pairing is not enough once items are themselves unordered patterns,
/// so this uses augmenting paths.
fn permutation_matches(items: &[JsonPattern], values: &[Value]) -> bool {
    let n = items.len();
    let compatible: Vec<Vec<bool>> = items
        .iter()
        .map(|p| values.iter().map(|v| p.matches(v)).collect())
        .collect();

    // owner[j] = index of the expected item currently paired with values[j]
    let mut owner: Vec<Option<usize>> = vec![None; n];
    for i in 0..n {
        let mut visited = vec![false; n];
        if !augment(i, &compatible, &mut visited, &mut owner) {
            return false;
        }
    }
    true
}

fn augment(
    i: usize,
    compatible: &[Vec<bool>],
    visited: &mut [bool],
    owner: &mut [Option<usize>],
) -> bool {
    for j in 0..owner.len() {
        if !compatible[i][j] || visited[j] {
            continue;
        }
        visited[j] = true;
        let free = match owner[j] {
            None => true,
            Some(other) => augment(other, compatible, visited, owner),
        };
        if free {
            owner[j] = Some(i);
            return true;
        }
    }
    false
}
