//! Named assertion strategies.
//!
//! Every string matcher names one assertion. The set of names is closed, but the
//! lookup table is an explicit value ([`AssertionRegistry`]) handed to validation
//! instead of a global, so callers can restrict it.

use std::collections::HashMap;
use std::fmt;

/// An assertion a [`super::StringMatcher`] applies to an actual value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assertion {
    Equal,
    NotEqual,
    Resemble,
    NotResemble,
    AlmostEqual,
    NotAlmostEqual,
    ContainSubstring,
    NotContainSubstring,
    StartWith,
    NotStartWith,
    EndWith,
    NotEndWith,
    Match,
    NotMatch,
    BeEmpty,
    NotBeEmpty,
    EqualJson,
    NotEqualJson,
    EqualUnorderedJson,
    NotEqualUnorderedJson,
}

impl Assertion {
    pub const ALL: [Assertion; 20] = [
        Assertion::Equal,
        Assertion::NotEqual,
        Assertion::Resemble,
        Assertion::NotResemble,
        Assertion::AlmostEqual,
        Assertion::NotAlmostEqual,
        Assertion::ContainSubstring,
        Assertion::NotContainSubstring,
        Assertion::StartWith,
        Assertion::NotStartWith,
        Assertion::EndWith,
        Assertion::NotEndWith,
        Assertion::Match,
        Assertion::NotMatch,
        Assertion::BeEmpty,
        Assertion::NotBeEmpty,
        Assertion::EqualJson,
        Assertion::NotEqualJson,
        Assertion::EqualUnorderedJson,
        Assertion::NotEqualUnorderedJson,
    ];

    /// Wire name of the assertion, as written in mock definitions.
    pub fn name(self) -> &'static str {
        match self {
            Assertion::Equal => "ShouldEqual",
            Assertion::NotEqual => "ShouldNotEqual",
            Assertion::Resemble => "ShouldResemble",
            Assertion::NotResemble => "ShouldNotResemble",
            Assertion::AlmostEqual => "ShouldAlmostEqual",
            Assertion::NotAlmostEqual => "ShouldNotAlmostEqual",
            Assertion::ContainSubstring => "ShouldContainSubstring",
            Assertion::NotContainSubstring => "ShouldNotContainSubstring",
            Assertion::StartWith => "ShouldStartWith",
            Assertion::NotStartWith => "ShouldNotStartWith",
            Assertion::EndWith => "ShouldEndWith",
            Assertion::NotEndWith => "ShouldNotEndWith",
            Assertion::Match => "ShouldMatch",
            Assertion::NotMatch => "ShouldNotMatch",
            Assertion::BeEmpty => "ShouldBeEmpty",
            Assertion::NotBeEmpty => "ShouldNotBeEmpty",
            Assertion::EqualJson => "ShouldEqualJSON",
            Assertion::NotEqualJson => "ShouldNotEqualJSON",
            Assertion::EqualUnorderedJson => "ShouldEqualUnorderedJSON",
            Assertion::NotEqualUnorderedJson => "ShouldNotEqualUnorderedJSON",
        }
    }

    /// Whether this assertion is the negation of another one.
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            Assertion::NotEqual
                | Assertion::NotResemble
                | Assertion::NotAlmostEqual
                | Assertion::NotContainSubstring
                | Assertion::NotStartWith
                | Assertion::NotEndWith
                | Assertion::NotMatch
                | Assertion::NotBeEmpty
                | Assertion::NotEqualJson
                | Assertion::NotEqualUnorderedJson
        )
    }

    /// The positive form of this assertion.
    pub fn positive(self) -> Assertion {
        match self {
            Assertion::NotEqual => Assertion::Equal,
            Assertion::NotResemble => Assertion::Resemble,
            Assertion::NotAlmostEqual => Assertion::AlmostEqual,
            Assertion::NotContainSubstring => Assertion::ContainSubstring,
            Assertion::NotStartWith => Assertion::StartWith,
            Assertion::NotEndWith => Assertion::EndWith,
            Assertion::NotMatch => Assertion::Match,
            Assertion::NotBeEmpty => Assertion::BeEmpty,
            Assertion::NotEqualJson => Assertion::EqualJson,
            Assertion::NotEqualUnorderedJson => Assertion::EqualUnorderedJson,
            other => other,
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name-to-assertion table consulted when mocks are validated.
#[derive(Debug, Clone)]
pub struct AssertionRegistry {
    by_name: HashMap<&'static str, Assertion>,
}

impl AssertionRegistry {
    /// Registry holding every known assertion.
    pub fn standard() -> Self {
        Self::with_assertions(Assertion::ALL)
    }

    /// Registry restricted to the given assertions.
    pub fn with_assertions(assertions: impl IntoIterator<Item = Assertion>) -> Self {
        let by_name = assertions.into_iter().map(|a| (a.name(), a)).collect();
        Self { by_name }
    }

    pub fn lookup(&self, name: &str) -> Option<Assertion> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for AssertionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
