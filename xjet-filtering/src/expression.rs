// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use smol_str::SmolStr;
use std::fmt;

/// A single leaf matcher against a test's full path (ancestry joined with
/// `::`, followed by its own description).
#[derive(Debug, Clone)]
pub enum NameMatcher {
    /// `=value`: the path equals `value` exactly.
    Equal(SmolStr),
    /// `value` or `~value`: the path contains `value` as a substring.
    Contains(SmolStr),
    /// `/pattern/`: the path matches the regex `pattern`.
    Regex(regex::Regex),
}

impl NameMatcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Equal(value) => path == value.as_str(),
            Self::Contains(value) => path.contains(value.as_str()),
            Self::Regex(re) => re.is_match(path),
        }
    }
}

impl PartialEq for NameMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Equal(a), Self::Equal(b)) | (Self::Contains(a), Self::Contains(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for NameMatcher {}

impl fmt::Display for NameMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal(value) => write!(f, "={value}"),
            Self::Contains(value) => write!(f, "{value}"),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// A compiled filter expression over test full paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// Matches every test.
    All,
    /// Matches no tests.
    None,
    /// Matches a leaf name matcher.
    Name(NameMatcher),
    Not(Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    /// Evaluates this expression against a test's full path.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Name(matcher) => matcher.matches(path),
            Self::Not(inner) => !inner.matches(path),
            Self::And(a, b) => a.matches(path) && b.matches(path),
            Self::Or(a, b) => a.matches(path) || b.matches(path),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all()"),
            Self::None => write!(f, "none()"),
            Self::Name(matcher) => write!(f, "{matcher}"),
            Self::Not(inner) => write!(f, "not({inner})"),
            Self::And(a, b) => write!(f, "({a}) and ({b})"),
            Self::Or(a, b) => write!(f, "({a}) or ({b})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_inverts() {
        let expr = FilterExpr::Not(Box::new(FilterExpr::Name(NameMatcher::Contains(
            "foo".into(),
        ))));
        assert!(expr.matches("bar"));
        assert!(!expr.matches("foo"));
    }

    #[test]
    fn and_requires_both() {
        let expr = FilterExpr::And(
            Box::new(FilterExpr::Name(NameMatcher::Contains("foo".into()))),
            Box::new(FilterExpr::Name(NameMatcher::Contains("bar".into()))),
        );
        assert!(expr.matches("foobar"));
        assert!(!expr.matches("foo"));
    }
}
