// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A small filtering DSL used to decide which tests a run should include.
//!
//! xJet's host configuration accepts a `filter` value that is either a bare
//! string (matched as a substring against a test's full path) or a list of
//! such strings (matched if any apply). This crate adds a compiled
//! expression form on top of that: a string may also be a boolean
//! combination of name matchers, built with `and`, `or`, `not` and
//! parentheses, with bare words treated as substring matches and
//! `/pattern/` treated as a regex.
//!
//! A test's full path, against which matchers are applied, is the `::`
//! join of its ancestry and its own description (see
//! [`xjet_core::suite::TestNode::full_path`](../xjet_core/suite/struct.TestNode.html)).

mod errors;
mod expression;
mod parsing;

pub use errors::FilterParseError;
pub use expression::{FilterExpr, NameMatcher};

/// Parses a single filter string into a [`FilterExpr`].
///
/// Plain substrings (no recognized operator) are accepted as-is and treated
/// as an implicit [`NameMatcher::Contains`].
pub fn parse(input: &str) -> Result<FilterExpr, FilterParseError> {
    parsing::parse(input)
}

/// Compiles the `filter` value from the host configuration (a single string,
/// or a list of strings treated as an implicit union) into one [`FilterExpr`].
pub fn compile_many<'a>(
    inputs: impl IntoIterator<Item = &'a str>,
) -> Result<FilterExpr, FilterParseError> {
    let mut exprs = inputs.into_iter().map(parse);
    let mut acc = match exprs.next() {
        Some(first) => first?,
        None => return Ok(FilterExpr::All),
    };
    for next in exprs {
        acc = FilterExpr::Or(Box::new(acc), Box::new(next?));
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_word_is_contains() {
        let expr = parse("describe").unwrap();
        assert!(expr.matches("S::describe::test"));
        assert!(!expr.matches("S::other::test"));
    }

    #[test]
    fn compile_many_is_union() {
        let expr = compile_many(["a", "b"]).unwrap();
        assert!(expr.matches("xxaxx"));
        assert!(expr.matches("xxbxx"));
        assert!(!expr.matches("xxcxx"));
    }

    #[test]
    fn compile_many_empty_matches_all() {
        let expr = compile_many(std::iter::empty()).unwrap();
        assert!(expr.matches("anything"));
    }
}
