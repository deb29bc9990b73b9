// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering tests based on the `filter` runtime value (§4.G, §9 Open Question: "downstream
//! filtering semantics").
//!
//! The main structure here is [`TestFilter`], built once from a compiled
//! [`xjet_filtering::FilterExpr`] and evaluated per test against that test's full ancestry path
//! (`describe` chain joined with `::`, matching `ancestry` in §3's `TestNode`).

use crate::config::HostConfig;
use std::sync::Arc;
use xjet_filtering::{FilterExpr, FilterParseError};

/// Why a [`FilterMatch`] came back as a mismatch.
///
/// A single variant today since xJet's `filter` has exactly one axis (name/regex expression,
/// unlike the partitioned/ignored-aware filters this module used to model); kept as an enum
/// rather than a bare bool so a caller matching on it doesn't need to change if a second axis
/// is ever added.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MismatchReason {
    /// The path didn't satisfy the compiled filter expression.
    Expression,
}

/// The result of evaluating a [`TestFilter`] against one test's full path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FilterMatch {
    /// The test is selected to run.
    Matches,
    /// The test is excluded, and why.
    Mismatch { reason: MismatchReason },
}

impl FilterMatch {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matches)
    }
}

/// A compiled filter, scoped to one orchestrator run.
///
/// Built once from `HostConfig::compiled_filter` and shared, read-only, across every suite a
/// run dispatches. Cheap to clone: the expression tree sits behind an `Arc`.
#[derive(Clone, Debug)]
pub struct TestFilter {
    expr: Arc<FilterExpr>,
}

impl TestFilter {
    pub fn new(expr: FilterExpr) -> Self {
        Self { expr: Arc::new(expr) }
    }

    /// A filter that matches every test, used when no `filter` was configured.
    pub fn all() -> Self {
        Self::new(FilterExpr::All)
    }

    /// Compiles the `filter` field of a [`HostConfig`] into a [`TestFilter`].
    pub fn from_config(config: &HostConfig) -> Result<Self, FilterParseError> {
        Ok(Self::new(config.compiled_filter()?))
    }

    /// Evaluates the filter against `full_path` (a `describe`/test ancestry join, §3).
    pub fn filter_match(&self, full_path: &str) -> FilterMatch {
        if self.expr.matches(full_path) {
            FilterMatch::Matches
        } else {
            FilterMatch::Mismatch {
                reason: MismatchReason::Expression,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_matches_everything() {
        let filter = TestFilter::all();
        assert!(filter.filter_match("suite::anything").is_match());
    }

    #[test]
    fn compiled_expression_accepts_and_rejects() {
        let expr = xjet_filtering::parse("wanted").unwrap();
        let filter = TestFilter::new(expr);
        assert!(filter.filter_match("suite::wanted::case").is_match());
        assert_eq!(
            filter.filter_match("suite::other::case"),
            FilterMatch::Mismatch {
                reason: MismatchReason::Expression
            }
        );
    }

    #[test]
    fn empty_pattern_list_compiles_to_match_all() {
        let expr = xjet_filtering::compile_many(std::iter::empty::<&str>()).unwrap();
        let filter = TestFilter::new(expr);
        assert!(filter.filter_match("anything::at::all").is_match());
    }
}
