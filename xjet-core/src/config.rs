// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data contracts consumed from the external configuration collaborator (§1, §6, §10.3).
//!
//! xjet-core does not parse configuration files or environment variables itself — that's the
//! CLI/config-file loader's job — but it does define, and validate, the shape an already-built
//! configuration object must have before the orchestrator can run.

use serde::{Deserialize, Serialize};

/// `filter: string | string[]` (§9 Open Questions): both shapes are accepted. A single string
/// and a one-element list are equivalent; a multi-element list is an implicit union (OR) of its
/// entries, each compiled independently by `xjet-filtering`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterInput {
    Single(String),
    Many(Vec<String>),
}

impl FilterInput {
    /// Normalizes to a list, regardless of which shape was provided.
    pub fn as_patterns(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::Many(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// The host configuration subset consumed by the core (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub bail: bool,
    #[serde(default)]
    pub filter: Option<FilterInput>,
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default)]
    pub randomize: bool,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_parallel() -> usize {
    1
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bail: false,
            filter: None,
            timeout: default_timeout_ms(),
            randomize: false,
            parallel: default_parallel(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl HostConfig {
    /// `maxConcurrency` handed to the [`TaskQueue`](crate::queue::TaskQueue), clamped to >= 1
    /// per §4.D ("Construction parameter: `maxConcurrency` (clamped to ≥ 1)").
    pub fn max_concurrency(&self) -> usize {
        self.parallel.max(1)
    }

    /// Compiles `filter` (if any) into a single expression via `xjet-filtering`.
    pub fn compiled_filter(&self) -> Result<xjet_filtering::FilterExpr, xjet_filtering::FilterParseError> {
        match &self.filter {
            Some(input) => xjet_filtering::compile_many(input.as_patterns()),
            None => Ok(xjet_filtering::FilterExpr::All),
        }
    }
}

/// The read-only runtime context injected before sandbox execution (§3 "Runtime context").
///
/// Serialized as `__XJET.runtime` for the local target's sandbox globals, and prepended as
/// `const __XJET = <JSON>;` ahead of an external target's bundle code (§4.E).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeContext {
    pub bail: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterInput>,
    pub timeout: u64,
    pub randomize: bool,
    pub suite_id: String,
    pub runner_id: String,
    pub relative_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_input_accepts_both_shapes() {
        let single: FilterInput = serde_json::from_str(r#""foo""#).unwrap();
        assert_eq!(single.as_patterns(), vec!["foo"]);
        let many: FilterInput = serde_json::from_str(r#"["foo", "bar"]"#).unwrap();
        assert_eq!(many.as_patterns(), vec!["foo", "bar"]);
    }

    #[test]
    fn max_concurrency_is_clamped_to_at_least_one() {
        let mut config = HostConfig {
            parallel: 0,
            ..Default::default()
        };
        assert_eq!(config.max_concurrency(), 1);
        config.parallel = 8;
        assert_eq!(config.max_concurrency(), 8);
    }
}
