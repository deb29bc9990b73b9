// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wraps errors crossing the sandbox boundary with source-mapped stacks, and reconstructs
//! wire-side error payloads into the same shape.
//!
//! Every error the host sees — whether thrown synchronously during sandbox evaluation, or
//! carried structurally in a `kind=ERROR`/`SUITE`/`TEST` frame's payload — passes through here
//! before it reaches the reporter, so both paths produce the same [`VMRuntimeError`] shape.

use crate::errors::VMRuntimeError;
use crate::sourcemap::SourceMapService;
use crate::wire::SerializedError;
use itertools::Itertools;
use regex::Regex;
use std::sync::OnceLock;

/// One line of a guest-thrown stack trace, as produced by a V8-style `Error.stack` string:
/// `    at <symbol> (<file>:<line>:<column>)`.
fn stack_frame_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"at\s+(?P<symbol>[^(]+)\s+\((?P<file>[^:]+):(?P<line>\d+):(?P<column>\d+)\)")
            .expect("static stack frame pattern is valid")
    })
}

/// Rewrites every stack line in `raw_stack` that references the suite's bundled source,
/// resolving it to an original `(source, line, column[, name])` location via `map`. Lines that
/// don't match the frame pattern (e.g. the leading `Error: message` line) pass through
/// unchanged; lines the map has no mapping for are left bundle-relative.
///
/// `include_framework` controls whether frames whose resolved source lies outside the suite's
/// own relative path are kept (labelled `(framework)`) or dropped outright.
pub fn remap_stack(
    raw_stack: &str,
    map: &SourceMapService,
    suite_relative_path: &str,
    include_framework: bool,
) -> String {
    let lines = truncate_at_suite_frame(raw_stack, suite_relative_path);
    lines
        .into_iter()
        .filter_map(|line| {
            let Some(caps) = stack_frame_re().captures(line) else {
                return Some(line.to_string());
            };
            let line_no: u32 = caps["line"].parse().unwrap_or(0);
            let col_no: u32 = caps["column"].parse().unwrap_or(0);
            match map.resolve_original(line_no.saturating_sub(1), col_no) {
                Ok(original) => {
                    let is_framework = !original.source.as_str().contains(suite_relative_path);
                    if is_framework && !include_framework {
                        return None;
                    }
                    let name = original.name.as_deref().unwrap_or(&caps["symbol"]);
                    let tag = if is_framework { " (framework)" } else { "" };
                    Some(format!(
                        "    at {name} ({}:{}:{}){tag}",
                        original.source,
                        original.line + 1,
                        original.column
                    ))
                }
                Err(_) => Some(line.to_string()),
            }
        })
        .join("\n")
}

/// Keeps stack lines up to and including the first one that references `suite_relative_path`,
/// dropping everything below it (the runner plumbing that invoked the suite).
fn truncate_at_suite_frame<'a>(raw_stack: &'a str, suite_relative_path: &str) -> Vec<&'a str> {
    let mut kept = Vec::new();
    let mut cut = false;
    for line in raw_stack.lines() {
        kept.push(line);
        if !cut && line.contains(suite_relative_path) {
            cut = true;
            break;
        }
    }
    if cut {
        kept
    } else {
        raw_stack.lines().collect()
    }
}

/// Wraps a guest-thrown error (sandbox evaluation throw, or an uncaught rejection surfaced by
/// the sandbox boundary) with a source-mapped stack.
pub fn wrap_guest_error(
    name: impl Into<String>,
    message: impl Into<String>,
    raw_stack: &str,
    map: &SourceMapService,
    suite_relative_path: &str,
    include_framework: bool,
) -> VMRuntimeError {
    let stack = remap_stack(raw_stack, map, suite_relative_path, include_framework);
    VMRuntimeError::new(name, message, stack)
}

/// Reconstructs a wire-side [`SerializedError`] payload (from a `kind=ERROR` frame, or the
/// embedded `error` field of a `SUITE`/`TEST` frame) into a [`VMRuntimeError`], recursing into
/// `aggregate` the same way an `AggregateError`'s nested errors are wrapped.
pub fn wrap_wire_error(
    err: &SerializedError,
    map: &SourceMapService,
    suite_relative_path: &str,
    include_framework: bool,
) -> VMRuntimeError {
    let stack = remap_stack(&err.stack, map, suite_relative_path, include_framework);
    let aggregate = err
        .aggregate
        .iter()
        .map(|nested| wrap_wire_error(nested, map, suite_relative_path, include_framework))
        .collect();
    VMRuntimeError::new(err.name.clone(), err.message.clone(), stack).with_aggregate(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::SourceMapService;

    fn map_with_mapping() -> SourceMapService {
        let raw = br#"{
            "version": 3,
            "sources": ["suite.ts"],
            "names": ["run"],
            "mappings": "AAAAA"
        }"#;
        SourceMapService::new(raw, "bundle.js").unwrap()
    }

    #[test]
    fn remaps_a_matching_frame() {
        let map = map_with_mapping();
        let stack = "Error: boom\n    at run (bundle.js:1:1)";
        let remapped = remap_stack(stack, &map, "suite.ts", true);
        assert!(remapped.contains("suite.ts:1:0"));
        assert!(remapped.contains("Error: boom"));
    }

    #[test]
    fn truncates_runner_plumbing_below_suite_frame() {
        let stack = "Error: boom\n    at a (suite.js:1:1)\n    at dispatchSuite (runner.js:99:1)";
        let kept = truncate_at_suite_frame(stack, "suite.js");
        assert_eq!(kept.len(), 2);
        assert!(!kept.iter().any(|l| l.contains("dispatchSuite")));
    }

    #[test]
    fn wraps_aggregate_wire_errors_recursively() {
        let map = map_with_mapping();
        let nested = SerializedError {
            name: "Error".into(),
            message: "inner".into(),
            stack: "Error: inner".into(),
            aggregate: Vec::new(),
            extra: Default::default(),
        };
        let outer = SerializedError {
            name: "AggregateError".into(),
            message: "outer".into(),
            stack: "AggregateError: outer".into(),
            aggregate: vec![nested],
            extra: Default::default(),
        };
        let wrapped = wrap_wire_error(&outer, &map, "suite.ts", true);
        assert_eq!(wrapped.aggregate().len(), 1);
        assert_eq!(wrapped.aggregate()[0].message(), "inner");
    }
}
