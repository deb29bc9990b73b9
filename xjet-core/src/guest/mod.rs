// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The preamble injected into every suite bundle: the describe/test/hook registration model,
//! the execution engine, formatting helpers, and the guest-side frame emitter (§4.G).
//!
//! In this Rust rewrite "injected into a bundle" becomes "linked into the binary a runner
//! actually executes" — there is no separate VM boundary to inject a preamble across, so the
//! types here are the runtime itself rather than a string of source prepended ahead of one.

pub mod dsl;
pub mod emit;
pub mod exec;
pub mod format;
pub mod suite;

use crate::wire::SerializedError;

/// A structurally-detected thrown error: any value with a `name`, `message`, and `stack`,
/// following §9's "replace language-specific `instanceof` checks with structural detection".
///
/// Constructed by test/hook blocks that fail; converts directly to the wire payload shape.
#[derive(Clone, Debug)]
pub struct GuestError {
    pub name: String,
    pub message: String,
    pub stack: String,
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub aggregate: Vec<GuestError>,
}

impl GuestError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        let stack = format!("{name}: {message}");
        Self {
            name,
            message,
            stack,
            extra: serde_json::Map::new(),
            aggregate: Vec::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    pub fn aggregate(name: impl Into<String>, errors: Vec<GuestError>) -> Self {
        let message = format!("{} errors occurred", errors.len());
        Self {
            aggregate: errors,
            ..Self::new(name, message)
        }
    }
}

impl std::fmt::Display for GuestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for GuestError {}

impl From<&crate::errors::XJetCoreError> for GuestError {
    fn from(err: &crate::errors::XJetCoreError) -> Self {
        Self::new("XJetError", err.to_string())
    }
}

impl From<GuestError> for SerializedError {
    fn from(err: GuestError) -> Self {
        SerializedError {
            name: err.name,
            message: err.message,
            stack: err.stack,
            aggregate: err.aggregate.into_iter().map(Into::into).collect(),
            extra: err.extra,
        }
    }
}
