// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// An error produced while parsing a filter expression.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid filter expression `{input}`: {reason}")]
pub struct FilterParseError {
    pub(crate) input: String,
    pub(crate) reason: String,
}

impl FilterParseError {
    pub(crate) fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
