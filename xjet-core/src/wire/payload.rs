// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON payload schemas carried by each [`super::FrameKind`].

use serde::{Deserialize, Serialize};

/// Payload of a `LOG` frame: an intercepted `console.*` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogPayload {
    pub level: LogLevel,
    pub context: Vec<String>,
    pub location: Option<Location>,
    pub timestamp: String,
    pub description: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// The action reported for a `TEST` or `DESCRIBE` frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Start,
    Skip,
    Todo,
    Failure,
    Success,
}

/// Payload of a `TEST` or `DESCRIBE` frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionPayload {
    pub action: Action,
    pub description: String,
    pub ancestry: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<SerializedError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// A structurally-detected error payload: any value carrying `message`/`stack`, with all other
/// enumerable own keys preserved under `extra`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    pub stack: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregate: Vec<SerializedError>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Payload of the terminal `SUITE` frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuitePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
}

/// Payload of an `ERROR` frame (a Target-fatal or wire-level failure for this suite).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: SerializedError,
}

/// Payload of a `STATUS` frame: an informational, non-terminal status update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusPayload {
    pub message: String,
}
