// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by xjet-core.
//!
//! Each failure mode gets its own narrow `thiserror` struct (mirroring how a suite's own
//! `ConfigParseError`/`ProfileNotFound` pattern separates "what went wrong" from "how it's
//! reported"), composed into the top-level [`XJetError`] enum used at public API boundaries.

use crate::wire::FrameKind;
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Failed to set up the process-level signal handler.
#[derive(Debug, Error)]
#[error("failed to set up signal handler")]
pub struct SignalHandlerSetupError {
    #[source]
    pub(crate) err: std::io::Error,
}

/// A test, hook, or describe block was registered while a test was already running.
///
/// Per the suite-graph invariant, registration (`describe`/`test`/hook calls) is only legal
/// during the synchronous build phase of a bundle; calling it from inside a running test's
/// block is rejected.
#[derive(Clone, Debug, Error)]
#[error("cannot register `{what}` while test `{running_test}` is executing")]
pub struct NestingError {
    pub(crate) what: &'static str,
    pub(crate) running_test: String,
}

impl NestingError {
    pub(crate) fn new(what: &'static str, running_test: impl Into<String>) -> Self {
        Self {
            what,
            running_test: running_test.into(),
        }
    }
}

/// A hook was registered with a type outside the closed set
/// `{BEFORE_ALL, AFTER_ALL, BEFORE_EACH, AFTER_EACH}`.
#[derive(Clone, Debug, Error)]
#[error("unknown hook type `{kind}` (expected one of beforeAll, afterAll, beforeEach, afterEach)")]
pub struct InvalidHookType {
    pub(crate) kind: String,
}

impl InvalidHookType {
    pub(crate) fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

/// A framework-level precondition or usage error (e.g. combining `only` and `skip` on the
/// same declaration chain, registering a `todo` test with a block body).
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct XJetError {
    pub(crate) message: String,
}

impl XJetError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A test or hook exceeded its allotted time budget.
#[derive(Clone, Debug, Error)]
#[error("timed out after {delay_ms}ms while running `{at}`")]
pub struct TimeoutError {
    pub(crate) delay_ms: u64,
    pub(crate) at: String,
    pub(crate) location: Option<SourceLocation>,
}

impl TimeoutError {
    pub(crate) fn new(delay_ms: u64, at: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self {
            delay_ms,
            at: at.into(),
            location,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn at(&self) -> &str {
        &self.at
    }
}

/// A `test.failing` test unexpectedly passed.
#[derive(Clone, Debug, Error)]
#[error("test `{description}` was marked failing but passed")]
pub struct FailingError {
    pub(crate) description: String,
}

impl FailingError {
    pub(crate) fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A frame's header or payload could not be decoded.
#[derive(Clone, Debug, Error)]
pub struct WireProtocolError {
    pub(crate) reason: WireProtocolErrorReason,
}

#[derive(Clone, Debug)]
pub(crate) enum WireProtocolErrorReason {
    ShortHeader { got: usize, needed: usize },
    InvalidKind { byte: u8 },
    NonUtf8Id { field: &'static str },
    InvalidPayload { kind: FrameKind, message: String },
}

impl fmt::Display for WireProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            WireProtocolErrorReason::ShortHeader { got, needed } => write!(
                f,
                "malformed frame header: got {got} bytes, needed at least {needed}"
            ),
            WireProtocolErrorReason::InvalidKind { byte } => {
                write!(f, "malformed frame header: unknown kind byte {byte}")
            }
            WireProtocolErrorReason::NonUtf8Id { field } => {
                write!(f, "malformed frame header: `{field}` is not valid UTF-8")
            }
            WireProtocolErrorReason::InvalidPayload { kind, message } => {
                write!(f, "malformed {kind:?} payload: {message}")
            }
        }
    }
}

impl WireProtocolError {
    pub(crate) fn short_header(got: usize, needed: usize) -> Self {
        Self {
            reason: WireProtocolErrorReason::ShortHeader { got, needed },
        }
    }

    pub(crate) fn invalid_kind(byte: u8) -> Self {
        Self {
            reason: WireProtocolErrorReason::InvalidKind { byte },
        }
    }

    pub(crate) fn non_utf8_id(field: &'static str) -> Self {
        Self {
            reason: WireProtocolErrorReason::NonUtf8Id { field },
        }
    }

    pub(crate) fn invalid_payload(kind: FrameKind, message: impl Into<String>) -> Self {
        Self {
            reason: WireProtocolErrorReason::InvalidPayload {
                kind,
                message: message.into(),
            },
        }
    }
}

/// A location in original (source-mapped) source, used to annotate timeouts and stack frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub source: Utf8PathBuf,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

/// Any error raised by guest code, wrapped with a source-mapped, suite-relative stack.
///
/// This is the host-side wrapper described in the error pipeline: it never replaces the
/// original `name`/`message`, it only attaches the resolved stack. `AggregateError`-shaped
/// payloads (an error carrying a list of nested errors) are preserved as a list of
/// `VMRuntimeError`s under [`VMRuntimeError::aggregate`].
#[derive(Clone, Debug, Error)]
pub struct VMRuntimeError {
    pub(crate) name: String,
    pub(crate) message: String,
    pub(crate) stack: String,
    pub(crate) aggregate: Vec<VMRuntimeError>,
}

impl fmt::Display for VMRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.name, self.message)?;
        if !self.stack.is_empty() {
            use std::fmt::Write as _;
            write!(crate::indenter::indented(f), "{}", self.stack)?;
        }
        for nested in &self.aggregate {
            write!(crate::indenter::indented(f), "\ncaused by: {nested}")?;
        }
        Ok(())
    }
}

impl VMRuntimeError {
    pub(crate) fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: stack.into(),
            aggregate: Vec::new(),
        }
    }

    pub(crate) fn with_aggregate(mut self, aggregate: Vec<VMRuntimeError>) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn aggregate(&self) -> &[VMRuntimeError] {
        &self.aggregate
    }
}

/// A generic failure from user code that doesn't fit the other named kinds.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub(crate) message: String,
}

impl ExecutionError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A source-map service was asked to resolve a location it has no mapping for.
#[derive(Clone, Debug, Error)]
pub struct SourceMapError {
    pub(crate) reason: SourceMapErrorReason,
}

#[derive(Clone, Debug)]
pub(crate) enum SourceMapErrorReason {
    EmptyMappings,
    OutOfRange { line: u32, column: u32 },
}

impl fmt::Display for SourceMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            SourceMapErrorReason::EmptyMappings => {
                write!(f, "source map has no mappings")
            }
            SourceMapErrorReason::OutOfRange { line, column } => {
                write!(f, "no mapping covers bundled location {line}:{column}")
            }
        }
    }
}

impl SourceMapError {
    pub(crate) fn empty_mappings() -> Self {
        Self {
            reason: SourceMapErrorReason::EmptyMappings,
        }
    }

    pub(crate) fn out_of_range(line: u32, column: u32) -> Self {
        Self {
            reason: SourceMapErrorReason::OutOfRange { line, column },
        }
    }
}

/// A `spyOn`/mock-registry operation could not be performed.
#[derive(Clone, Debug, Error)]
pub struct MockError {
    pub(crate) reason: MockErrorReason,
}

#[derive(Clone, Debug)]
pub(crate) enum MockErrorReason {
    NotConfigurable { key: String },
    AlreadySpied { key: String },
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            MockErrorReason::NotConfigurable { key } => {
                write!(f, "`{key}` is not configurable and cannot be spied on")
            }
            MockErrorReason::AlreadySpied { key } => {
                write!(f, "`{key}` already has a live spy installed")
            }
        }
    }
}

impl MockError {
    pub(crate) fn not_configurable(key: impl Into<String>) -> Self {
        Self {
            reason: MockErrorReason::NotConfigurable { key: key.into() },
        }
    }

    pub(crate) fn already_spied(key: impl Into<String>) -> Self {
        Self {
            reason: MockErrorReason::AlreadySpied { key: key.into() },
        }
    }
}

/// The top-level error type returned at xjet-core's public API boundaries.
///
/// Each variant wraps one of the narrow structs above; matching is expected to be done via
/// `matches!` or the `From` impls rather than by constructing variants directly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum XJetCoreError {
    #[error(transparent)]
    Nesting(#[from] NestingError),
    #[error(transparent)]
    InvalidHookType(#[from] InvalidHookType),
    #[error(transparent)]
    Usage(#[from] XJetError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Failing(#[from] FailingError),
    #[error(transparent)]
    WireProtocol(#[from] WireProtocolError),
    #[error(transparent)]
    VMRuntime(#[from] VMRuntimeError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    SourceMap(#[from] SourceMapError),
    #[error(transparent)]
    Mock(#[from] MockError),
    #[error("signal handler setup failed")]
    SignalHandlerSetup(#[from] SignalHandlerSetupError),
}
