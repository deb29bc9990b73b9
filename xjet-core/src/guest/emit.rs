// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The guest-side frame emitter: encodes §4.A frames and hands them to the host-supplied
//! `dispatch(bytes)` sink. Emission is fire-and-forget from the guest's point of view (§4.G).

use super::format::format_value;
use crate::wire::{
    Action, ActionPayload, ErrorPayload, Frame, FrameKind, LogLevel, LogPayload, Location,
    StatusPayload, SuitePayload,
};
use bytes::Bytes;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A guest-side sink for wire frames, bound to one suite/runner pair.
#[derive(Clone)]
pub struct EmitService {
    suite_id: String,
    runner_id: String,
    dispatch: Arc<dyn Fn(Bytes) + Send + Sync>,
}

impl EmitService {
    pub fn new(
        suite_id: impl Into<String>,
        runner_id: impl Into<String>,
        dispatch: Arc<dyn Fn(Bytes) + Send + Sync>,
    ) -> Self {
        Self {
            suite_id: suite_id.into(),
            runner_id: runner_id.into(),
            dispatch,
        }
    }

    fn emit(&self, kind: FrameKind, payload: &impl serde::Serialize) {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(_) => return,
        };
        if let Ok(frame) = Frame::new(kind, self.suite_id.clone(), self.runner_id.clone(), body) {
            (self.dispatch)(frame.encode());
        }
    }

    pub fn log(&self, payload: LogPayload) {
        self.emit(FrameKind::Log, &payload);
    }

    pub fn test(&self, payload: ActionPayload) {
        self.emit(FrameKind::Test, &payload);
    }

    pub fn describe(&self, payload: ActionPayload) {
        self.emit(FrameKind::Describe, &payload);
    }

    pub fn suite(&self, payload: SuitePayload) {
        self.emit(FrameKind::Suite, &payload);
    }

    pub fn error(&self, payload: ErrorPayload) {
        self.emit(FrameKind::Error, &payload);
    }

    pub fn status(&self, payload: StatusPayload) {
        self.emit(FrameKind::Status, &payload);
    }
}

tokio::task_local! {
    /// The ambient describe/test context a running block's [`log`] calls attribute their
    /// `LOG` frame to. Scoped around each hook/test invocation by the execution engine
    /// (§4.G); a `log` call outside any scope (nothing currently executing) is dropped.
    static LOG_SCOPE: LogScope;
}

#[derive(Clone)]
pub(crate) struct LogScope {
    context: Vec<String>,
    emit: EmitService,
}

impl LogScope {
    pub(crate) fn new(context: Vec<String>, emit: EmitService) -> Self {
        Self { context, emit }
    }
}

/// Runs `fut` with `scope` as the ambient [`log`] context. The execution engine wraps every
/// hook/test body in this before handing it to `tokio::spawn`, so `log` calls made anywhere in
/// that task — including from further spawned subtasks — resolve back to the right context.
pub(crate) fn with_log_scope<F>(scope: LogScope, fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    LOG_SCOPE.scope(scope, fut)
}

/// Guest-side `console.*` interception (§4.G): captures `level`, the describe/test context
/// currently executing, an optional call site, and pretty-formats `args` the way `formatValue`
/// does, then emits a `LOG` frame. Silently a no-op when called outside a running hook/test.
pub fn log(level: LogLevel, args: &[Value], location: Option<Location>) {
    let _ = LOG_SCOPE.try_with(|scope| {
        let description = args.iter().map(format_value).collect::<Vec<_>>().join(" ");
        scope.emit.log(LogPayload {
            level,
            context: scope.context.clone(),
            location,
            timestamp: chrono::Utc::now().to_rfc3339(),
            description,
        });
    });
}

/// `console.log(...args)`.
pub fn console_log(args: &[Value]) {
    log(LogLevel::Log, args, None);
}

/// `console.info(...args)`.
pub fn console_info(args: &[Value]) {
    log(LogLevel::Info, args, None);
}

/// `console.warn(...args)`.
pub fn console_warn(args: &[Value]) {
    log(LogLevel::Warn, args, None);
}

/// `console.error(...args)`.
pub fn console_error(args: &[Value]) {
    log(LogLevel::Error, args, None);
}

/// `console.debug(...args)`.
pub fn console_debug(args: &[Value]) {
    log(LogLevel::Debug, args, None);
}

/// Builds the `START`/`SKIP`/`TODO`/`SUCCESS`/`FAILURE` payload shared by `TEST` and `DESCRIBE`
/// frames.
pub fn action_payload(
    action: Action,
    description: impl Into<String>,
    ancestry: Vec<String>,
    duration: Option<u64>,
    errors: Option<Vec<crate::wire::SerializedError>>,
) -> ActionPayload {
    ActionPayload {
        action,
        description: description.into(),
        ancestry,
        duration,
        errors,
        location: None,
    }
}
