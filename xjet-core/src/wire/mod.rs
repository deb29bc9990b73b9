// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The fixed-header binary framing used on every host↔runner transport.

mod frame;
mod payload;

pub use frame::{Frame, FrameKind, RUNNER_ID_LEN, SUITE_ID_LEN};
pub use payload::{
    Action, ActionPayload, ErrorPayload, LogLevel, LogPayload, Location, SerializedError,
    StatusPayload, SuitePayload,
};
