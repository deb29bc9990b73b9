// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Initializes xJet's own operational logging (§10.1).
//!
//! This is strictly the host's diagnostic channel — `tracing` spans and events emitted by
//! `Dispatcher`, the `Target`s, and `TaskQueue` as they move suites through a run. It is
//! distinct from the guest's intercepted `console.log` calls (§4.G "Log interception"), which
//! travel as `LOG` wire frames and are reported as structured data, never through `tracing`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a `tracing_subscriber::fmt` layer honoring `RUST_LOG`, falling back to `XJET_LOG`
/// when `RUST_LOG` isn't set, and finally to `info` for xjet-core's own spans.
///
/// Safe to call more than once per process; only the first call takes effect (later calls are
/// silently ignored, matching `tracing`'s own global-subscriber-once contract).
pub fn init() {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env("XJET_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_when_called_repeatedly() {
        init();
        init();
    }
}
