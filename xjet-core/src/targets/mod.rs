// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runner targets (§4.E): the host-side adapters that submit bundles to a Runner and forward
//! its frames to the [`Dispatcher`](crate::dispatcher::Dispatcher).
//!
//! Both targets share one contract (`init_target`, `execute_suites`, each tagging its own
//! queued work with a `runnerId` for `bail`-triggered cancellation) but differ in what "run a
//! bundle" means: [`LocalTarget`] runs a linked-in registration closure directly; [`ExternalTarget`]
//! hands opaque bytes to an arbitrary transport.

mod external;
mod local;

pub use external::{ExternalTarget, Runner};
pub use local::LocalTarget;

use crate::guest::dsl::Guest;
use bytes::Bytes;
use std::sync::Arc;

/// One discovered-and-transpiled suite, as produced by the external transpile collaborator
/// (§1, §4.H step 2: "a service that returns, per input path, `{code, sourceMap}`").
///
/// In this Rust rewrite there is no VM to evaluate `code` inside, so a suite that can run in
/// this same process also carries `program`: a registration closure already linked into the
/// binary, standing in for "inject the preamble and evaluate the bundle". `code` remains
/// meaningful on its own for [`ExternalTarget`], which never evaluates anything locally.
#[derive(Clone)]
pub struct SuiteSource {
    pub relative_path: String,
    pub code: Bytes,
    pub source_map_json: Bytes,
    pub program: Option<Arc<dyn Fn(&Guest) + Send + Sync>>,
}

/// Width shared by both `suiteId` and `runnerId` header fields (§4.A).
const ID_LEN: usize = crate::wire::SUITE_ID_LEN;

/// Generates a short ASCII id fitting the wire header's 14-byte id fields, prefixed with a
/// human-legible tag (`s` for suites, `r` for runners) to ease reading raw frame dumps.
pub(crate) fn generate_id(prefix: char) -> String {
    let body = uuid::Uuid::new_v4().simple().to_string();
    std::iter::once(prefix).chain(body.chars()).take(ID_LEN).collect()
}

/// Parses a suite's source map, falling back to an empty (always-miss) map rather than failing
/// the whole suite — a bad source map degrades stack traces, it doesn't make the suite
/// unrunnable.
pub(crate) fn load_or_empty_map(raw: &[u8], relative_path: &str) -> crate::sourcemap::SourceMapService {
    crate::sourcemap::SourceMapService::new(raw, relative_path).unwrap_or_else(|err| {
        tracing::warn!(%err, suite = relative_path, "invalid source map, running without one");
        crate::sourcemap::SourceMapService::new(
            br#"{"version":3,"sources":[],"names":[],"mappings":""}"#,
            relative_path,
        )
        .expect("static empty source map is well-formed")
    })
}

/// Wraps the dispatcher's `process_data` into the plain synchronous `dispatch(bytes)` sink an
/// [`EmitService`](crate::guest::emit::EmitService) calls. When `bail` is set and the decoded
/// frame reports a failure, spawns the queue cancellation (§5: "the Target calls
/// `queue.removeTasksByRunner(runnerId)`") — `process_data` itself has no `.await` points, but
/// `remove_tasks_by_runner` does, so the cancellation is handed off rather than run inline.
pub(crate) fn bail_aware_dispatch(
    dispatcher: Arc<crate::dispatcher::Dispatcher>,
    queue: Arc<crate::queue::TaskQueue<()>>,
    bail: bool,
) -> Arc<dyn Fn(Bytes) + Send + Sync> {
    Arc::new(move |bytes| match dispatcher.process_data(&bytes) {
        Ok(signal) => {
            if bail && signal.is_failure {
                let queue = Arc::clone(&queue);
                let runner_id = signal.runner_id;
                tokio::spawn(async move {
                    queue.remove_tasks_by_runner(&runner_id).await;
                });
            }
        }
        Err(err) => {
            tracing::warn!(%err, "dropped malformed frame");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_fit_the_header_field_width() {
        let id = generate_id('s');
        assert_eq!(id.len(), ID_LEN);
        assert!(id.is_ascii());
        assert!(id.starts_with('s'));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_id('r'), generate_id('r'));
    }
}
