// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The orchestrator (§4.H): drives discovery, target selection, and execution, propagating a
//! non-zero exit on any suite-level failure and looping on file-change events in watch mode.
//!
//! Grounded on the teacher's top-level drive loop in `runner/dispatch.rs`, generalized from
//! "spawn one process per test binary" to "hand a bundle to a `Target`". File-glob discovery and
//! the transpiler are external collaborators (§1, §12): `SuiteDiscovery` is the seam this crate
//! exposes for them, not an implementation of globbing or transpilation itself.

use crate::config::HostConfig;
use crate::dispatcher::{Dispatcher, ReportEvent};
use crate::errors::{XJetCoreError, XJetError};
use crate::signal::{SignalEvent, SignalHandler, SignalHandlerKind};
use crate::targets::{ExternalTarget, LocalTarget, Runner, SuiteSource};
use camino::Utf8Path;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The external glob + transpile collaborator (§4.H steps 1–2): "discover spec files... transpile
/// each to `{code, sourceMap}`". Per-file mtime caching across watch iterations is this
/// collaborator's responsibility, not the orchestrator's.
pub trait SuiteDiscovery: Send + Sync {
    fn discover(&self) -> BoxFuture<'_, Result<Vec<SuiteSource>, XJetError>>;
}

/// Basenames the watch loop reacts to (§4.H step 4).
const WATCHABLE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mts", "cts", "mjs", "cjs"];

/// Whether a changed path's extension is one watch mode restarts a run for.
pub fn is_watchable_path(path: &Utf8Path) -> bool {
    path.extension().is_some_and(|ext| WATCHABLE_EXTENSIONS.contains(&ext))
}

enum RunnerTarget {
    Local(LocalTarget),
    External(ExternalTarget),
}

impl RunnerTarget {
    async fn init(&self) {
        match self {
            Self::Local(t) => t.init_target(),
            Self::External(t) => t.init_target().await,
        }
    }

    async fn execute(&self, suites: &[SuiteSource]) {
        match self {
            Self::Local(t) => t.execute_suites(suites).await,
            Self::External(t) => t.execute_suites(suites).await,
        }
    }

    async fn finish(&self) {
        if let Self::External(t) = self {
            t.finish().await;
        }
    }
}

/// Drives one xJet run end to end: discovery, target selection, dispatch, and (optionally) the
/// watch-mode re-run loop.
pub struct Orchestrator {
    config: HostConfig,
    discovery: Arc<dyn SuiteDiscovery>,
    runners: Vec<Arc<dyn Runner>>,
    dispatcher: Arc<Dispatcher>,
    failed: Arc<AtomicBool>,
    signal_kind: SignalHandlerKind,
}

impl Orchestrator {
    /// `runners` configures target selection (§4.H step 3): empty selects [`LocalTarget`],
    /// non-empty selects [`ExternalTarget`] over all of them. `reporter` receives every
    /// [`ReportEvent`] the dispatcher produces; the orchestrator wraps it to additionally track
    /// whether any suite-level failure occurred, for the exit code in step 5.
    pub fn new(
        config: HostConfig,
        discovery: Arc<dyn SuiteDiscovery>,
        runners: Vec<Arc<dyn Runner>>,
        reporter: Arc<dyn Fn(ReportEvent) + Send + Sync>,
        signal_kind: SignalHandlerKind,
    ) -> Self {
        let failed = Arc::new(AtomicBool::new(false));
        let failed_for_sink = Arc::clone(&failed);
        let sink: Arc<dyn Fn(ReportEvent) + Send + Sync> = Arc::new(move |event: ReportEvent| {
            let is_failure = match &event {
                ReportEvent::Suite { error: Some(_), .. } | ReportEvent::Error { .. } => true,
                ReportEvent::Test { payload, .. } | ReportEvent::Describe { payload, .. } => {
                    payload.action == crate::wire::Action::Failure
                }
                _ => false,
            };
            if is_failure {
                failed_for_sink.store(true, Ordering::SeqCst);
            }
            reporter(event);
        });
        Self {
            config,
            discovery,
            runners,
            dispatcher: Arc::new(Dispatcher::new(sink)),
            failed,
            signal_kind,
        }
    }

    /// The dispatcher backing this run, for callers that need to register suites or runners
    /// directly (tests, mainly — production callers go through `run`/`run_watch`).
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn build_target(&self) -> Result<RunnerTarget, XJetCoreError> {
        if self.runners.is_empty() {
            let target = LocalTarget::new(self.config.clone(), Arc::clone(&self.dispatcher))
                .map_err(|err| XJetError::new(err.to_string()))?;
            Ok(RunnerTarget::Local(target))
        } else {
            let target = ExternalTarget::new(self.config.clone(), Arc::clone(&self.dispatcher), self.runners.clone())
                .map_err(|err| XJetError::new(err.to_string()))?;
            Ok(RunnerTarget::External(target))
        }
    }

    async fn execute_once(&self) -> Result<i32, XJetCoreError> {
        self.failed.store(false, Ordering::SeqCst);
        let suites = self.discovery.discover().await?;
        let target = self.build_target()?;
        target.init().await;
        target.execute(&suites).await;
        target.finish().await;
        Ok(if self.failed.load(Ordering::SeqCst) { 1 } else { 0 })
    }

    /// Runs discovery through execution once, returning the process exit code a non-watch
    /// invocation should propagate (§4.H step 5: "non-zero exit on any suite-level failure").
    /// A shutdown signal arriving mid-run aborts it and reports failure.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<i32, XJetCoreError> {
        let mut signals = self.signal_kind.build()?;
        tokio::select! {
            result = self.execute_once() => result,
            () = wait_for_shutdown(&mut signals) => {
                tracing::info!("shutdown signal received, aborting run");
                Ok(1)
            }
        }
    }

    /// Watch mode (§4.H step 4): runs once, then re-runs each time `changes` yields a path whose
    /// extension is in the watchable set, until the stream ends or a shutdown signal arrives.
    pub async fn run_watch<C>(&self, mut changes: C) -> Result<(), XJetCoreError>
    where
        C: futures::Stream<Item = camino::Utf8PathBuf> + Unpin,
    {
        use futures::StreamExt;

        let mut signals = self.signal_kind.build()?;
        loop {
            tokio::select! {
                _ = self.execute_once() => {}
                () = wait_for_shutdown(&mut signals) => return Ok(()),
            }
            loop {
                tokio::select! {
                    changed = changes.next() => match changed {
                        Some(path) if is_watchable_path(&path) => break,
                        Some(_) => continue,
                        None => return Ok(()),
                    },
                    () = wait_for_shutdown(&mut signals) => return Ok(()),
                }
            }
        }
    }
}

/// Resolves once a signal that should end the run arrives; never resolves for job-control or
/// info-query signals, and never resolves at all under [`SignalHandlerKind::Noop`].
async fn wait_for_shutdown(signals: &mut SignalHandler) {
    while let Some(event) = signals.recv().await {
        if matches!(event, SignalEvent::Shutdown(_)) {
            return;
        }
    }
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::dsl::Guest;
    use crate::guest::suite::Block;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct StaticDiscovery(Vec<SuiteSource>);

    impl SuiteDiscovery for StaticDiscovery {
        fn discover(&self) -> BoxFuture<'_, Result<Vec<SuiteSource>, XJetError>> {
            Box::pin(async { Ok(self.0.clone()) })
        }
    }

    fn passing_suite() -> SuiteSource {
        let program: Arc<dyn Fn(&Guest) + Send + Sync> = Arc::new(|guest: &Guest| {
            guest.test("passes", Block::run(|| async { Ok(()) }), None).unwrap();
        });
        SuiteSource {
            relative_path: "suite.ts".into(),
            code: Bytes::new(),
            source_map_json: br#"{"version":3,"sources":[],"names":[],"mappings":""}"#[..].into(),
            program: Some(program),
        }
    }

    fn failing_suite() -> SuiteSource {
        let program: Arc<dyn Fn(&Guest) + Send + Sync> = Arc::new(|guest: &Guest| {
            guest
                .test(
                    "fails",
                    Block::run(|| async { Err(crate::guest::GuestError::new("Error", "boom")) }),
                    None,
                )
                .unwrap();
        });
        SuiteSource {
            relative_path: "suite.ts".into(),
            code: Bytes::new(),
            source_map_json: br#"{"version":3,"sources":[],"names":[],"mappings":""}"#[..].into(),
            program: Some(program),
        }
    }

    #[tokio::test]
    async fn a_clean_run_exits_zero() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let orchestrator = Orchestrator::new(
            HostConfig::default(),
            Arc::new(StaticDiscovery(vec![passing_suite()])),
            Vec::new(),
            Arc::new(move |e| sink_events.lock().unwrap().push(e)),
            SignalHandlerKind::Noop,
        );
        assert_eq!(orchestrator.run().await.unwrap(), 0);
        assert!(!events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_failing_suite_exits_nonzero() {
        let orchestrator = Orchestrator::new(
            HostConfig::default(),
            Arc::new(StaticDiscovery(vec![failing_suite()])),
            Vec::new(),
            Arc::new(|_| {}),
            SignalHandlerKind::Noop,
        );
        assert_eq!(orchestrator.run().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn a_fresh_run_does_not_inherit_the_previous_runs_failure() {
        let orchestrator = Orchestrator::new(
            HostConfig::default(),
            Arc::new(StaticDiscovery(vec![passing_suite()])),
            Vec::new(),
            Arc::new(|_| {}),
            SignalHandlerKind::Noop,
        );
        // A prior failed run (simulated directly) must not leak into a later clean run's result.
        orchestrator.failed.store(true, Ordering::SeqCst);
        assert_eq!(orchestrator.run().await.unwrap(), 0);
    }

    #[test]
    fn watchable_extensions_match_the_configured_set() {
        assert!(is_watchable_path(Utf8Path::new("a/b.test.ts")));
        assert!(is_watchable_path(Utf8Path::new("a/b.mjs")));
        assert!(!is_watchable_path(Utf8Path::new("a/b.json")));
        assert!(!is_watchable_path(Utf8Path::new("a/b")));
    }
}
