// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! §4.E.1: the local sandbox target, which runs each suite's linked-in registration closure
//! directly in this process rather than evaluating `code` inside a VM.

use super::{bail_aware_dispatch, generate_id, SuiteSource};
use crate::config::HostConfig;
use crate::dispatcher::Dispatcher;
use crate::guest::dsl::Guest;
use crate::guest::emit::EmitService;
use crate::guest::exec::{run_suite, RunCtx};
use crate::queue::TaskQueue;
use crate::test_filter::TestFilter;
use crate::wire::{ErrorPayload, SerializedError};
use std::sync::Arc;

/// Runs suite bundles in-process. Generates its own `runnerId` once at construction, then one
/// `suiteId` per file passed to [`execute_suites`](Self::execute_suites).
pub struct LocalTarget {
    runner_id: String,
    dispatcher: Arc<Dispatcher>,
    queue: Arc<TaskQueue<()>>,
    config: HostConfig,
    filter: TestFilter,
}

impl LocalTarget {
    pub fn new(
        config: HostConfig,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, xjet_filtering::FilterParseError> {
        let filter = TestFilter::from_config(&config)?;
        let queue = Arc::new(TaskQueue::new(config.max_concurrency()));
        Ok(Self {
            runner_id: generate_id('r'),
            dispatcher,
            queue,
            config,
            filter,
        })
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    /// Registers this target's single runner with the dispatcher (§4.E `initTarget()`).
    pub fn init_target(&self) {
        self.dispatcher.set_runner(self.runner_id.clone(), "local");
    }

    /// Dispatches every suite, returning once each has reached its terminal frame or been
    /// abandoned by a `bail`-triggered cancellation.
    #[tracing::instrument(skip(self, suites), fields(runner_id = %self.runner_id, suites = suites.len()))]
    pub async fn execute_suites(&self, suites: &[SuiteSource]) {
        let mut completions = Vec::with_capacity(suites.len());
        for suite in suites {
            let suite_id = generate_id('s');
            let source_map = super::load_or_empty_map(&suite.source_map_json, &suite.relative_path);
            let completion =
                self.dispatcher
                    .set_suite_source(suite_id.clone(), source_map, suite.relative_path.clone());
            completions.push(completion);

            let dispatch = bail_aware_dispatch(Arc::clone(&self.dispatcher), Arc::clone(&self.queue), self.config.bail);
            let program = suite.program.clone();
            let default_timeout_ms = self.config.timeout;
            let randomize = self.config.randomize;
            let filter = self.filter.clone();
            let runner_id = self.runner_id.clone();

            self.queue
                .enqueue(
                    Some(self.runner_id.clone()),
                    Box::pin(async move {
                        run_one_suite(suite_id, runner_id, program, default_timeout_ms, randomize, filter, dispatch).await;
                    }),
                )
                .await;
        }
        for completion in completions {
            let _ = completion.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one_suite(
    suite_id: String,
    runner_id: String,
    program: Option<Arc<dyn Fn(&Guest) + Send + Sync>>,
    default_timeout_ms: u64,
    randomize: bool,
    filter: TestFilter,
    dispatch: Arc<dyn Fn(bytes::Bytes) + Send + Sync>,
) {
    let emit = EmitService::new(suite_id, runner_id, dispatch);
    let Some(program) = program else {
        emit.error(ErrorPayload {
            error: SerializedError {
                name: "XJetError".into(),
                message: "suite has no locally-runnable program".into(),
                stack: String::new(),
                aggregate: Vec::new(),
                extra: Default::default(),
            },
        });
        return;
    };

    let guest = Guest::with_default_timeout_ms(default_timeout_ms);
    program(&guest);
    let state = guest.into_suite_state();
    let seed = rand::random();
    let ctx = RunCtx {
        emit: &emit,
        only_mode: state.only_mode(),
        randomize,
        seed,
        filter,
    };
    run_suite(&state, &ctx).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ReportEvent;
    use crate::guest::suite::Block;
    use std::sync::Mutex;

    fn suite_source(program: Option<Arc<dyn Fn(&Guest) + Send + Sync>>) -> SuiteSource {
        SuiteSource {
            relative_path: "suite.ts".into(),
            code: bytes::Bytes::new(),
            source_map_json: br#"{"version":3,"sources":[],"names":[],"mappings":""}"#[..].into(),
            program,
        }
    }

    #[tokio::test]
    async fn runs_a_locally_registered_suite_to_completion() {
        let events: Arc<Mutex<Vec<ReportEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(move |e| sink.lock().unwrap().push(e))));
        let target = LocalTarget::new(HostConfig::default(), Arc::clone(&dispatcher)).unwrap();
        target.init_target();

        let program: Arc<dyn Fn(&Guest) + Send + Sync> = Arc::new(|guest: &Guest| {
            guest.test("passes", Block::run(|| async { Ok(()) }), None).unwrap();
        });
        target.execute_suites(&[suite_source(Some(program))]).await;

        let suite_frames = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ReportEvent::Suite { .. }))
            .count();
        assert_eq!(suite_frames, 1);
    }

    #[tokio::test]
    async fn missing_program_emits_error_frame() {
        let events: Arc<Mutex<Vec<ReportEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(move |e| sink.lock().unwrap().push(e))));
        let target = LocalTarget::new(HostConfig::default(), Arc::clone(&dispatcher)).unwrap();
        target.init_target();
        target.execute_suites(&[suite_source(None)]).await;
        assert!(events.lock().unwrap().iter().any(|e| matches!(e, ReportEvent::Error { .. })));
    }
}
