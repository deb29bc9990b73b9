// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! §4.E.2: the external target, which hands bundles to user-supplied remote runners rather
//! than evaluating anything in this process.

use super::{bail_aware_dispatch, generate_id, SuiteSource};
use crate::config::{HostConfig, RuntimeContext};
use crate::dispatcher::Dispatcher;
use crate::queue::TaskQueue;
use crate::sourcemap::SourceMapService;
use crate::test_filter::TestFilter;
use crate::wire::{ErrorPayload, Frame, FrameKind, SerializedError};
use bytes::{BufMut, Bytes, BytesMut};
use futures::future::BoxFuture;
use std::sync::Arc;

/// A configuration-supplied remote runner (§6): `connection(receive)` wires up its inbound
/// transport once, `dispatch(bytes)` is its send function, `disconnect()` tears it down.
pub trait Runner: Send + Sync {
    fn name(&self) -> &str;

    /// Wires `receive` to this runner's inbound transport. Invoked once, at `init_target`.
    fn connection(&self, receive: Arc<dyn Fn(Bytes) + Send + Sync>) -> BoxFuture<'_, Result<(), crate::errors::XJetError>>;

    /// Sends one fully-assembled bundle (preamble + code) to this runner.
    fn dispatch(&self, bytes: Bytes) -> BoxFuture<'_, Result<(), crate::errors::XJetError>>;

    /// Closes and flushes this runner's transport.
    fn disconnect(&self) -> BoxFuture<'_, Result<(), crate::errors::XJetError>>;
}

struct RunnerHandle {
    id: String,
    runner: Arc<dyn Runner>,
}

/// Submits every suite to every configured runner (§4.E.2: "for every (runner × file) pair").
pub struct ExternalTarget {
    dispatcher: Arc<Dispatcher>,
    queue: Arc<TaskQueue<()>>,
    config: HostConfig,
    // Compiled only to validate `config.filter`'s syntax at construction time, matching §4.D's
    // "validate inputs at construction". Filtering itself happens guest-side: the raw
    // `config.filter` is forwarded through `RuntimeContext` and re-compiled there, since this
    // target never evaluates a test path locally to filter against.
    _filter: TestFilter,
    runners: Vec<RunnerHandle>,
}

impl ExternalTarget {
    pub fn new(
        config: HostConfig,
        dispatcher: Arc<Dispatcher>,
        runners: Vec<Arc<dyn Runner>>,
    ) -> Result<Self, xjet_filtering::FilterParseError> {
        let _filter = TestFilter::from_config(&config)?;
        let queue = Arc::new(TaskQueue::new(config.max_concurrency()));
        let runners = runners
            .into_iter()
            .map(|runner| RunnerHandle {
                id: generate_id('r'),
                runner,
            })
            .collect();
        Ok(Self {
            dispatcher,
            queue,
            config,
            _filter,
            runners,
        })
    }

    /// Registers each runner's name with the dispatcher and wires up its inbound transport.
    /// A runner whose `connection` rejects gets a target-fatal `ERROR` frame; the others still
    /// proceed (§4.E: "event stream that emits `error` frames for Target-fatal issues").
    pub async fn init_target(&self) {
        for handle in &self.runners {
            self.dispatcher.set_runner(handle.id.clone(), handle.runner.name());
            let receive = bail_aware_dispatch(Arc::clone(&self.dispatcher), Arc::clone(&self.queue), self.config.bail);
            if let Err(err) = handle.runner.connection(receive).await {
                emit_error_frame(&self.dispatcher, "", &handle.id, &err.to_string());
            }
        }
    }

    /// Dispatches every suite to every runner, returning once all of them have reached a
    /// terminal frame or been cancelled by a `bail`-triggered `remove_tasks_by_runner`.
    #[tracing::instrument(skip(self, suites), fields(runners = self.runners.len(), suites = suites.len()))]
    pub async fn execute_suites(&self, suites: &[SuiteSource]) {
        let mut completions = Vec::with_capacity(suites.len() * self.runners.len().max(1));
        for suite in suites {
            for handle in &self.runners {
                let suite_id = generate_id('s');
                let source_map = super::load_or_empty_map(&suite.source_map_json, &suite.relative_path);
                let completion = self.dispatcher.set_suite_source(
                    suite_id.clone(),
                    source_map,
                    suite.relative_path.clone(),
                );
                completions.push(completion);

                let runtime_ctx = RuntimeContext {
                    bail: self.config.bail,
                    filter: self.config.filter.clone(),
                    timeout: self.config.timeout,
                    randomize: self.config.randomize,
                    suite_id: suite_id.clone(),
                    runner_id: handle.id.clone(),
                    relative_path: suite.relative_path.clone(),
                };
                let bundle = prepend_runtime_context(&runtime_ctx, &suite.code);
                let runner = Arc::clone(&handle.runner);
                let runner_id = handle.id.clone();
                let dispatcher = Arc::clone(&self.dispatcher);
                let queue = Arc::clone(&self.queue);
                let bail = self.config.bail;

                self.queue
                    .enqueue(
                        Some(handle.id.clone()),
                        Box::pin(async move {
                            if let Err(err) = runner.dispatch(bundle).await {
                                emit_error_frame(&dispatcher, &suite_id, &runner_id, &err.to_string());
                                if bail {
                                    queue.remove_tasks_by_runner(&runner_id).await;
                                }
                            }
                        }),
                    )
                    .await;
            }
        }
        for completion in completions {
            let _ = completion.await;
        }
    }

    /// Awaits no further work and closes every runner's transport (§4.E.2 "Terminal").
    pub async fn finish(&self) {
        for handle in &self.runners {
            if let Err(err) = handle.runner.disconnect().await {
                tracing::warn!(%err, runner = handle.runner.name(), "runner disconnect failed");
            }
        }
    }
}

fn prepend_runtime_context(ctx: &RuntimeContext, code: &Bytes) -> Bytes {
    let json = serde_json::to_vec(ctx).unwrap_or_else(|_| b"{}".to_vec());
    let mut buf = BytesMut::with_capacity(json.len() + code.len() + 16);
    buf.put_slice(b"const __XJET = ");
    buf.put_slice(&json);
    buf.put_slice(b";\n");
    buf.put_slice(code);
    buf.freeze()
}

/// Builds and routes a synthetic `ERROR` frame through the dispatcher for a failure that
/// originates on the host side of the transport rather than from the guest (a rejected
/// `connection`/`dispatch`), so it still reaches the reporter through the ordinary path.
fn emit_error_frame(dispatcher: &Dispatcher, suite_id: &str, runner_id: &str, message: &str) {
    let payload = ErrorPayload {
        error: SerializedError {
            name: "XJetError".into(),
            message: message.into(),
            stack: String::new(),
            aggregate: Vec::new(),
            extra: Default::default(),
        },
    };
    let Ok(body) = serde_json::to_vec(&payload) else {
        return;
    };
    if let Ok(frame) = Frame::new(FrameKind::Error, suite_id, runner_id, body) {
        if let Err(err) = dispatcher.process_data(&frame.encode()) {
            tracing::warn!(%err, "failed to route target-fatal error frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ReportEvent;
    use std::sync::Mutex;

    struct FakeRunner {
        name: String,
        sent: Arc<Mutex<Vec<Bytes>>>,
        fail_dispatch: bool,
        receive: Mutex<Option<Arc<dyn Fn(Bytes) + Send + Sync>>>,
    }

    impl FakeRunner {
        fn new(name: &str, sent: Arc<Mutex<Vec<Bytes>>>, fail_dispatch: bool) -> Self {
            Self { name: name.into(), sent, fail_dispatch, receive: Mutex::new(None) }
        }
    }

    impl Runner for FakeRunner {
        fn name(&self) -> &str {
            &self.name
        }

        fn connection(&self, receive: Arc<dyn Fn(Bytes) + Send + Sync>) -> BoxFuture<'_, Result<(), crate::errors::XJetError>> {
            *self.receive.lock().unwrap() = Some(receive);
            Box::pin(async { Ok(()) })
        }

        // A real transport eventually streams the guest's frames back, ending in a terminal
        // `SUITE` frame; this fake simulates that synchronously so `execute_suites` doesn't wait
        // on a completion that nothing would ever signal.
        fn dispatch(&self, bytes: Bytes) -> BoxFuture<'_, Result<(), crate::errors::XJetError>> {
            Box::pin(async move {
                if self.fail_dispatch {
                    return Err(crate::errors::XJetError::new("transport closed"));
                }
                self.sent.lock().unwrap().push(bytes.clone());
                let ctx = parse_runtime_context(&bytes);
                let payload = serde_json::to_vec(&crate::wire::SuitePayload { error: None }).unwrap();
                let frame = Frame::new(FrameKind::Suite, ctx.suite_id, ctx.runner_id, payload).unwrap();
                if let Some(receive) = self.receive.lock().unwrap().clone() {
                    receive(frame.encode());
                }
                Ok(())
            })
        }

        fn disconnect(&self) -> BoxFuture<'_, Result<(), crate::errors::XJetError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn parse_runtime_context(bundle: &Bytes) -> RuntimeContext {
        let text = std::str::from_utf8(bundle).unwrap();
        let json_start = text.find("const __XJET = ").unwrap() + "const __XJET = ".len();
        let json_end = text[json_start..].find(";\n").unwrap() + json_start;
        serde_json::from_str(&text[json_start..json_end]).unwrap()
    }

    fn suite_source() -> SuiteSource {
        SuiteSource {
            relative_path: "suite.ts".into(),
            code: Bytes::from_static(b"/* bundle */"),
            source_map_json: br#"{"version":3,"sources":[],"names":[],"mappings":""}"#[..].into(),
            program: None,
        }
    }

    #[tokio::test]
    async fn sends_every_suite_to_every_runner() {
        let events: Arc<Mutex<Vec<ReportEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(move |e| sink.lock().unwrap().push(e))));

        let sent_a = Arc::new(Mutex::new(Vec::new()));
        let sent_b = Arc::new(Mutex::new(Vec::new()));
        let runners: Vec<Arc<dyn Runner>> = vec![
            Arc::new(FakeRunner::new("a", Arc::clone(&sent_a), false)),
            Arc::new(FakeRunner::new("b", Arc::clone(&sent_b), false)),
        ];
        let target = ExternalTarget::new(HostConfig::default(), Arc::clone(&dispatcher), runners).unwrap();
        target.init_target().await;
        target.execute_suites(&[suite_source()]).await;
        target.finish().await;

        assert_eq!(sent_a.lock().unwrap().len(), 1);
        assert_eq!(sent_b.lock().unwrap().len(), 1);
        assert!(sent_a.lock().unwrap()[0].starts_with(b"const __XJET = "));
    }

    #[tokio::test]
    async fn a_dispatch_failure_emits_a_target_error_frame() {
        let events: Arc<Mutex<Vec<ReportEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(move |e| sink.lock().unwrap().push(e))));
        let runners: Vec<Arc<dyn Runner>> =
            vec![Arc::new(FakeRunner::new("flaky", Arc::new(Mutex::new(Vec::new())), true))];
        let target = ExternalTarget::new(HostConfig::default(), Arc::clone(&dispatcher), runners).unwrap();
        target.init_target().await;
        target.execute_suites(&[suite_source()]).await;

        assert!(events.lock().unwrap().iter().any(|e| matches!(e, ReportEvent::Error { .. })));
    }
}
