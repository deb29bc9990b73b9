// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution engine: walks a registered [`SuiteState`] depth-first, running hooks and
//! tests in the order §4.G describes and emitting the corresponding wire frames.
//!
//! Generalized from the `rspec`-family runner visitor in the example pack (`wrap_all`/
//! `wrap_each` around a describe/context/example tree) to xJet's async, timeout-racing,
//! only/skip-aware model.

use super::emit::{action_payload, with_log_scope, EmitService, LogScope};
use super::suite::{Block, DescribeNode, Flags, HookNode, Hooks, SuiteState, TestNode};
use super::GuestError;
use crate::errors::TimeoutError;
use crate::test_filter::TestFilter;
use crate::wire::{Action, SerializedError, SuitePayload};
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Duration;

/// Context threaded through one suite's execution.
pub struct RunCtx<'a> {
    pub emit: &'a EmitService,
    pub only_mode: bool,
    pub randomize: bool,
    /// Seed for the per-describe shuffle when `randomize` is set; derived once per suite so a
    /// run is reproducible given the same seed, while each describe still shuffles differently
    /// (mixed with a hash of its ancestry path).
    pub seed: u64,
    /// Compiled `filter` value; a non-matching test is reported `SKIP` the same as an explicit
    /// `test.skip`.
    pub filter: TestFilter,
}

/// Races `block` against a `delay_ms` timer without cancelling it on expiry.
///
/// The spawned task keeps running after a timeout fires (§5: "the in-flight task is NOT
/// interrupted... user code may continue to run and produce late side effects which are
/// ignored") — we simply stop awaiting it and let it run to completion (or forever) detached.
pub async fn with_timeout(
    block: &Block,
    delay_ms: u64,
    at: impl Into<String>,
    log_scope: LogScope,
) -> Result<Result<(), GuestError>, TimeoutError> {
    let handle = tokio::spawn(with_log_scope(log_scope, block.invoke()));
    match tokio::time::timeout(Duration::from_millis(delay_ms), handle).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(_join_error)) => Ok(Err(GuestError::new("Error", "task panicked before completing"))),
        Err(_elapsed) => Err(TimeoutError::new(delay_ms, at.into(), None)),
    }
}

fn timeout_to_guest_error(err: TimeoutError) -> GuestError {
    GuestError::new("TimeoutError", err.to_string())
}

/// Runs a fully-registered suite to completion, emitting every `LOG`/`TEST`/`DESCRIBE` frame
/// along the way, and finally the terminal `SUITE` frame (§8 testable property 5).
pub async fn run_suite(state: &SuiteState, ctx: &RunCtx<'_>) {
    run_level(
        state.top_hooks(),
        state.top_tests(),
        state.top_describes(),
        &[],
        &[],
        false,
        state.only_mode(),
        ctx,
    )
    .await;
    ctx.emit.suite(SuitePayload { error: None });
}

/// Runs one describe level (or the implicit root, when `hooks`/`tests`/`nested` come from the
/// top of a [`SuiteState`]), returning the errors that should make an enclosing describe-level
/// frame report `FAILURE` (this level's own `afterAll` errors, plus anything inherited).
fn run_level<'a>(
    hooks: &'a Hooks,
    tests: &'a [TestNode],
    nested: &'a [DescribeNode],
    ancestor_hooks: &[&'a Hooks],
    level_path: &[String],
    inherited_skip: bool,
    inherited_only: bool,
    ctx: &'a RunCtx<'a>,
) -> BoxFuture<'a, Vec<GuestError>> {
    Box::pin(async move {
        // Step 1: beforeAll. Failures are captured but do not short-circuit (§4.G step 1,
        // decided in DESIGN.md's Open Question #4).
        let mut before_all_errors = Vec::new();
        for hook in &hooks.before_all {
            let scope = LogScope::new(hook_log_context(level_path, "beforeAll"), ctx.emit.clone());
            record_hook_failure(&mut before_all_errors, hook, "beforeAll", scope).await;
        }

        let mut ancestors_with_self = ancestor_hooks.to_vec();
        ancestors_with_self.push(hooks);

        // Step 2: tests, optionally shuffled.
        let mut order: Vec<&TestNode> = tests.iter().collect();
        if ctx.randomize {
            let seed = ctx.seed ^ ancestry_hash(tests);
            let mut rng = StdRng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }
        for test in order {
            run_test(
                test,
                ancestor_hooks,
                hooks,
                inherited_skip,
                inherited_only,
                &before_all_errors,
                ctx,
            )
            .await;
        }

        // Step 3: nested describes, in insertion order (not shuffled — only tests are).
        for describe in nested {
            run_describe(describe, &ancestors_with_self, inherited_skip, inherited_only, ctx).await;
        }

        // Step 4: afterAll.
        let mut after_all_errors = Vec::new();
        for hook in &hooks.after_all {
            let scope = LogScope::new(hook_log_context(level_path, "afterAll"), ctx.emit.clone());
            record_hook_failure(&mut after_all_errors, hook, "afterAll", scope).await;
        }

        before_all_errors.into_iter().chain(after_all_errors).collect()
    })
}

async fn record_hook_failure(
    errors: &mut Vec<GuestError>,
    hook: &HookNode,
    at: &'static str,
    log_scope: LogScope,
) {
    match with_timeout(&hook.block, hook.timeout_ms, at, log_scope).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => errors.push(e),
        Err(timeout) => errors.push(timeout_to_guest_error(timeout)),
    }
}

/// `level_path` is this describe's ancestry plus its own description (empty for the suite's
/// implicit root); hook log frames attribute to that path with the hook's name appended.
fn hook_log_context(level_path: &[String], label: &'static str) -> Vec<String> {
    let mut context = level_path.to_vec();
    context.push(label.to_string());
    context
}

async fn run_describe<'a>(
    describe: &'a DescribeNode,
    ancestor_hooks: &[&'a Hooks],
    inherited_skip: bool,
    inherited_only: bool,
    ctx: &'a RunCtx<'a>,
) {
    let effective_skip = inherited_skip || describe.flags.skip;
    let effective_only = inherited_only || describe.flags.only;
    let mut level_path = describe.ancestry.clone();
    level_path.push(describe.description.clone());
    let errors = run_level(
        &describe.hooks,
        &describe.tests,
        &describe.describes,
        ancestor_hooks,
        &level_path,
        effective_skip,
        effective_only,
        ctx,
    )
    .await;
    let action = if errors.is_empty() { Action::Success } else { Action::Failure };
    let serialized: Vec<SerializedError> = errors.into_iter().map(Into::into).collect();
    ctx.emit.describe(action_payload(
        action,
        describe.description.clone(),
        describe.ancestry.clone(),
        None,
        if serialized.is_empty() { None } else { Some(serialized) },
    ));
}

#[allow(clippy::too_many_arguments)]
async fn run_test<'a>(
    test: &'a TestNode,
    ancestor_hooks: &[&'a Hooks],
    own_hooks: &'a Hooks,
    inherited_skip: bool,
    inherited_only: bool,
    before_all_errors: &[GuestError],
    ctx: &RunCtx<'_>,
) {
    let effective_skip = inherited_skip || test.flags.skip || !ctx.filter.filter_match(&test.full_path()).is_match();
    let selected_for_only = !ctx.only_mode || inherited_only || test.flags.only;

    if effective_skip || !selected_for_only {
        ctx.emit.test(action_payload(
            Action::Skip,
            test.description.clone(),
            test.ancestry.clone(),
            None,
            None,
        ));
        return;
    }
    if test.todo {
        ctx.emit.test(action_payload(
            Action::Todo,
            test.description.clone(),
            test.ancestry.clone(),
            None,
            None,
        ));
        return;
    }

    ctx.emit.test(action_payload(
        Action::Start,
        test.description.clone(),
        test.ancestry.clone(),
        None,
        None,
    ));
    let stopwatch = crate::time::stopwatch();

    let mut test_context = test.ancestry.clone();
    test_context.push(test.description.clone());

    let mut hook_errors: Vec<GuestError> = before_all_errors.to_vec();
    for hook in ancestor_hooks.iter().flat_map(|h| h.before_each.iter()).chain(own_hooks.before_each.iter()) {
        let scope = LogScope::new(hook_log_context(&test_context, "beforeEach"), ctx.emit.clone());
        record_hook_failure(&mut hook_errors, hook, "beforeEach", scope).await;
    }

    let block_error = match &test.block {
        Some(block) => {
            let scope = LogScope::new(test_context.clone(), ctx.emit.clone());
            match with_timeout(block, test.timeout_ms, test.description.clone(), scope).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(timeout) => Some(GuestError::new("TimeoutError", timeout.to_string())),
            }
        }
        None => None,
    };

    for hook in own_hooks
        .after_each
        .iter()
        .chain(ancestor_hooks.iter().rev().flat_map(|h| h.after_each.iter()))
    {
        let scope = LogScope::new(hook_log_context(&test_context, "afterEach"), ctx.emit.clone());
        record_hook_failure(&mut hook_errors, hook, "afterEach", scope).await;
    }

    let mut errors = hook_errors;
    if test.failing {
        if block_error.is_none() {
            errors.push(GuestError::new(
                "FailingError",
                format!("test `{}` was marked failing but passed", test.description),
            ));
        }
        // else: block threw as expected — swallow it, test is reported SUCCESS.
    } else if let Some(e) = block_error {
        errors.push(e);
    }

    let duration = stopwatch.snapshot().elapsed.as_millis() as u64;
    let action = if errors.is_empty() { Action::Success } else { Action::Failure };
    let serialized: Vec<SerializedError> = errors.into_iter().map(Into::into).collect();
    ctx.emit.test(action_payload(
        action,
        test.description.clone(),
        test.ancestry.clone(),
        Some(duration),
        if serialized.is_empty() { None } else { Some(serialized) },
    ));
}

fn ancestry_hash(tests: &[TestNode]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for test in tests {
        test.description.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::dsl::Guest;
    use crate::wire::{Frame, FrameKind};
    use std::sync::{Arc, Mutex};

    fn harness() -> (Arc<Mutex<Vec<Frame>>>, EmitService) {
        let frames: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let emit = EmitService::new(
            "suite0000000",
            "runner000000",
            Arc::new(move |bytes| sink.lock().unwrap().push(Frame::decode(&bytes).unwrap())),
        );
        (frames, emit)
    }

    fn ok_block() -> Block {
        Block::run(|| async { Ok(()) })
    }

    fn throwing_block() -> Block {
        Block::run(|| async { Err(GuestError::new("Error", "boom")) })
    }

    #[tokio::test]
    async fn only_mode_skips_non_lineage_tests() {
        let guest = Guest::new();
        guest
            .describe("S", |g| {
                g.test_builder().only().call("a", ok_block(), None).unwrap();
                g.test("b", ok_block(), None).unwrap();
            })
            .unwrap();
        guest.test("c", ok_block(), None).unwrap();
        let state = guest.into_suite_state();

        let (frames, emit) = harness();
        let ctx = RunCtx {
            emit: &emit,
            only_mode: state.only_mode(),
            randomize: false,
            seed: 0,
            filter: TestFilter::all(),
        };
        run_suite(&state, &ctx).await;

        let test_frames: Vec<_> = frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.kind == FrameKind::Test)
            .map(|f| serde_json::from_slice::<crate::wire::ActionPayload>(&f.payload).unwrap())
            .collect();
        let by_desc = |d: &str| {
            test_frames
                .iter()
                .filter(|p| p.description == d)
                .map(|p| p.action)
                .collect::<Vec<_>>()
        };
        assert_eq!(by_desc("a"), vec![Action::Start, Action::Success]);
        assert_eq!(by_desc("b"), vec![Action::Skip]);
        assert_eq!(by_desc("c"), vec![Action::Skip]);
    }

    #[tokio::test]
    async fn failing_test_that_throws_reports_success() {
        let guest = Guest::new();
        guest.test_builder().failing().call("f", throwing_block(), None).unwrap();
        let state = guest.into_suite_state();
        let (frames, emit) = harness();
        let ctx = RunCtx {
            emit: &emit,
            only_mode: false,
            randomize: false,
            seed: 0,
            filter: TestFilter::all(),
        };
        run_suite(&state, &ctx).await;
        let actions: Vec<_> = frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.kind == FrameKind::Test)
            .map(|f| serde_json::from_slice::<crate::wire::ActionPayload>(&f.payload).unwrap().action)
            .collect();
        assert_eq!(actions, vec![Action::Start, Action::Success]);
    }

    #[tokio::test]
    async fn failing_test_that_passes_reports_failure() {
        let guest = Guest::new();
        guest.test_builder().failing().call("f", ok_block(), None).unwrap();
        let state = guest.into_suite_state();
        let (frames, emit) = harness();
        let ctx = RunCtx {
            emit: &emit,
            only_mode: false,
            randomize: false,
            seed: 0,
            filter: TestFilter::all(),
        };
        run_suite(&state, &ctx).await;
        let payloads: Vec<_> = frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.kind == FrameKind::Test)
            .map(|f| serde_json::from_slice::<crate::wire::ActionPayload>(&f.payload).unwrap())
            .collect();
        assert_eq!(payloads[1].action, Action::Failure);
        assert!(payloads[1].errors.as_ref().unwrap()[0].name == "FailingError");
    }

    #[tokio::test]
    async fn timeout_reports_failure_with_delay() {
        let guest = Guest::new();
        let block = Block::run(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });
        guest.test("t", block, Some(50)).unwrap();
        let state = guest.into_suite_state();
        let (frames, emit) = harness();
        let ctx = RunCtx {
            emit: &emit,
            only_mode: false,
            randomize: false,
            seed: 0,
            filter: TestFilter::all(),
        };
        run_suite(&state, &ctx).await;
        let payloads: Vec<_> = frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.kind == FrameKind::Test)
            .map(|f| serde_json::from_slice::<crate::wire::ActionPayload>(&f.payload).unwrap())
            .collect();
        assert_eq!(payloads[1].action, Action::Failure);
        assert!(payloads[1].duration.unwrap() >= 50);
        assert!(payloads[1].errors.as_ref().unwrap()[0].name == "TimeoutError");
    }

    #[tokio::test]
    async fn suite_frame_is_emitted_exactly_once_and_last() {
        let guest = Guest::new();
        guest.test("a", ok_block(), None).unwrap();
        let state = guest.into_suite_state();
        let (frames, emit) = harness();
        let ctx = RunCtx {
            emit: &emit,
            only_mode: false,
            randomize: false,
            seed: 0,
            filter: TestFilter::all(),
        };
        run_suite(&state, &ctx).await;
        let all = frames.lock().unwrap();
        assert_eq!(all.iter().filter(|f| f.kind == FrameKind::Suite).count(), 1);
        assert_eq!(all.last().unwrap().kind, FrameKind::Suite);
    }
}
