// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The suite graph: `describe`/`test`/hook nodes and the registration-time cursor that builds
//! them (§3 "Suite graph").
//!
//! Modeled on the tree-shaped registration the teacher's `test_list.rs` builds up from listed
//! Rust test binaries, and on the describe/context/example visitor shape of the `rspec`-family
//! runner in the example pack — generalized here from "flat list discovered by introspection"
//! to "tree built incrementally by running registration callbacks depth-first".

use super::GuestError;
use crate::errors::{InvalidHookType, NestingError};
use futures::future::BoxFuture;
use std::sync::Arc;

/// A location in bundled (pre-source-map) source, as recorded at registration time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// The four closed hook kinds (§3 "Hook types are closed").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HookKind {
    BeforeAll,
    AfterAll,
    BeforeEach,
    AfterEach,
}

impl HookKind {
    pub fn parse(raw: &str) -> Result<Self, InvalidHookType> {
        match raw {
            "beforeAll" => Ok(Self::BeforeAll),
            "afterAll" => Ok(Self::AfterAll),
            "beforeEach" => Ok(Self::BeforeEach),
            "afterEach" => Ok(Self::AfterEach),
            other => Err(InvalidHookType::new(other)),
        }
    }
}

/// A registered test or hook body. Async per §5's cooperative single-threaded model; the
/// "done-callback vs async block" distinction of §9 is realized as two explicit constructors
/// ([`Block::run`] for a plain async body, [`Block::callback`] for the `done(err?)` convention)
/// rather than runtime arity detection, which Rust closures don't support reflecting on.
#[derive(Clone)]
pub struct Block(Arc<dyn Fn() -> BoxFuture<'static, Result<(), GuestError>> + Send + Sync>);

impl Block {
    pub fn run<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), GuestError>> + Send + 'static,
    {
        Self(Arc::new(move || Box::pin(f())))
    }

    /// Adapts a `done`-style callback body: `f` receives a sender that completes the test, with
    /// `Err` on the error-first `done(err)` convention.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(tokio::sync::oneshot::Sender<Result<(), GuestError>>) + Send + Sync + 'static,
    {
        Self(Arc::new(move || {
            let (tx, rx) = tokio::sync::oneshot::channel();
            f(tx);
            Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| Err(GuestError::new("XJetError", "done() was never called")))
            })
        }))
    }

    pub fn invoke(&self) -> BoxFuture<'static, Result<(), GuestError>> {
        (self.0)()
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Block(..)")
    }
}

/// A registered `beforeAll`/`afterAll`/`beforeEach`/`afterEach` callback.
#[derive(Clone, Debug)]
pub struct HookNode {
    pub kind: HookKind,
    pub block: Block,
    pub timeout_ms: u64,
    pub location: Location,
}

/// Flags shared by describes and tests: `skip` and `only`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Flags {
    pub skip: bool,
    pub only: bool,
}

/// A registered `describe`'s ordered hook sequences.
#[derive(Clone, Debug, Default)]
pub struct Hooks {
    pub before_all: Vec<HookNode>,
    pub after_all: Vec<HookNode>,
    pub before_each: Vec<HookNode>,
    pub after_each: Vec<HookNode>,
}

impl Hooks {
    pub fn push(&mut self, hook: HookNode) {
        match hook.kind {
            HookKind::BeforeAll => self.before_all.push(hook),
            HookKind::AfterAll => self.after_all.push(hook),
            HookKind::BeforeEach => self.before_each.push(hook),
            HookKind::AfterEach => self.after_each.push(hook),
        }
    }
}

/// A registered `describe` block.
#[derive(Clone, Debug)]
pub struct DescribeNode {
    pub description: String,
    pub ancestry: Vec<String>,
    pub flags: Flags,
    pub hooks: Hooks,
    pub describes: Vec<DescribeNode>,
    pub tests: Vec<TestNode>,
}

impl DescribeNode {
    fn new(description: String, ancestry: Vec<String>, flags: Flags) -> Self {
        Self {
            description,
            ancestry,
            flags,
            hooks: Hooks::default(),
            describes: Vec::new(),
            tests: Vec::new(),
        }
    }

    /// The `::`-joined ancestry path, not including this node's own description — matches the
    /// invariant in §3 and §8.1 that `ancestry` excludes the node's own description.
    pub fn full_path(&self) -> String {
        full_path(&self.ancestry, &self.description)
    }
}

/// A registered `test`/`it` block.
#[derive(Clone, Debug)]
pub struct TestNode {
    pub description: String,
    pub ancestry: Vec<String>,
    pub flags: Flags,
    pub todo: bool,
    pub failing: bool,
    /// `None` for `test.todo`, which forbids a block body (§4.G).
    pub block: Option<Block>,
    pub timeout_ms: u64,
    pub location: Location,
}

impl TestNode {
    pub fn full_path(&self) -> String {
        full_path(&self.ancestry, &self.description)
    }
}

fn full_path(ancestry: &[String], description: &str) -> String {
    if ancestry.is_empty() {
        description.to_string()
    } else {
        format!("{}::{}", ancestry.join("::"), description)
    }
}

/// Process-singleton-per-guest execution/registration state (§3 "Execution state").
///
/// A fresh `SuiteState` is created before each bundle executes (§5 "Shared resources"); nothing
/// here is meant to outlive one suite's run.
#[derive(Debug, Default)]
pub struct SuiteState {
    top_describes: Vec<DescribeNode>,
    top_tests: Vec<TestNode>,
    top_hooks: Hooks,
    cursor: Vec<usize>,
    running_test: Option<String>,
    only_mode: bool,
}

impl SuiteState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only_mode(&self) -> bool {
        self.only_mode
    }

    pub fn running_test(&self) -> Option<&str> {
        self.running_test.as_deref()
    }

    pub fn top_describes(&self) -> &[DescribeNode] {
        &self.top_describes
    }

    pub fn top_tests(&self) -> &[TestNode] {
        &self.top_tests
    }

    pub fn top_hooks(&self) -> &Hooks {
        &self.top_hooks
    }

    /// Marks `description` as the currently-executing test, or clears it when `None`. Used by
    /// the execution engine (§4.G) to forbid registration mid-test (§3's `NestingError`).
    pub fn set_running_test(&mut self, description: Option<String>) {
        self.running_test = description;
    }

    fn check_not_running(&self, what: &'static str) -> Result<(), NestingError> {
        if let Some(running) = &self.running_test {
            return Err(NestingError::new(what, running.clone()));
        }
        Ok(())
    }

    fn current_mut(&mut self) -> Option<&mut DescribeNode> {
        let mut iter = self.cursor.iter();
        let &first = iter.next()?;
        let mut node = &mut self.top_describes[first];
        for &idx in iter {
            node = &mut node.describes[idx];
        }
        Some(node)
    }

    fn current(&self) -> Option<&DescribeNode> {
        let mut iter = self.cursor.iter();
        let &first = iter.next()?;
        let mut node = &self.top_describes[first];
        for &idx in iter {
            node = &node.describes[idx];
        }
        Some(node)
    }

    fn current_ancestry_and_description(&self) -> (Vec<String>, Option<String>) {
        match self.current() {
            Some(node) => {
                let mut ancestry = node.ancestry.clone();
                ancestry.push(node.description.clone());
                (ancestry, Some(node.description.clone()))
            }
            None => (Vec::new(), None),
        }
    }

    /// Pushes a new `describe` child under the cursor and moves the cursor into it. Callers
    /// must run the describe's registration closure, then call [`pop_describe`](Self::pop_describe).
    pub fn push_describe(
        &mut self,
        description: impl Into<String>,
        flags: Flags,
    ) -> Result<(), NestingError> {
        self.check_not_running("describe")?;
        let (ancestry, _) = self.current_ancestry_and_description();
        let node = DescribeNode::new(description.into(), ancestry, flags);
        if flags.only {
            self.only_mode = true;
        }
        match self.current_mut() {
            Some(parent) => {
                parent.describes.push(node);
                self.cursor.push(parent.describes.len() - 1);
            }
            None => {
                self.top_describes.push(node);
                self.cursor.push(self.top_describes.len() - 1);
            }
        }
        Ok(())
    }

    pub fn pop_describe(&mut self) {
        self.cursor.pop();
    }

    pub fn add_test(&mut self, mut test: TestNode) -> Result<(), NestingError> {
        self.check_not_running("test")?;
        let (ancestry, _) = self.current_ancestry_and_description();
        test.ancestry = ancestry;
        if test.flags.only {
            self.only_mode = true;
        }
        match self.current_mut() {
            Some(parent) => parent.tests.push(test),
            None => self.top_tests.push(test),
        }
        Ok(())
    }

    pub fn add_hook(&mut self, hook: HookNode) -> Result<(), NestingError> {
        self.check_not_running(hook_label(hook.kind))?;
        match self.current_mut() {
            Some(parent) => parent.hooks.push(hook),
            None => self.top_hooks.push(hook),
        }
        Ok(())
    }
}

fn hook_label(kind: HookKind) -> &'static str {
    match kind {
        HookKind::BeforeAll => "beforeAll",
        HookKind::AfterAll => "afterAll",
        HookKind::BeforeEach => "beforeEach",
        HookKind::AfterEach => "afterEach",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_block() -> Block {
        Block::run(|| async { Ok(()) })
    }

    #[test]
    fn ancestry_excludes_own_description() {
        let mut state = SuiteState::new();
        state.push_describe("outer", Flags::default()).unwrap();
        state.push_describe("inner", Flags::default()).unwrap();
        state
            .add_test(TestNode {
                description: "leaf".into(),
                ancestry: Vec::new(),
                flags: Flags::default(),
                todo: false,
                failing: false,
                block: Some(noop_block()),
                timeout_ms: 5000,
                location: Location::default(),
            })
            .unwrap();
        state.pop_describe();
        state.pop_describe();

        let outer = &state.top_describes()[0];
        assert_eq!(outer.ancestry, Vec::<String>::new());
        let inner = &outer.describes[0];
        assert_eq!(inner.ancestry, vec!["outer".to_string()]);
        let leaf = &inner.tests[0];
        assert_eq!(leaf.ancestry, vec!["outer".to_string(), "inner".to_string()]);
        assert_eq!(leaf.full_path(), "outer::inner::leaf");
    }

    #[test]
    fn only_sets_global_only_mode() {
        let mut state = SuiteState::new();
        state
            .add_test(TestNode {
                description: "a".into(),
                ancestry: Vec::new(),
                flags: Flags { only: true, skip: false },
                todo: false,
                failing: false,
                block: Some(noop_block()),
                timeout_ms: 5000,
                location: Location::default(),
            })
            .unwrap();
        assert!(state.only_mode());
    }

    #[test]
    fn registering_while_running_test_fails() {
        let mut state = SuiteState::new();
        state.set_running_test(Some("current".into()));
        let err = state.push_describe("nested", Flags::default()).unwrap_err();
        assert!(err.to_string().contains("current"));
    }

    #[test]
    fn invalid_hook_type_rejected() {
        assert!(HookKind::parse("beforeAll").is_ok());
        assert!(HookKind::parse("onMount").is_err());
    }
}
