// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock/spy state (§4.I): call recording, `mockImplementationOnce`'s LIFO stack, and
//! process-global restore.
//!
//! JS's `spyOn(target, key)` redefines an arbitrary object property at runtime; Rust has no
//! generic reflection over "the live implementation behind this call site" to hook the same
//! way. A call site that wants to be spyable instead exposes a [`SpySlot`] — an indirection cell
//! holding the current `Arc<dyn Fn>` — and [`spy_on`] swaps a wrapping [`MockFn`] in behind it,
//! keeping the original so `mockRestore` can put it back. The restore-on-unregister bookkeeping
//! here is grounded on the `MockGuard`-style pattern of reversing installs in the order they were
//! made, the same shape a test harness elsewhere in the corpus uses to tear down dynamic routes.

use crate::errors::MockError;
use crate::guest::GuestError;
use std::sync::{Arc, Mutex, OnceLock};

/// What calling a mock produces: either a return value or a thrown [`GuestError`], mirroring a
/// test/hook block's own outcome shape.
pub type Outcome<Out> = Result<Out, GuestError>;

type ImplFn<Args, Out> = Arc<dyn Fn(&Args) -> Outcome<Out> + Send + Sync>;

struct MockState<Args, Out> {
    calls: Vec<Args>,
    results: Vec<Outcome<Out>>,
    default_impl: Option<ImplFn<Args, Out>>,
    once_impls: Vec<ImplFn<Args, Out>>,
    restore: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// `fn(impl?)` (§4.I): a callable whose invocations are recorded.
///
/// Cloning a `MockFn` clones the handle, not the state — every clone observes the same call
/// history and implementation stack, the way a `jest.fn()` reference shared across a test file
/// does.
pub struct MockFn<Args, Out> {
    inner: Arc<Mutex<MockState<Args, Out>>>,
}

impl<Args, Out> Clone for MockFn<Args, Out> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Args, Out> Default for MockFn<Args, Out>
where
    Args: Clone + Send + Sync + 'static,
    Out: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Args, Out> MockFn<Args, Out>
where
    Args: Clone + Send + Sync + 'static,
    Out: Clone + Send + Sync + 'static,
{
    /// Creates an unregistered mock with no recorded calls and no implementation. Calling it
    /// before an implementation is configured yields a thrown `GuestError`, the same as calling
    /// past every `mockImplementationOnce` with no default set.
    pub fn new() -> Self {
        let inner = Arc::new(Mutex::new(MockState {
            calls: Vec::new(),
            results: Vec::new(),
            default_impl: None,
            once_impls: Vec::new(),
            restore: None,
        }));
        let mock = Self { inner };
        mock.register();
        mock
    }

    /// Creates a mock pre-seeded with a default implementation, the `fn(impl)` shorthand.
    pub fn with_implementation(f: impl Fn(&Args) -> Outcome<Out> + Send + Sync + 'static) -> Self {
        let mock = Self::new();
        mock.mock_implementation(f);
        mock
    }

    fn register(&self) {
        let for_registry = self.clone();
        registry().lock().unwrap().push(Arc::new(move || for_registry.mock_restore()));
    }

    /// Records one invocation, consuming the next queued `mockImplementationOnce` (LIFO) before
    /// falling back to the default implementation (§4.I: "implementation stack (default impl +
    /// LIFO of `mockImplementationOnce`)").
    pub fn call(&self, args: Args) -> Outcome<Out> {
        let imp = {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(args.clone());
            state.once_impls.pop().or_else(|| state.default_impl.clone())
        };
        let result = match imp {
            Some(f) => f(&args),
            None => Err(GuestError::new("XJetError", "mock has no implementation configured")),
        };
        self.inner.lock().unwrap().results.push(result.clone());
        result
    }

    pub fn mock_implementation(&self, f: impl Fn(&Args) -> Outcome<Out> + Send + Sync + 'static) {
        self.inner.lock().unwrap().default_impl = Some(Arc::new(f));
    }

    pub fn mock_implementation_once(&self, f: impl Fn(&Args) -> Outcome<Out> + Send + Sync + 'static) {
        self.inner.lock().unwrap().once_impls.push(Arc::new(f));
    }

    pub fn mock_return_value(&self, value: Out) {
        self.mock_implementation(move |_| Ok(value.clone()));
    }

    pub fn mock_return_value_once(&self, value: Out) {
        self.mock_implementation_once(move |_| Ok(value.clone()));
    }

    /// Sugar for `mockImplementation` that always resolves; xjet-core has no separate promise
    /// type to model, so a "resolved value" is just a mock that always succeeds.
    pub fn mock_resolved_value(&self, value: Out) {
        self.mock_return_value(value);
    }

    pub fn mock_resolved_value_once(&self, value: Out) {
        self.mock_return_value_once(value);
    }

    pub fn mock_rejected_value(&self, err: GuestError) {
        self.mock_implementation(move |_| Err(err.clone()));
    }

    pub fn mock_rejected_value_once(&self, err: GuestError) {
        self.mock_implementation_once(move |_| Err(err.clone()));
    }

    /// `mock.calls`: every recorded call's arguments, oldest first.
    pub fn calls(&self) -> Vec<Args> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// `mock.results`: every recorded call's outcome, oldest first.
    pub fn results(&self) -> Vec<Outcome<Out>> {
        self.inner.lock().unwrap().results.clone()
    }

    /// `mockClear()`: drops call history, keeps implementations installed.
    pub fn mock_clear(&self) {
        let mut state = self.inner.lock().unwrap();
        state.calls.clear();
        state.results.clear();
    }

    /// `mockReset()`: `mockClear()` plus dropping every installed implementation.
    pub fn mock_reset(&self) {
        let mut state = self.inner.lock().unwrap();
        state.calls.clear();
        state.results.clear();
        state.default_impl = None;
        state.once_impls.clear();
    }

    /// `mockRestore()`: for a plain `fn()` mock this is `mockReset()`; for one created by
    /// [`spy_on`] it additionally swaps the original implementation back into the [`SpySlot`]
    /// it was installed over.
    pub fn mock_restore(&self) {
        let restore = self.inner.lock().unwrap().restore.take();
        if let Some(restore) = restore {
            restore();
        }
        self.mock_reset();
    }

    fn set_restore_hook(&self, hook: Arc<dyn Fn() + Send + Sync>) {
        self.inner.lock().unwrap().restore = Some(hook);
    }

    fn as_impl_fn(&self) -> ImplFn<Args, Out> {
        let mock = self.clone();
        Arc::new(move |args: &Args| mock.call(args.clone()))
    }
}

/// The indirection point a call site exposes so it can be spied on (§4.I `spyOn`'s Rust
/// realization, since there is no object/property reflection to redefine here).
///
/// Whoever owns the call site constructs one `SpySlot` per spyable function and routes calls
/// through [`SpySlot::call`] instead of invoking the function directly.
pub struct SpySlot<Args, Out> {
    key: String,
    current: Mutex<ImplFn<Args, Out>>,
    spied: std::sync::atomic::AtomicBool,
}

impl<Args, Out> SpySlot<Args, Out>
where
    Args: 'static,
    Out: 'static,
{
    pub fn new(key: impl Into<String>, initial: impl Fn(&Args) -> Outcome<Out> + Send + Sync + 'static) -> Self {
        Self {
            key: key.into(),
            current: Mutex::new(Arc::new(initial)),
            spied: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Invokes whatever implementation is currently installed — the original, or a spy's mock.
    pub fn call(&self, args: &Args) -> Outcome<Out> {
        let imp = self.current.lock().unwrap().clone();
        imp(args)
    }

    fn swap(&self, new_impl: ImplFn<Args, Out>) -> ImplFn<Args, Out> {
        std::mem::replace(&mut self.current.lock().unwrap(), new_impl)
    }
}

/// `spyOn(target, key)` (§4.I): wraps the slot's current implementation in a [`MockFn`] that
/// defaults to calling through to it, recording every call. Rejects a slot that already has a
/// live spy installed (§4.I: "Reject ... non-configurable getters" — the nearest Rust analogue
/// of "already spied" is a slot that is already wrapped).
///
/// The spec's constructor/`prototype`-forwarding case has no meaning for a plain Rust function
/// pointer and is not modeled here.
pub fn spy_on<Args, Out>(slot: &'static SpySlot<Args, Out>) -> Result<MockFn<Args, Out>, MockError>
where
    Args: Clone + Send + Sync + 'static,
    Out: Clone + Send + Sync + 'static,
{
    if slot.spied.swap(true, std::sync::atomic::Ordering::SeqCst) {
        return Err(MockError::already_spied(slot.key.clone()));
    }

    let mock = MockFn::new();
    let installed = mock.as_impl_fn();
    let original = slot.swap(installed);

    {
        let original = Arc::clone(&original);
        mock.mock_implementation(move |args| original(args));
    }
    mock.set_restore_hook(Arc::new(move || {
        slot.swap(Arc::clone(&original));
        slot.spied.store(false, std::sync::atomic::Ordering::SeqCst);
    }));
    Ok(mock)
}

fn registry() -> &'static Mutex<Vec<Arc<dyn Fn() + Send + Sync>>> {
    static REGISTRY: OnceLock<Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// `restoreAllMocks()` (§4.I, §3 "Mock registry"): restores every live mock, most-recently
/// registered first.
pub fn restore_all_mocks() {
    let thunks: Vec<_> = std::mem::take(&mut *registry().lock().unwrap());
    for thunk in thunks.into_iter().rev() {
        thunk();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_and_results() {
        let mock: MockFn<i32, i32> = MockFn::with_implementation(|n| Ok(n * 2));
        assert_eq!(mock.call(3).unwrap(), 6);
        assert_eq!(mock.call(4).unwrap(), 8);
        assert_eq!(mock.calls(), vec![3, 4]);
        assert_eq!(mock.results().len(), 2);
    }

    #[test]
    fn once_implementations_are_consumed_lifo() {
        let mock: MockFn<(), &'static str> = MockFn::new();
        mock.mock_implementation(|_| Ok("default"));
        mock.mock_implementation_once(|_| Ok("first-queued"));
        mock.mock_implementation_once(|_| Ok("second-queued"));

        assert_eq!(mock.call(()).unwrap(), "second-queued");
        assert_eq!(mock.call(()).unwrap(), "first-queued");
        assert_eq!(mock.call(()).unwrap(), "default");
    }

    #[test]
    fn mock_return_value_once_falls_back_to_default() {
        let mock: MockFn<(), i32> = MockFn::new();
        mock.mock_return_value(0);
        mock.mock_return_value_once(1);
        assert_eq!(mock.call(()).unwrap(), 1);
        assert_eq!(mock.call(()).unwrap(), 0);
    }

    #[test]
    fn mock_rejected_value_produces_a_guest_error() {
        let mock: MockFn<(), ()> = MockFn::new();
        mock.mock_rejected_value(GuestError::new("Error", "boom"));
        let err = mock.call(()).unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn clear_keeps_implementation_but_drops_history() {
        let mock: MockFn<(), i32> = MockFn::with_implementation(|_| Ok(1));
        mock.call(());
        mock.mock_clear();
        assert!(mock.calls().is_empty());
        assert_eq!(mock.call(()).unwrap(), 1);
    }

    #[test]
    fn reset_drops_implementation_too() {
        let mock: MockFn<(), i32> = MockFn::with_implementation(|_| Ok(1));
        mock.call(());
        mock.mock_reset();
        assert!(mock.calls().is_empty());
        assert!(mock.call(()).is_err());
    }

    fn fresh_greeter() -> &'static SpySlot<String, String> {
        // `SpySlot`'s fields aren't `const`-constructible with a real closure, so tests build
        // their own slot via `SpySlot::new` and leak it for the `'static` bound `spy_on` needs.
        Box::leak(Box::new(SpySlot::new("greet", |name: &String| {
            Ok(format!("hello, {name}"))
        })))
    }

    #[test]
    fn spy_on_wraps_and_records_while_delegating_to_the_original() {
        let slot = fresh_greeter();
        let spy = spy_on(slot).unwrap();
        assert_eq!(slot.call(&"ada".to_string()).unwrap(), "hello, ada");
        assert_eq!(spy.calls(), vec!["ada".to_string()]);
    }

    #[test]
    fn spy_on_the_same_slot_twice_is_rejected() {
        let slot = fresh_greeter();
        let _first = spy_on(slot).unwrap();
        assert!(spy_on(slot).is_err());
    }

    #[test]
    fn mock_restore_reinstates_the_original() {
        let slot = fresh_greeter();
        let spy = spy_on(slot).unwrap();
        spy.mock_implementation(|_| Ok("mocked".to_string()));
        assert_eq!(slot.call(&"ada".to_string()).unwrap(), "mocked");
        spy.mock_restore();
        assert_eq!(slot.call(&"ada".to_string()).unwrap(), "hello, ada");
    }

    #[test]
    fn restore_all_mocks_reverses_every_live_mock() {
        let slot = fresh_greeter();
        let spy = spy_on(slot).unwrap();
        spy.mock_implementation(|_| Ok("mocked".to_string()));
        restore_all_mocks();
        assert_eq!(slot.call(&"ada".to_string()).unwrap(), "hello, ada");
    }
}
