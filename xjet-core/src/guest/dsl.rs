// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `describe`/`test`/hook registration surface (§4.G).
//!
//! JavaScript's `describe.only`/`describe.skip.only` chains are a proxy-backed DSL; per §9
//! Design Notes ("Proxy-based DSL... realize as a small chain-builder"), this is modeled here
//! as [`DescribeBuilder`]/[`TestBuilder`] — structs that accumulate flags through consuming
//! methods and terminate in a `call`.

use super::format::printf;
use super::suite::{Block, Flags, HookKind, HookNode, Location, SuiteState, TestNode};
use crate::errors::{XJetCoreError, XJetError};
use serde_json::Value;
use std::cell::RefCell;

/// The registration-time handle injected as the guest's `describe`/`test`/hooks namespace.
///
/// One `Guest` is built fresh per suite (§5 "Shared resources"); [`Guest::into_suite_state`]
/// hands the finished tree to the execution engine once registration completes.
pub struct Guest {
    state: RefCell<SuiteState>,
    default_timeout_ms: u64,
}

impl Default for Guest {
    fn default() -> Self {
        Self::new()
    }
}

impl Guest {
    /// Builds a guest with the §4.G fallback default timeout (5000ms), used when no runtime
    /// context is available (e.g. tests of this module itself).
    pub fn new() -> Self {
        Self::with_default_timeout_ms(5000)
    }

    /// Builds a guest whose hooks/tests default to `default_timeout_ms` when no explicit
    /// timeout is given, matching §4.G ("Default timeout is the runtime `timeout` (5000 ms
    /// fallback)") — `default_timeout_ms` is normally `__XJET.runtime.timeout`.
    pub fn with_default_timeout_ms(default_timeout_ms: u64) -> Self {
        Self {
            state: RefCell::new(SuiteState::new()),
            default_timeout_ms,
        }
    }

    pub fn into_suite_state(self) -> SuiteState {
        self.state.into_inner()
    }

    /// Plain `describe(desc, fn)`.
    pub fn describe(
        &self,
        description: impl Into<String>,
        register: impl FnOnce(&Guest),
    ) -> Result<(), XJetCoreError> {
        self.describe_flagged(description, Flags::default(), register)
    }

    pub fn describe_builder(&self) -> DescribeBuilder<'_> {
        DescribeBuilder {
            guest: self,
            flags: Flags::default(),
        }
    }

    fn describe_flagged(
        &self,
        description: impl Into<String>,
        flags: Flags,
        register: impl FnOnce(&Guest),
    ) -> Result<(), XJetCoreError> {
        if flags.only && flags.skip {
            return Err(XJetError::new("cannot combine `only` and `skip` on the same describe").into());
        }
        self.state.borrow_mut().push_describe(description, flags)?;
        register(self);
        self.state.borrow_mut().pop_describe();
        Ok(())
    }

    /// `describe.each(table)(nameTemplate, fn)`: expands into one `describe` per row (§4.G).
    pub fn describe_each(
        &self,
        table: &EachTable,
        name_template: &str,
        register: impl Fn(&Guest, &Value),
    ) -> Result<(), XJetCoreError> {
        for (index, (params, row)) in table.rows_for_printf().into_iter().enumerate() {
            let name = printf(name_template, &params, index);
            self.describe(name, |g| register(g, &row))?;
        }
        Ok(())
    }

    /// Plain `test(desc, fn, timeout?)`.
    pub fn test(
        &self,
        description: impl Into<String>,
        block: Block,
        timeout_ms: Option<u64>,
    ) -> Result<(), XJetCoreError> {
        self.test_flagged(description, Flags::default(), false, false, Some(block), timeout_ms)
    }

    /// `test.todo(desc)`: no block body is accepted, matching §4.G's "todo forbids a block body".
    pub fn test_todo(&self, description: impl Into<String>) -> Result<(), XJetCoreError> {
        self.test_flagged(description, Flags::default(), true, false, None, None)
    }

    pub fn test_builder(&self) -> TestBuilder<'_> {
        TestBuilder {
            guest: self,
            flags: Flags::default(),
            failing: false,
        }
    }

    fn test_flagged(
        &self,
        description: impl Into<String>,
        flags: Flags,
        todo: bool,
        failing: bool,
        block: Option<Block>,
        timeout_ms: Option<u64>,
    ) -> Result<(), XJetCoreError> {
        if flags.only && flags.skip {
            return Err(XJetError::new("cannot combine `only` and `skip` on the same test").into());
        }
        if todo && block.is_some() {
            return Err(XJetError::new("`test.todo` must not be given a block body").into());
        }
        let node = TestNode {
            description: description.into(),
            ancestry: Vec::new(),
            flags,
            todo,
            failing,
            block,
            timeout_ms: timeout_ms.unwrap_or(self.default_timeout_ms),
            location: Location::default(),
        };
        self.state.borrow_mut().add_test(node)?;
        Ok(())
    }

    /// `test.each(table)(nameTemplate, fn, timeout?)`.
    pub fn test_each(
        &self,
        table: &EachTable,
        name_template: &str,
        block_factory: impl Fn(&Value) -> Block,
        timeout_ms: Option<u64>,
    ) -> Result<(), XJetCoreError> {
        for (index, (params, row)) in table.rows_for_printf().into_iter().enumerate() {
            let name = printf(name_template, &params, index);
            let block = block_factory(&row);
            self.test(name, block, timeout_ms)?;
        }
        Ok(())
    }

    fn hook(&self, kind: HookKind, block: Block, timeout_ms: Option<u64>) -> Result<(), XJetCoreError> {
        self.state
            .borrow_mut()
            .add_hook(HookNode {
                kind,
                block,
                timeout_ms: timeout_ms.unwrap_or(self.default_timeout_ms),
                location: Location::default(),
            })?;
        Ok(())
    }

    pub fn before_all(&self, block: Block, timeout_ms: Option<u64>) -> Result<(), XJetCoreError> {
        self.hook(HookKind::BeforeAll, block, timeout_ms)
    }

    pub fn after_all(&self, block: Block, timeout_ms: Option<u64>) -> Result<(), XJetCoreError> {
        self.hook(HookKind::AfterAll, block, timeout_ms)
    }

    pub fn before_each(&self, block: Block, timeout_ms: Option<u64>) -> Result<(), XJetCoreError> {
        self.hook(HookKind::BeforeEach, block, timeout_ms)
    }

    pub fn after_each(&self, block: Block, timeout_ms: Option<u64>) -> Result<(), XJetCoreError> {
        self.hook(HookKind::AfterEach, block, timeout_ms)
    }
}

/// Chain-builder standing in for `describe.only`/`describe.skip`/`describe.skip.only`.
pub struct DescribeBuilder<'g> {
    guest: &'g Guest,
    flags: Flags,
}

impl<'g> DescribeBuilder<'g> {
    pub fn only(mut self) -> Self {
        self.flags.only = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.flags.skip = true;
        self
    }

    pub fn call(
        self,
        description: impl Into<String>,
        register: impl FnOnce(&Guest),
    ) -> Result<(), XJetCoreError> {
        self.guest.describe_flagged(description, self.flags, register)
    }
}

/// Chain-builder standing in for `test.only`/`test.skip`/`test.failing`/combinations thereof.
pub struct TestBuilder<'g> {
    guest: &'g Guest,
    flags: Flags,
    failing: bool,
}

impl<'g> TestBuilder<'g> {
    pub fn only(mut self) -> Self {
        self.flags.only = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.flags.skip = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn call(
        self,
        description: impl Into<String>,
        block: Block,
        timeout_ms: Option<u64>,
    ) -> Result<(), XJetCoreError> {
        self.guest
            .test_flagged(description, self.flags, false, self.failing, Some(block), timeout_ms)
    }
}

/// The row shape behind `describe.each`/`test.each` (§9 Design Notes: a tagged union the
/// caller builds, rather than the source's array/tuple/tagged-template overload set — Rust has
/// no tagged-template-literal analogue, so that third form is dropped here).
#[derive(Clone, Debug)]
pub enum EachTable {
    /// Tuple rows: `[[1, 2, 3], [4, 5, 9]]`. Printf params are positional, `$dotted` paths don't
    /// resolve (there's no object to index into).
    Rows(Vec<Vec<Value>>),
    /// Object rows: `[{a: 1}, {a: 2}]`. Printf sees the object itself as `params[0]`.
    Objects(Vec<Value>),
}

impl EachTable {
    fn rows_for_printf(&self) -> Vec<(Vec<Value>, Value)> {
        match self {
            Self::Rows(rows) => rows
                .iter()
                .map(|row| (row.clone(), Value::Array(row.clone())))
                .collect(),
            Self::Objects(rows) => rows.iter().map(|row| (vec![row.clone()], row.clone())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> Block {
        Block::run(|| async { Ok(()) })
    }

    #[test]
    fn rejects_only_and_skip_combined() {
        let guest = Guest::new();
        let err = guest
            .describe_builder()
            .only()
            .skip()
            .call("S", |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("only") && err.to_string().contains("skip"));
    }

    #[test]
    fn test_each_expands_rows_with_printf_names() {
        let guest = Guest::new();
        let table = EachTable::Rows(vec![
            vec![json!(1), json!(2), json!(3)],
            vec![json!(4), json!(5), json!(9)],
        ]);
        guest
            .test_each(
                &table,
                "add %d+%d=%d",
                |row| {
                    let row = row.clone();
                    Block::run(move || {
                        let row = row.clone();
                        async move {
                            let values: Vec<i64> = row
                                .as_array()
                                .unwrap()
                                .iter()
                                .map(|v| v.as_i64().unwrap())
                                .collect();
                            if values[0] + values[1] != values[2] {
                                return Err(crate::guest::GuestError::new("Error", "mismatch"));
                            }
                            Ok(())
                        }
                    })
                },
                None,
            )
            .unwrap();
        let state = guest.into_suite_state();
        let names: Vec<_> = state.top_tests().iter().map(|t| t.description.clone()).collect();
        assert_eq!(names, vec!["add 1+2=3", "add 4+5=9"]);
    }

    #[test]
    fn todo_rejects_block_body() {
        // Structural: `test_todo` simply has no block parameter, so a body can't be supplied.
        let guest = Guest::new();
        guest.test_todo("later").unwrap();
        let state = guest.into_suite_state();
        assert!(state.top_tests()[0].block.is_none());
        assert!(state.top_tests()[0].todo);
    }
}
