// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lifecycle extension points
//!
//! A host engine exposes its statement lifecycle through a [`HookChain`].
//! Handlers implement [`ExecutorHooks`], overriding only the points they
//! care about; every default forwards. Wrapping points (planner, executor
//! run/finish, utility processing) hand each handler a `next` that runs the
//! rest of the chain and finally the host's standard stage. Observing points
//! (executor end, command boundaries, abort) call every handler in order.
//! Handlers run in registration order, the first registered being the
//! outermost.

use std::rc::Rc;

use crate::error::RollbackError;
use crate::plan::PlannedStatement;
use crate::savepoint::SubtransactionHost;
use crate::xact::{Destination, UtilityStatement};

pub type StageResult<T> = Result<T, RollbackError>;

/// The rest of a wrapping chain
pub type Next<'a, T> = &'a mut dyn FnMut() -> StageResult<T>;

/// Statement lifecycle extension points
pub trait ExecutorHooks {
    /// Planning of a query, possibly nested inside another stage
    fn planner(&self, next: Next<'_, PlannedStatement>) -> StageResult<PlannedStatement> {
        next()
    }

    fn executor_run(&self, next: Next<'_, ()>) -> StageResult<()> {
        next()
    }

    /// Runs after-statement work such as AFTER triggers
    fn executor_finish(&self, next: Next<'_, ()>) -> StageResult<()> {
        next()
    }

    /// A planned statement finished executing successfully and is being
    /// shut down
    fn executor_end(&self, _plan: &PlannedStatement) {}

    fn process_utility(
        &self,
        _stmt: &UtilityStatement,
        _dest: Destination,
        next: Next<'_, ()>,
    ) -> StageResult<()> {
        next()
    }

    /// Command boundary, before the next client statement starts
    fn start_xact_command(&self, _host: &mut dyn SubtransactionHost) -> StageResult<()> {
        Ok(())
    }

    /// A client statement finished
    fn finish_xact_command(&self) {}

    /// The current statement failed and its transaction state is being
    /// aborted
    fn abort_current_transaction(&self) {}
}

/// Registered handlers for every lifecycle point
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Rc<dyn ExecutorHooks>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Rc<dyn ExecutorHooks>) {
        self.hooks.push(hook);
    }

    /// Remove a handler by identity. Returns false if it was not registered.
    pub fn unregister<H: ExecutorHooks + ?Sized>(&mut self, hook: &Rc<H>) -> bool {
        let target = Rc::as_ptr(hook) as *const ();
        match self
            .hooks
            .iter()
            .position(|h| Rc::as_ptr(h) as *const () == target)
        {
            Some(pos) => {
                self.hooks.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn planner(&self, standard: Next<'_, PlannedStatement>) -> StageResult<PlannedStatement> {
        self.planner_from(0, standard)
    }

    fn planner_from(
        &self,
        index: usize,
        standard: Next<'_, PlannedStatement>,
    ) -> StageResult<PlannedStatement> {
        match self.hooks.get(index) {
            Some(hook) => hook.planner(&mut || self.planner_from(index + 1, &mut *standard)),
            None => standard(),
        }
    }

    pub fn executor_run(&self, standard: Next<'_, ()>) -> StageResult<()> {
        self.executor_run_from(0, standard)
    }

    fn executor_run_from(&self, index: usize, standard: Next<'_, ()>) -> StageResult<()> {
        match self.hooks.get(index) {
            Some(hook) => hook.executor_run(&mut || self.executor_run_from(index + 1, &mut *standard)),
            None => standard(),
        }
    }

    pub fn executor_finish(&self, standard: Next<'_, ()>) -> StageResult<()> {
        self.executor_finish_from(0, standard)
    }

    fn executor_finish_from(&self, index: usize, standard: Next<'_, ()>) -> StageResult<()> {
        match self.hooks.get(index) {
            Some(hook) => {
                hook.executor_finish(&mut || self.executor_finish_from(index + 1, &mut *standard))
            }
            None => standard(),
        }
    }

    /// Notify every handler, then run the host's standard shutdown
    pub fn executor_end(&self, plan: &PlannedStatement, standard: impl FnOnce()) {
        for hook in &self.hooks {
            hook.executor_end(plan);
        }
        standard()
    }

    pub fn process_utility(
        &self,
        stmt: &UtilityStatement,
        dest: Destination,
        standard: Next<'_, ()>,
    ) -> StageResult<()> {
        self.process_utility_from(0, stmt, dest, standard)
    }

    fn process_utility_from(
        &self,
        index: usize,
        stmt: &UtilityStatement,
        dest: Destination,
        standard: Next<'_, ()>,
    ) -> StageResult<()> {
        match self.hooks.get(index) {
            Some(hook) => hook.process_utility(stmt, dest, &mut || {
                self.process_utility_from(index + 1, stmt, dest, &mut *standard)
            }),
            None => standard(),
        }
    }

    pub fn start_xact_command(&self, host: &mut dyn SubtransactionHost) -> StageResult<()> {
        for hook in &self.hooks {
            hook.start_xact_command(host)?;
        }
        Ok(())
    }

    pub fn finish_xact_command(&self) {
        for hook in &self.hooks {
            hook.finish_xact_command();
        }
    }

    pub fn abort_current_transaction(&self) {
        for hook in &self.hooks {
            hook.abort_current_transaction();
        }
    }
}
