// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-session statement rollback context
//!
//! [`StatementRollback`] owns all session-scoped state and is registered into
//! the host's [`HookChain`]. One instance per session; the host drives it
//! from a single thread of control, so the state lives in plain cells.

use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;

use crate::config::RollbackConfig;
use crate::error::RollbackError;
use crate::hooks::{ExecutorHooks, HookChain, Next, StageResult};
use crate::nesting::NestingTracker;
use crate::plan::PlannedStatement;
use crate::savepoint::{
    BoundaryActions, BoundaryCoordinator, PendingAction, SavepointScheduler, SchedulingContext,
    SubtransactionHost,
};
use crate::xact::{Destination, TransactionBlockTracker, TransactionKind, UtilityStatement};

/// Snapshot of a session's statement rollback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RollbackStatus {
    pub enabled: bool,
    pub xact_open: bool,
    pub exec_level: u32,
    pub planner_level: u32,
    pub planner_done: bool,
    pub pending: PendingAction,
    pub just_recovered: bool,
    pub savepoint_held: bool,
}

/// Automatic statement-level rollback for one session
#[derive(Debug, Default)]
pub struct StatementRollback {
    config: Cell<RollbackConfig>,
    nesting: NestingTracker,
    block: TransactionBlockTracker,
    scheduler: SavepointScheduler,
    coordinator: BoundaryCoordinator,
}

impl StatementRollback {
    pub fn new(config: RollbackConfig) -> Self {
        Self {
            config: Cell::new(config),
            ..Default::default()
        }
    }

    /// Create a session context and register it into `chain`
    pub fn install(chain: &mut HookChain, config: RollbackConfig) -> Rc<Self> {
        let session = Rc::new(Self::new(config));
        chain.register(session.clone());
        log::debug!("statement rollback installed (enabled: {})", config.enabled);
        session
    }

    pub fn config(&self) -> RollbackConfig {
        self.config.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.get().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut config = self.config.get();
        config.enabled = enabled;
        self.config.set(config);
    }

    /// `SET name = value` for this session
    pub fn set_setting(&self, name: &str, value: &str) -> Result<(), RollbackError> {
        let mut config = self.config.get();
        config.set(name, value)?;
        self.config.set(config);
        Ok(())
    }

    /// `SHOW name` for this session
    pub fn show_setting(&self, name: &str) -> Result<&'static str, RollbackError> {
        self.config.get().show(name)
    }

    pub fn nesting(&self) -> &NestingTracker {
        &self.nesting
    }

    pub fn transaction_block(&self) -> &TransactionBlockTracker {
        &self.block
    }

    pub fn scheduler(&self) -> &SavepointScheduler {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &BoundaryCoordinator {
        &self.coordinator
    }

    pub fn status(&self) -> RollbackStatus {
        RollbackStatus {
            enabled: self.is_enabled(),
            xact_open: self.block.is_open(),
            exec_level: self.nesting.exec_level(),
            planner_level: self.nesting.planner_level(),
            planner_done: self.nesting.planner_done(),
            pending: self.scheduler.pending(),
            just_recovered: self.scheduler.just_recovered(),
            savepoint_held: self.coordinator.savepoint_held(),
        }
    }

    /// Apply the pending savepoint action at a command boundary
    pub fn at_command_boundary(
        &self,
        host: &mut dyn SubtransactionHost,
    ) -> Result<BoundaryActions, RollbackError> {
        self.coordinator.apply(
            &self.scheduler,
            self.is_enabled(),
            self.nesting.exec_level(),
            self.block.is_open(),
            host,
        )
    }

    fn scheduling_context(&self, block_was_open: bool) -> SchedulingContext {
        SchedulingContext {
            enabled: self.is_enabled(),
            top_level: self.nesting.is_top_level(),
            block_open: self.block.is_open(),
            block_was_open,
            planner_done: self.nesting.planner_done(),
        }
    }

    fn before_utility(&self, stmt: &UtilityStatement) {
        let block_was_open = match stmt {
            UtilityStatement::Transaction { kind, .. } => {
                let was_open = self.block.observe(*kind);
                if kind.closes_block() {
                    self.coordinator.block_closed();
                }
                was_open
            }
            _ => self.block.is_open(),
        };
        let ctx = self.scheduling_context(block_was_open);
        self.scheduler.utility_statement(stmt, &ctx);
    }

    fn after_utility(&self, stmt: &UtilityStatement) {
        if let UtilityStatement::Transaction {
            kind,
            savepoint_name: Some(name),
        } = stmt
        {
            match kind {
                TransactionKind::Savepoint => self.coordinator.explicit_savepoint_created(name),
                TransactionKind::Release => self.coordinator.explicit_savepoint_released(name),
                TransactionKind::RollbackTo => self.coordinator.explicit_rolled_back_to(name),
                _ => {}
            }
        }
    }
}

impl ExecutorHooks for StatementRollback {
    fn planner(&self, next: Next<'_, PlannedStatement>) -> StageResult<PlannedStatement> {
        let _planning = self.nesting.enter_planning();
        next()
    }

    fn executor_run(&self, next: Next<'_, ()>) -> StageResult<()> {
        let _executing = self.nesting.enter_execution();
        next()
    }

    fn executor_finish(&self, next: Next<'_, ()>) -> StageResult<()> {
        let _executing = self.nesting.enter_execution();
        next()
    }

    fn executor_end(&self, plan: &PlannedStatement) {
        let ctx = self.scheduling_context(self.block.is_open());
        self.scheduler.executor_completed(plan, &ctx);
    }

    fn process_utility(
        &self,
        stmt: &UtilityStatement,
        dest: Destination,
        next: Next<'_, ()>,
    ) -> StageResult<()> {
        // Statements issued by server-side functions are internal
        if dest == Destination::Client {
            self.before_utility(stmt);
        }

        let result = {
            let _executing = self.nesting.enter_execution();
            next()
        };

        if result.is_ok() && dest == Destination::Client {
            self.after_utility(stmt);
        }
        result
    }

    fn start_xact_command(&self, host: &mut dyn SubtransactionHost) -> StageResult<()> {
        let actions = self.at_command_boundary(host)?;
        if !actions.is_empty() {
            log::debug!("command boundary applied {:?}", actions);
        }
        Ok(())
    }

    fn abort_current_transaction(&self) {
        self.scheduler.abort(self.is_enabled());
    }
}
