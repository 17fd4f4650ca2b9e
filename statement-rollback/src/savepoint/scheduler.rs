// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Savepoint scheduling decisions
//!
//! The scheduler decides what must happen to the implicit savepoint at the
//! next command boundary. It never calls the host itself.

use std::cell::Cell;

use super::pending::PendingAction;
use crate::plan::{is_write_query, PlannedStatement};
use crate::xact::{TransactionKind, UtilityStatement};

/// Session state the scheduler's rules depend on, captured at the moment of
/// the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulingContext {
    pub enabled: bool,
    /// No execution stage is running
    pub top_level: bool,
    /// The transaction block is open, after the current statement's own
    /// effect on it has been applied
    pub block_open: bool,
    /// The transaction block state before the current statement
    pub block_was_open: bool,
    /// The outermost planning stage has completed
    pub planner_done: bool,
}

/// Decides which savepoint actions the next command boundary must apply
#[derive(Debug, Default)]
pub struct SavepointScheduler {
    pending: Cell<PendingAction>,
    just_recovered: Cell<bool>,
}

impl SavepointScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> PendingAction {
        self.pending.get()
    }

    /// A recovery was applied and no statement has completed since
    pub fn just_recovered(&self) -> bool {
        self.just_recovered.get()
    }

    /// A utility statement is about to be processed
    pub fn utility_statement(&self, stmt: &UtilityStatement, ctx: &SchedulingContext) {
        match stmt {
            UtilityStatement::Transaction {
                kind,
                savepoint_name,
            } => self.transaction_statement(*kind, savepoint_name.as_deref(), ctx),
            // Cursor traversal must not disturb the savepoint
            UtilityStatement::Fetch { .. } => {}
            UtilityStatement::DeclareCursor { name } => {
                if ctx.enabled && ctx.block_open {
                    log::debug!("DECLARE CURSOR {} requests release and savepoint", name);
                    self.update(PendingAction::with_release_and_savepoint);
                }
            }
            UtilityStatement::ClosePortal { .. } => {}
            UtilityStatement::Other { tag } => {
                // Utilities go straight from parsing to execution, so there is
                // no planner stage to wait for here.
                if ctx.enabled && ctx.top_level && ctx.block_open {
                    log::debug!("{} requests release and savepoint", tag);
                    self.update(PendingAction::with_release_and_savepoint);
                }
            }
        }
    }

    fn transaction_statement(
        &self,
        kind: TransactionKind,
        savepoint_name: Option<&str>,
        ctx: &SchedulingContext,
    ) {
        match kind {
            TransactionKind::Begin | TransactionKind::Start => {
                // The savepoint goes in after BEGIN has run so that later
                // release/savepoint pairs happen inside the block.
                if ctx.enabled && ctx.top_level && !ctx.block_was_open {
                    log::debug!("{} requests savepoint", kind);
                    self.update(PendingAction::with_savepoint);
                }
            }
            TransactionKind::Savepoint => {
                // Keep an implicit savepoint above the client's one so an
                // error never rolls back past it
                if ctx.enabled && savepoint_name.is_some() {
                    log::debug!("SAVEPOINT requests savepoint");
                    self.update(PendingAction::with_savepoint);
                }
            }
            TransactionKind::Prepare => {
                // Savepoints do not survive two-phase commit, and the
                // prepared transaction leaves the session anyway
                if !self.pending.get().is_idle() {
                    log::debug!(
                        "PREPARE TRANSACTION discards pending {:?}",
                        self.pending.get()
                    );
                }
                self.pending.set(PendingAction::Idle);
            }
            TransactionKind::Commit
            | TransactionKind::Rollback
            | TransactionKind::CommitPrepared
            | TransactionKind::RollbackPrepared
            | TransactionKind::Release
            | TransactionKind::RollbackTo => {}
        }
    }

    /// The execution stage of a planned statement completed without error
    pub fn executor_completed(&self, plan: &PlannedStatement, ctx: &SchedulingContext) {
        if !(ctx.enabled && ctx.top_level && ctx.planner_done && ctx.block_open) {
            return;
        }

        if self.just_recovered.replace(false) {
            log::debug!("statement after recovery requests savepoint");
            self.update(PendingAction::with_savepoint);
        } else if is_write_query(plan) {
            log::debug!("write statement requests release and savepoint");
            self.update(PendingAction::with_release_and_savepoint);
        }
    }

    /// The current statement failed. Fired once per failed statement at any
    /// nesting depth; the request stays pending until the next top-level
    /// boundary.
    pub fn abort(&self, enabled: bool) {
        if enabled {
            log::debug!("statement aborted, requesting rollback to savepoint");
            self.update(PendingAction::with_recovery);
        }
    }

    /// Record the part of the pending action the coordinator has not applied
    /// yet. Only called after a host primitive succeeded.
    pub(crate) fn settle(&self, remaining: PendingAction) {
        self.pending.set(remaining);
    }

    pub(crate) fn mark_recovered(&self) {
        self.just_recovered.set(true);
    }

    fn update(&self, f: impl FnOnce(PendingAction) -> PendingAction) {
        self.pending.set(f(self.pending.get()));
    }
}
