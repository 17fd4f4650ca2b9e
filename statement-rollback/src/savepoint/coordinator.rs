// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command boundary coordination
//!
//! At each boundary between two client statements the coordinator applies
//! the scheduled action in a fixed order: recovery (rollback to and release),
//! then release, then the new savepoint. Beginning the savepoint is always
//! last so the next statement runs inside it.

use std::cell::{Cell, RefCell};

use serde::Serialize;

use super::host::SubtransactionHost;
use super::pending::PendingAction;
use super::scheduler::SavepointScheduler;
use crate::error::RollbackError;

/// What a boundary did against the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoundaryActions {
    pub rolled_back: bool,
    pub released: bool,
    pub savepoint_begun: bool,
}

impl BoundaryActions {
    pub fn is_empty(&self) -> bool {
        !(self.rolled_back || self.released || self.savepoint_begun)
    }
}

/// Client savepoint, and whether our implicit savepoint sat right beneath it
#[derive(Debug, Clone)]
struct ExplicitSavepoint {
    name: String,
    covers_implicit: bool,
}

/// Applies scheduled savepoint actions at command boundaries.
///
/// The coordinator is the only owner of the implicit savepoint. It remembers
/// whether the top of the host's subtransaction stack is an implicit
/// savepoint it began, so that a bare savepoint request never stacks a
/// second implicit level on the first one.
#[derive(Debug, Default)]
pub struct BoundaryCoordinator {
    held: Cell<bool>,
    explicit: RefCell<Vec<ExplicitSavepoint>>,
}

impl BoundaryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current top subtransaction is our implicit savepoint
    pub fn savepoint_held(&self) -> bool {
        self.held.get()
    }

    /// Apply the pending action.
    ///
    /// Does nothing unless enabled and at top level; the pending action then
    /// stays scheduled for a later boundary. A failing host primitive returns
    /// its error and leaves whatever was not applied still pending.
    pub fn apply(
        &self,
        scheduler: &SavepointScheduler,
        enabled: bool,
        exec_level: u32,
        block_open: bool,
        host: &mut dyn SubtransactionHost,
    ) -> Result<BoundaryActions, RollbackError> {
        let mut actions = BoundaryActions::default();
        if !enabled || exec_level != 0 {
            return Ok(actions);
        }

        if host.is_transaction_block_open() != block_open {
            log::warn!(
                "transaction block state mismatch: tracked {}, host reports {}",
                block_open,
                !block_open
            );
        }

        // The scheduled action is lowered step by step as each primitive
        // succeeds. A failing primitive leaves exactly the unapplied part
        // pending, and `held` always matches what the host has done.
        let mut action = scheduler.pending();

        if action.needs_recovery() {
            log::debug!("automatic rollback and release");
            host.rollback_to_and_release_implicit_savepoint()?;
            self.held.set(false);
            scheduler.mark_recovered();
            actions.rolled_back = true;
            action = PendingAction::NeedSavepoint;
            scheduler.settle(action);
        } else if action.needs_release() {
            if self.held.get() {
                log::debug!("automatic release");
                host.release_implicit_savepoint()?;
                self.held.set(false);
                actions.released = true;
            } else {
                log::debug!("no implicit savepoint on top of the stack, release skipped");
            }
            action = if action.needs_savepoint() {
                PendingAction::NeedSavepoint
            } else {
                PendingAction::Idle
            };
            scheduler.settle(action);
        }

        // An open block always runs under an implicit savepoint, including
        // after the client rolled back to one of its own savepoints.
        let unprotected = block_open && !self.held.get();
        if action.needs_savepoint() || unprotected {
            if self.held.get() {
                log::debug!("automatic release before refreshing savepoint");
                host.release_implicit_savepoint()?;
                self.held.set(false);
                actions.released = true;
            }
            log::debug!("automatic savepoint");
            host.begin_implicit_savepoint()?;
            self.held.set(block_open);
            actions.savepoint_begun = true;
        }
        scheduler.settle(PendingAction::Idle);

        Ok(actions)
    }

    /// The transaction block ended; every subtransaction went with it
    pub fn block_closed(&self) {
        self.held.set(false);
        self.explicit.borrow_mut().clear();
    }

    /// The client created a savepoint on top of the stack
    pub fn explicit_savepoint_created(&self, name: &str) {
        self.explicit.borrow_mut().push(ExplicitSavepoint {
            name: name.to_string(),
            covers_implicit: self.held.replace(false),
        });
    }

    /// The client released a savepoint, and everything above it
    pub fn explicit_savepoint_released(&self, name: &str) {
        let mut explicit = self.explicit.borrow_mut();
        match explicit.iter().rposition(|sp| sp.name == name) {
            Some(pos) => {
                self.held.set(explicit[pos].covers_implicit);
                explicit.truncate(pos);
            }
            None => self.held.set(false),
        }
    }

    /// The client rolled back to a savepoint, which stays on top
    pub fn explicit_rolled_back_to(&self, name: &str) {
        let mut explicit = self.explicit.borrow_mut();
        if let Some(pos) = explicit.iter().rposition(|sp| sp.name == name) {
            explicit.truncate(pos + 1);
        }
        self.held.set(false);
    }
}
