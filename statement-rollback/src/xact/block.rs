// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Explicit transaction block tracking

use std::cell::Cell;

use super::statement::TransactionKind;

/// Tracks whether the client has an explicit transaction block open.
///
/// The state only changes by observing transaction-control statements:
/// BEGIN/START opens the block, COMMIT, ROLLBACK, PREPARE TRANSACTION and
/// the prepared-transaction commands close it.
#[derive(Debug, Default)]
pub struct TransactionBlockTracker {
    open: Cell<bool>,
}

impl TransactionBlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Update the block state for a transaction-control statement and
    /// return the state it had before this statement
    pub fn observe(&self, kind: TransactionKind) -> bool {
        let was_open = self.open.get();
        if kind.opens_block() {
            log::info!("transaction block marked as opened by {}", kind);
            self.open.set(true);
        } else if kind.closes_block() {
            log::debug!("transaction block marked as closed by {}", kind);
            self.open.set(false);
        }
        was_open
    }
}
