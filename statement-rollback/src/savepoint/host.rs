// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Subtransaction primitives provided by the host engine

use crate::error::RollbackError;

/// The host engine's subtransaction operations.
///
/// Only called by the boundary coordinator, and only while no statement is
/// executing.
pub trait SubtransactionHost {
    /// Start a new unnamed subtransaction on top of the current one
    fn begin_implicit_savepoint(&mut self) -> Result<(), RollbackError>;

    /// Commit the current subtransaction into its parent
    fn release_implicit_savepoint(&mut self) -> Result<(), RollbackError>;

    /// Undo everything done in the current subtransaction, then pop it.
    /// Clears the failed state left by an aborted statement.
    fn rollback_to_and_release_implicit_savepoint(&mut self) -> Result<(), RollbackError>;

    /// Whether the host considers an explicit transaction block open
    fn is_transaction_block_open(&self) -> bool;
}
