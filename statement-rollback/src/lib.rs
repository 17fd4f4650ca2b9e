// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Statement-level rollback for SQL transaction engines
//!
//! When a statement inside a multi-statement transaction fails, only that
//! statement's effects are undone and the transaction stays usable, the way
//! Oracle and DB2 behave. The client never issues a ROLLBACK TO: the engine
//! keeps an implicit savepoint one level under the client's transaction and
//! moves it forward between statements.
//!
//! # Usage
//!
//! A host engine exposes its statement lifecycle through a [`HookChain`] and
//! its subtransaction primitives through [`SubtransactionHost`]. Each session
//! installs one [`StatementRollback`]:
//!
//! ```rust,ignore
//! let mut chain = HookChain::new();
//! let session = StatementRollback::install(&mut chain, RollbackConfig::default());
//!
//! // at every command boundary
//! chain.start_xact_command(&mut host)?;
//! // ... planner / executor / utility hooks while the statement runs ...
//! // on statement failure
//! chain.abort_current_transaction();
//! ```
//!
//! The feature is toggled per session with the `statement_rollback.enabled`
//! setting, see [`config`].

pub mod config;
pub mod error;
pub mod hooks;
pub mod nesting;
pub mod plan;
pub mod savepoint;
pub mod session;
pub mod xact;

pub use config::{RollbackConfig, SETTING_ENABLED};
pub use error::{RollbackError, StatementError};
pub use hooks::{ExecutorHooks, HookChain, Next, StageResult};
pub use nesting::NestingTracker;
pub use plan::{
    is_write_query, PlannedStatement, Privileges, RangeTableEntry, RangeTableKind,
    RelationPersistence,
};
pub use savepoint::{
    BoundaryActions, BoundaryCoordinator, PendingAction, SavepointScheduler, SchedulingContext,
    SubtransactionHost,
};
pub use session::{RollbackStatus, StatementRollback};
pub use xact::{Destination, TransactionBlockTracker, TransactionKind, UtilityStatement};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
