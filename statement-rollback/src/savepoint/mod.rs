// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Automatic savepoint management
//!
//! The [`SavepointScheduler`] turns lifecycle events into a [`PendingAction`];
//! the [`BoundaryCoordinator`] applies that action against the host's
//! subtransaction primitives at the next command boundary. Scheduling and
//! application are kept apart because a subtransaction may not be released,
//! rolled back or started while a statement is still running inside it.

pub mod coordinator;
pub mod host;
pub mod pending;
pub mod scheduler;

pub use coordinator::{BoundaryActions, BoundaryCoordinator};
pub use host::SubtransactionHost;
pub use pending::PendingAction;
pub use scheduler::{SavepointScheduler, SchedulingContext};
