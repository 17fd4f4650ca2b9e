// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction-control statements and transaction block tracking

pub mod block;
pub mod statement;

pub use block::TransactionBlockTracker;
pub use statement::{Destination, TransactionKind, UtilityStatement};
