// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Finished query plans and their write classification

pub mod classifier;
pub mod range_table;

pub use classifier::is_write_query;
pub use range_table::{
    PlannedStatement, Privileges, RangeTableEntry, RangeTableKind, RelationPersistence,
};
