// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Write classification of executed plans

use super::range_table::{PlannedStatement, RangeTableKind};

/// Check whether a successfully executed plan wrote to a persistent
/// relation.
///
/// True when any base-relation entry of the range table requests a
/// privilege other than SELECT on a non-temporary relation. Must only be
/// called for statements that completed without error.
pub fn is_write_query(plan: &PlannedStatement) -> bool {
    plan.range_table.iter().any(|entry| {
        entry.kind == RangeTableKind::Relation
            && !entry.is_temporary()
            && entry.required_privileges.requires_write()
    })
}
