// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The parts of a planned statement needed to classify it

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Access privileges requested on a relation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Privileges: u32 {
        const SELECT = 1 << 0;
        const INSERT = 1 << 1;
        const UPDATE = 1 << 2;
        const DELETE = 1 << 3;
        const TRUNCATE = 1 << 4;
    }
}

impl Privileges {
    /// Anything beyond SELECT. Row locks (`SELECT ... FOR UPDATE`) request
    /// UPDATE and so count as writes.
    pub fn requires_write(&self) -> bool {
        !(*self - Privileges::SELECT).is_empty()
    }
}

/// Kinds of range-table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeTableKind {
    /// A base relation (table, view, materialized view)
    Relation,
    Subquery,
    Join,
    Function,
    Values,
    Cte,
}

/// Lifetime of a relation's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelationPersistence {
    #[default]
    Permanent,
    Unlogged,
    /// Session-local temporary relation
    Temporary,
}

/// One entry of a plan's range table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeTableEntry {
    pub kind: RangeTableKind,
    /// Relation name, for base relations
    pub relation: Option<String>,
    pub persistence: RelationPersistence,
    pub required_privileges: Privileges,
}

impl RangeTableEntry {
    /// A base relation entry
    pub fn relation(name: impl Into<String>, required_privileges: Privileges) -> Self {
        Self {
            kind: RangeTableKind::Relation,
            relation: Some(name.into()),
            persistence: RelationPersistence::Permanent,
            required_privileges,
        }
    }

    /// A non-relation entry (subquery, join, function scan, ...)
    pub fn other(kind: RangeTableKind) -> Self {
        Self {
            kind,
            relation: None,
            persistence: RelationPersistence::Permanent,
            required_privileges: Privileges::empty(),
        }
    }

    pub fn with_persistence(mut self, persistence: RelationPersistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn is_temporary(&self) -> bool {
        self.persistence == RelationPersistence::Temporary
    }
}

/// A planned statement as handed to the executor
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlannedStatement {
    pub range_table: Vec<RangeTableEntry>,
}

impl PlannedStatement {
    pub fn new(range_table: Vec<RangeTableEntry>) -> Self {
        Self { range_table }
    }
}
