// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Utility statement classification
//!
//! Only the shape of a utility statement matters for savepoint scheduling:
//! whether it is transaction control (and of which kind), a cursor
//! operation, or anything else.

use crate::error::RollbackError;

/// Kinds of transaction-control statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Begin,
    Start,
    Commit,
    Rollback,
    Savepoint,
    Release,
    RollbackTo,
    Prepare,
    CommitPrepared,
    RollbackPrepared,
}

impl TransactionKind {
    /// Command tag for display
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Begin => "BEGIN",
            TransactionKind::Start => "START TRANSACTION",
            TransactionKind::Commit => "COMMIT",
            TransactionKind::Rollback => "ROLLBACK",
            TransactionKind::Savepoint => "SAVEPOINT",
            TransactionKind::Release => "RELEASE",
            TransactionKind::RollbackTo => "ROLLBACK TO",
            TransactionKind::Prepare => "PREPARE TRANSACTION",
            TransactionKind::CommitPrepared => "COMMIT PREPARED",
            TransactionKind::RollbackPrepared => "ROLLBACK PREPARED",
        }
    }

    /// Statements that open a transaction block
    pub fn opens_block(&self) -> bool {
        matches!(self, TransactionKind::Begin | TransactionKind::Start)
    }

    /// Statements that end the current transaction block, either by
    /// finishing it or by detaching it from the session
    pub fn closes_block(&self) -> bool {
        matches!(
            self,
            TransactionKind::Commit
                | TransactionKind::Rollback
                | TransactionKind::CommitPrepared
                | TransactionKind::RollbackPrepared
                | TransactionKind::Prepare
        )
    }

    /// Client-issued savepoint commands
    pub fn is_explicit_savepoint_command(&self) -> bool {
        matches!(
            self,
            TransactionKind::Savepoint | TransactionKind::Release | TransactionKind::RollbackTo
        )
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = RollbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_uppercase().as_str() {
            "BEGIN" | "BEGIN TRANSACTION" | "BEGIN WORK" => Ok(TransactionKind::Begin),
            "START" | "START TRANSACTION" => Ok(TransactionKind::Start),
            "COMMIT" | "END" | "COMMIT TRANSACTION" | "COMMIT WORK" => {
                Ok(TransactionKind::Commit)
            }
            "ROLLBACK" | "ABORT" | "ROLLBACK TRANSACTION" | "ROLLBACK WORK" => {
                Ok(TransactionKind::Rollback)
            }
            "SAVEPOINT" => Ok(TransactionKind::Savepoint),
            "RELEASE" | "RELEASE SAVEPOINT" => Ok(TransactionKind::Release),
            "ROLLBACK TO" | "ROLLBACK TO SAVEPOINT" => Ok(TransactionKind::RollbackTo),
            "PREPARE TRANSACTION" => Ok(TransactionKind::Prepare),
            "COMMIT PREPARED" => Ok(TransactionKind::CommitPrepared),
            "ROLLBACK PREPARED" => Ok(TransactionKind::RollbackPrepared),
            _ => Err(RollbackError::UnexpectedTransactionKind(s.to_string())),
        }
    }
}

/// A utility (non-planned) statement about to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtilityStatement {
    /// Transaction control. `savepoint_name` is set for SAVEPOINT, RELEASE
    /// and ROLLBACK TO.
    Transaction {
        kind: TransactionKind,
        savepoint_name: Option<String>,
    },
    /// DECLARE CURSOR
    DeclareCursor { name: String },
    /// FETCH / MOVE
    Fetch { cursor: String },
    /// CLOSE cursor (`None` for CLOSE ALL)
    ClosePortal { cursor: Option<String> },
    /// Any other utility command (DDL, SET, ...), identified by its tag
    Other { tag: String },
}

impl UtilityStatement {
    pub fn transaction(kind: TransactionKind) -> Self {
        UtilityStatement::Transaction {
            kind,
            savepoint_name: None,
        }
    }

    pub fn savepoint_command(kind: TransactionKind, name: impl Into<String>) -> Self {
        UtilityStatement::Transaction {
            kind,
            savepoint_name: Some(name.into()),
        }
    }

    pub fn other(tag: impl Into<String>) -> Self {
        UtilityStatement::Other { tag: tag.into() }
    }

    /// Command tag, for logging
    pub fn tag(&self) -> &str {
        match self {
            UtilityStatement::Transaction { kind, .. } => kind.as_str(),
            UtilityStatement::DeclareCursor { .. } => "DECLARE CURSOR",
            UtilityStatement::Fetch { .. } => "FETCH",
            UtilityStatement::ClosePortal { .. } => "CLOSE CURSOR",
            UtilityStatement::Other { tag } => tag,
        }
    }
}

/// Where a utility statement's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// The statement came from the client
    #[default]
    Client,
    /// The statement was issued internally by a server-side function
    Spi,
}
