// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types

use thiserror::Error;

/// An error raised by the host engine while running a statement.
///
/// Statement errors travel through every hook untouched so the client sees
/// the same code and message it would see without automatic savepoints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StatementError {
    /// Five-character SQLSTATE code reported to the client
    pub sqlstate: String,
    /// Human readable message
    pub message: String,
}

impl StatementError {
    pub fn new(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            message: message.into(),
        }
    }
}

/// Statement rollback errors
#[derive(Error, Debug)]
pub enum RollbackError {
    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error("Subtransaction operation failed: {0}")]
    Host(String),

    #[error("Unexpected transaction kind: {0}")]
    UnexpectedTransactionKind(String),

    #[error("Invalid value for parameter \"{name}\": \"{value}\"")]
    InvalidSetting { name: String, value: String },

    #[error("Unrecognized configuration parameter \"{0}\"")]
    UnknownSetting(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl RollbackError {
    /// The statement error carried by this error, if it came from the host's
    /// statement execution.
    pub fn as_statement(&self) -> Option<&StatementError> {
        match self {
            RollbackError::Statement(e) => Some(e),
            _ => None,
        }
    }
}
