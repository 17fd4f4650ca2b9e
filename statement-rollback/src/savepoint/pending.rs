// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Actions scheduled for the next command boundary

use serde::{Deserialize, Serialize};

/// Savepoint work waiting for the next command boundary.
///
/// Requests merge rather than overwrite: a release request on top of a
/// savepoint request needs both, and recovery supersedes everything since
/// rolling back the savepoint also releases it and is always followed by a
/// fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PendingAction {
    #[default]
    Idle,
    NeedRelease,
    NeedSavepoint,
    NeedReleaseAndSavepoint,
    /// Roll back to and release the implicit savepoint, then start a new one
    NeedRecovery,
}

impl PendingAction {
    pub fn with_savepoint(self) -> Self {
        match self {
            PendingAction::Idle | PendingAction::NeedSavepoint => PendingAction::NeedSavepoint,
            PendingAction::NeedRelease | PendingAction::NeedReleaseAndSavepoint => {
                PendingAction::NeedReleaseAndSavepoint
            }
            PendingAction::NeedRecovery => PendingAction::NeedRecovery,
        }
    }

    pub fn with_release(self) -> Self {
        match self {
            PendingAction::Idle | PendingAction::NeedRelease => PendingAction::NeedRelease,
            PendingAction::NeedSavepoint | PendingAction::NeedReleaseAndSavepoint => {
                PendingAction::NeedReleaseAndSavepoint
            }
            PendingAction::NeedRecovery => PendingAction::NeedRecovery,
        }
    }

    pub fn with_release_and_savepoint(self) -> Self {
        self.with_release().with_savepoint()
    }

    pub fn with_recovery(self) -> Self {
        PendingAction::NeedRecovery
    }

    pub fn is_idle(&self) -> bool {
        *self == PendingAction::Idle
    }

    pub fn needs_recovery(&self) -> bool {
        *self == PendingAction::NeedRecovery
    }

    /// A plain release. Recovery releases on its own and is not counted.
    pub fn needs_release(&self) -> bool {
        matches!(
            self,
            PendingAction::NeedRelease | PendingAction::NeedReleaseAndSavepoint
        )
    }

    pub fn needs_savepoint(&self) -> bool {
        matches!(
            self,
            PendingAction::NeedSavepoint
                | PendingAction::NeedReleaseAndSavepoint
                | PendingAction::NeedRecovery
        )
    }
}
