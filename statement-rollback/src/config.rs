// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Configuration for automatic statement rollback
//!
//! The only knob is a per-session boolean, exposed to clients as the
//! `statement_rollback.enabled` setting. It defaults to on.

use serde::{Deserialize, Serialize};

use crate::error::RollbackError;

/// Name of the setting that toggles automatic savepoints
pub const SETTING_ENABLED: &str = "statement_rollback.enabled";

/// Session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    /// Enable automatic savepoints
    pub enabled: bool,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl RollbackConfig {
    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, RollbackError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply a `name = value` setting to this configuration
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), RollbackError> {
        if !name.eq_ignore_ascii_case(SETTING_ENABLED) {
            return Err(RollbackError::UnknownSetting(name.to_string()));
        }
        self.enabled = parse_bool(value).ok_or_else(|| RollbackError::InvalidSetting {
            name: SETTING_ENABLED.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }

    /// Render a setting the way `SHOW` reports it
    pub fn show(&self, name: &str) -> Result<&'static str, RollbackError> {
        if !name.eq_ignore_ascii_case(SETTING_ENABLED) {
            return Err(RollbackError::UnknownSetting(name.to_string()));
        }
        Ok(if self.enabled { "on" } else { "off" })
    }
}

/// Parse a boolean setting value.
///
/// Accepts `on`/`off`, `1`/`0` and any prefix of `true`, `false`, `yes`,
/// `no`, ignoring case and surrounding whitespace. `o` alone is ambiguous.
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim().to_ascii_lowercase();
    if value.is_empty() {
        return None;
    }
    let is_prefix_of = |word: &str| word.starts_with(value.as_str());

    match value.as_str() {
        "on" | "1" => Some(true),
        "off" | "of" | "0" => Some(false),
        _ if is_prefix_of("true") || is_prefix_of("yes") => Some(true),
        _ if is_prefix_of("false") || is_prefix_of("no") => Some(false),
        _ => None,
    }
}
