// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner and executor nesting depth tracking
//!
//! Planning and execution re-enter themselves (sub-selects, triggers,
//! functions issuing their own queries). Only the outermost statement may
//! touch the implicit savepoint, so both depths are tracked here. The
//! counters can only move through the RAII guards returned by
//! [`NestingTracker::enter_planning`] and [`NestingTracker::enter_execution`],
//! which keeps them balanced on every exit path, unwinding included.

use std::cell::Cell;

/// Reentrancy depth of the planning and execution stages for one session
#[derive(Debug, Default)]
pub struct NestingTracker {
    exec_level: Cell<u32>,
    planner_level: Cell<u32>,
    planner_done: Cell<bool>,
}

impl NestingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current execution-stage depth
    pub fn exec_level(&self) -> u32 {
        self.exec_level.get()
    }

    /// Current planning-stage depth
    pub fn planner_level(&self) -> u32 {
        self.planner_level.get()
    }

    /// Whether the outermost planning stage has completed since both
    /// depths were last zero
    pub fn planner_done(&self) -> bool {
        self.planner_done.get()
    }

    /// True when no execution stage is running, i.e. the current statement
    /// comes straight from the client
    pub fn is_top_level(&self) -> bool {
        self.exec_level.get() == 0
    }

    /// Enter the planning stage. The stage is left when the guard drops.
    pub fn enter_planning(&self) -> PlanningGuard<'_> {
        if self.exec_level.get() == 0 && self.planner_level.get() == 0 {
            self.planner_done.set(false);
        }
        self.planner_level.set(self.planner_level.get() + 1);
        log::debug!(
            "increase nest planner level (exec level {}, planner level {}, planner done {})",
            self.exec_level.get(),
            self.planner_level.get(),
            self.planner_done.get()
        );
        PlanningGuard { tracker: self }
    }

    /// Enter the execution stage. The stage is left when the guard drops.
    pub fn enter_execution(&self) -> ExecutionGuard<'_> {
        self.exec_level.set(self.exec_level.get() + 1);
        log::debug!("increase nest executor level to {}", self.exec_level.get());
        ExecutionGuard { tracker: self }
    }

    fn exit_planning(&self) {
        let level = self.planner_level.get().saturating_sub(1);
        self.planner_level.set(level);
        if self.exec_level.get() == 0 && level == 0 {
            log::debug!("planner stage marked as done");
            self.planner_done.set(true);
        }
    }

    fn exit_execution(&self) {
        let level = self.exec_level.get().saturating_sub(1);
        self.exec_level.set(level);
        log::debug!("decrease nest executor level to {}", level);
    }
}

/// Marks the planning stage as active for its lifetime
#[must_use = "the planning stage ends as soon as the guard is dropped"]
pub struct PlanningGuard<'a> {
    tracker: &'a NestingTracker,
}

impl Drop for PlanningGuard<'_> {
    fn drop(&mut self) {
        self.tracker.exit_planning();
    }
}

/// Marks the execution stage as active for its lifetime
#[must_use = "the execution stage ends as soon as the guard is dropped"]
pub struct ExecutionGuard<'a> {
    tracker: &'a NestingTracker,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.tracker.exit_execution();
    }
}
