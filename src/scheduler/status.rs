// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::fmt::Display;

/// What the orchestrator is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestratorPhase {
    #[default]
    Starting,
    /// The discovery scanner is running.
    Discovering,
    /// Actions are executed.
    Attacking,
    /// A whole cycle executed nothing.
    Idle,
    Stopped,
}

impl Display for OrchestratorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorPhase::Starting => write!(f, "STARTING"),
            OrchestratorPhase::Discovering => write!(f, "DISCOVERING"),
            OrchestratorPhase::Attacking => write!(f, "ATTACKING"),
            OrchestratorPhase::Idle => write!(f, "IDLE"),
            OrchestratorPhase::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Observable state of the orchestrator, e.g. for a display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrchestratorStatus {
    pub phase: OrchestratorPhase,
    /// Name of the action started last.
    pub current_action: Option<String>,
    /// Target of the current action or the remaining idle time.
    pub detail: String,
    /// Executed actions since start.
    pub attacks: u64,
    /// Consecutive cycles that executed nothing.
    pub idle_streak: u32,
}
