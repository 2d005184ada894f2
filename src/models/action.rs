// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// Port value of actions that are not bound to a discovered host.
pub const STANDALONE_PORT: u16 = 0;

/// Static description of an action module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Unique name, also used as the status column within the host table.
    pub name: String,
    /// The port the action targets. `0` marks a standalone action.
    #[serde(default)]
    pub port: u16,
    /// Name of the action that must have succeeded on the same host before this one is
    /// eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl ActionDescriptor {
    /// Creates a descriptor without a parent.
    pub fn new<S: Into<String>>(name: S, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            parent: None,
        }
    }

    /// Sets the parent action.
    pub fn with_parent<S: Into<String>>(mut self, parent: S) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Returns true for actions that don't target a discovered host.
    pub fn is_standalone(&self) -> bool {
        self.port == STANDALONE_PORT
    }

    /// Returns true when the action depends on another one.
    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }
}

/// The result an action module reports after an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The action achieved its goal.
    Success,
    /// The action failed but may succeed when retried.
    Failed,
    /// The action exhausted its input (e.g. a credential list) without success.
    NoCredsFound,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::NoCredsFound => write!(f, "no_creds_found"),
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "success" => Ok(Outcome::Success),
            "failed" => Ok(Outcome::Failed),
            "no_creds_found" => Ok(Outcome::NoCredsFound),
            x => Err(format!("unknown outcome: {x}")),
        }
    }
}

/// What an action is executed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A discovered host and the port of the action.
    Host {
        /// Address of the host.
        ip: String,
        /// Port as stated by the action.
        port: u16,
    },
    /// Standalone actions run against the synthetic standalone record.
    Standalone,
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Host { ip, port } if *port == STANDALONE_PORT => write!(f, "{ip}"),
            Target::Host { ip, port } => write!(f, "{ip}:{port}"),
            Target::Standalone => write!(f, "standalone"),
        }
    }
}
