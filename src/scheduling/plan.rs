// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// The kind of work executed against a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Actions without a parent, e.g. brute forcing a service.
    Parent,
    /// Actions depending on the success of a parent, e.g. stealing files.
    Child,
    /// The vulnerability scan.
    VulnScan,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Parent => write!(f, "parent"),
            Phase::Child => write!(f, "child"),
            Phase::VulnScan => write!(f, "vuln_scan"),
        }
    }
}

/// Which phases are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    pub parent: bool,
    pub child: bool,
    pub vuln_scan: bool,
}

impl Default for Phases {
    fn default() -> Self {
        Self {
            parent: true,
            child: true,
            vuln_scan: true,
        }
    }
}

impl Phases {
    fn enabled(&self) -> impl Iterator<Item = Phase> + '_ {
        [
            (Phase::Parent, self.parent),
            (Phase::Child, self.child),
            (Phase::VulnScan, self.vuln_scan),
        ]
        .into_iter()
        .filter_map(|(p, on)| on.then_some(p))
    }
}

/// How the work of a pass is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Parents and children per host, hosts concurrently; vulnerability scans of all
    /// hosts afterwards.
    #[default]
    Spread,
    /// Every phase per host, hosts concurrently.
    PerHost,
    /// Every phase for all hosts before the next phase starts.
    PerPhase,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Spread => write!(f, "spread"),
            Strategy::PerHost => write!(f, "per_host"),
            Strategy::PerPhase => write!(f, "per_phase"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "spread" => Ok(Strategy::Spread),
            "per_host" => Ok(Strategy::PerHost),
            "per_phase" => Ok(Strategy::PerPhase),
            x => Err(format!("unknown strategy {x}")),
        }
    }
}

impl Serialize for Strategy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Strategy {
    /// Unknown strategies fall back to `spread`.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_else(|_| {
            warn!(strategy = s, "Invalid attack order, defaulting to spread.");
            Strategy::Spread
        }))
    }
}

/// A phase executed for a list of hosts one after another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub phase: Phase,
    /// MAC addresses of the hosts.
    pub hosts: Vec<String>,
}

/// Steps that must run sequentially.
pub type Lane = Vec<Step>;

/// Lanes that may run concurrently.
///
/// Only lanes within the same stage are allowed to be run concurrently.
pub type Stage = Vec<Lane>;

/// The ordered stages of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    pub stages: Vec<Stage>,
}

impl Plan {
    /// Orders the work of one pass over `hosts` according to `strategy`.
    ///
    /// Every strategy contains the same (host, phase) pairs; only the grouping
    /// differs.
    pub fn new(strategy: Strategy, hosts: &[String], phases: Phases) -> Self {
        let step = |phase: Phase, hosts: Vec<String>| Step { phase, hosts };
        let per_host_lanes = |filter: &dyn Fn(Phase) -> bool| -> Stage {
            hosts
                .iter()
                .map(|h| {
                    phases
                        .enabled()
                        .filter(|p| filter(*p))
                        .map(|p| step(p, vec![h.clone()]))
                        .collect::<Lane>()
                })
                .filter(|lane| !lane.is_empty())
                .collect()
        };
        let all_hosts = |phase: Phase| -> Stage { vec![vec![step(phase, hosts.to_vec())]] };

        let stages: Vec<Stage> = match strategy {
            Strategy::Spread => {
                let mut stages = vec![per_host_lanes(&|p| p != Phase::VulnScan)];
                if phases.vuln_scan {
                    stages.push(all_hosts(Phase::VulnScan));
                }
                stages
            }
            Strategy::PerHost => vec![per_host_lanes(&|_| true)],
            Strategy::PerPhase => phases.enabled().map(all_hosts).collect(),
        };
        let stages = if hosts.is_empty() {
            vec![]
        } else {
            stages.into_iter().filter(|s| !s.is_empty()).collect()
        };
        Self { stages }
    }

    /// All (host, phase) pairs in execution order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, Phase)> {
        self.stages.iter().flatten().flatten().flat_map(|step| {
            step.hosts
                .iter()
                .map(move |h| (h.as_str(), step.phase))
        })
    }
}
