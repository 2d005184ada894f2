// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{collections::BTreeSet, fmt::Display};

use serde::{Deserialize, Serialize};

const LIST_SEPARATOR: &str = ", ";

/// How certain a finding is.
///
/// The order of the variants reflects the severity, `Vulnerable` being the highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum FindingState {
    /// The script reported output that is worth looking at, without a vulnerable state.
    #[default]
    #[serde(rename = "FOUND")]
    Found,
    /// `State: LIKELY VULNERABLE`
    #[serde(rename = "LIKELY_VULNERABLE")]
    LikelyVulnerable,
    /// `State: VULNERABLE`
    #[serde(rename = "VULNERABLE")]
    Vulnerable,
}

impl Display for FindingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingState::Found => write!(f, "FOUND"),
            FindingState::LikelyVulnerable => write!(f, "LIKELY_VULNERABLE"),
            FindingState::Vulnerable => write!(f, "VULNERABLE"),
        }
    }
}

/// A single result extracted from the output of a scan script.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Finding {
    /// Port (e.g. `445/tcp`) or `host` for host scripts. Comma joined after merging.
    pub port: String,
    /// Service name of the port. Comma joined after merging.
    pub service: String,
    /// Identifier of the script that produced the finding.
    pub script_id: String,
    /// Human readable title.
    pub title: String,
    /// Certainty of the finding.
    pub state: FindingState,
    /// CVE identifiers mentioned by the script.
    pub cves: BTreeSet<String>,
    /// Risk factor as reported by the script.
    #[serde(default)]
    pub risk: String,
    /// Free text output of the script.
    #[serde(default)]
    pub description: String,
    /// Disclosure date as reported by the script.
    #[serde(default)]
    pub disclosure_date: String,
    /// URLs listed in the references section.
    #[serde(default)]
    pub references: Vec<String>,
}

fn append_unique(list: &mut String, value: &str) {
    if value.is_empty() || list.split(LIST_SEPARATOR).any(|x| x == value) {
        return;
    }
    if !list.is_empty() {
        list.push_str(LIST_SEPARATOR);
    }
    list.push_str(value);
}

impl Finding {
    /// Merges another finding of the same script into this one.
    ///
    /// Ports and services are accumulated, CVEs and references are unified and the
    /// more severe state wins.
    pub fn absorb(&mut self, other: Finding) {
        for port in other.port.split(LIST_SEPARATOR) {
            append_unique(&mut self.port, port);
        }
        for service in other.service.split(LIST_SEPARATOR) {
            append_unique(&mut self.service, service);
        }
        self.cves.extend(other.cves);
        for reference in other.references {
            if !self.references.contains(&reference) {
                self.references.push(reference);
            }
        }
        self.state = self.state.max(other.state);
        if self.risk.is_empty() {
            self.risk = other.risk;
        }
        if self.description.is_empty() {
            self.description = other.description;
        }
        if self.disclosure_date.is_empty() {
            self.disclosure_date = other.disclosure_date;
        }
    }

    /// The label of this finding within the vulnerability summary.
    ///
    /// The title annotated with the sorted CVE ids, if there are any.
    pub fn label(&self) -> String {
        if self.cves.is_empty() {
            self.title.clone()
        } else {
            let cves = self.cves.iter().cloned().collect::<Vec<_>>().join(LIST_SEPARATOR);
            format!("{} ({cves})", self.title)
        }
    }

    /// Returns true for confirmed or likely vulnerabilities.
    pub fn is_vulnerable(&self) -> bool {
        self.state >= FindingState::LikelyVulnerable
    }
}

/// A row of the vulnerability summary table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VulnSummaryRow {
    /// Address of the host.
    pub ip: String,
    /// Hostnames of the host.
    pub hostname: String,
    /// MAC address of the host.
    pub mac: String,
    /// Comma separated list of scanned ports.
    pub ports: String,
    /// Labels of all findings.
    pub labels: BTreeSet<String>,
}
