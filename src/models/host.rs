// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::collections::HashMap;

use super::ActionStatus;

/// MAC address of the synthetic record standalone actions are tracked in.
pub const STANDALONE_MAC: &str = "STANDALONE";

/// A host as known by the discovery scanner together with the state of every action
/// that ran against it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostRecord {
    /// Identifies the host across rescans.
    pub mac: String,
    /// Last known address; may change between rescans.
    pub ip: String,
    /// Hostnames as reported by discovery, `;` separated.
    pub hostnames: String,
    /// Whether the host answered during the last discovery.
    pub alive: bool,
    /// Open ports in the order discovery reported them.
    pub ports: Vec<String>,
    /// Status per action name.
    pub statuses: HashMap<String, ActionStatus>,
}

impl HostRecord {
    /// Creates a host record without any recorded action.
    pub fn new<M, I>(mac: M, ip: I) -> Self
    where
        M: Into<String>,
        I: Into<String>,
    {
        Self {
            mac: mac.into(),
            ip: ip.into(),
            ..Default::default()
        }
    }

    /// The record standalone actions are tracked in.
    pub fn standalone() -> Self {
        Self {
            mac: STANDALONE_MAC.to_owned(),
            ip: STANDALONE_MAC.to_owned(),
            hostnames: STANDALONE_MAC.to_owned(),
            alive: false,
            ports: vec!["0".to_owned()],
            statuses: HashMap::new(),
        }
    }

    /// Returns true for the synthetic standalone record.
    pub fn is_standalone(&self) -> bool {
        self.mac == STANDALONE_MAC
    }

    /// Returns true when the given port is open.
    pub fn has_port(&self, port: &str) -> bool {
        self.ports.iter().any(|p| p == port)
    }

    /// The first non empty hostname.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .split(';')
            .map(str::trim)
            .find(|h| !h.is_empty())
    }

    /// The recorded status of an action, `NeverAttempted` when there is none.
    pub fn status(&self, action: &str) -> ActionStatus {
        self.statuses.get(action).cloned().unwrap_or_default()
    }

    /// Overwrites the status of an action.
    pub fn set_status<S: Into<String>>(&mut self, action: S, status: ActionStatus) {
        self.statuses.insert(action.into(), status);
    }
}

/// The complete host table.
///
/// Besides the hosts it keeps the order of the action columns so that rewriting the
/// table does not reorder them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostTable {
    /// Action status columns in persisted order.
    pub action_columns: Vec<String>,
    /// Hosts in persisted order.
    pub hosts: Vec<HostRecord>,
}

impl HostTable {
    /// Adds a status column unless it already exists.
    pub fn register_column(&mut self, name: &str) {
        if !self.action_columns.iter().any(|c| c == name) {
            self.action_columns.push(name.to_owned());
        }
    }

    /// Finds a host by its MAC address.
    pub fn get(&self, mac: &str) -> Option<&HostRecord> {
        self.hosts.iter().find(|h| h.mac == mac)
    }

    /// Finds a host by its MAC address.
    pub fn get_mut(&mut self, mac: &str) -> Option<&mut HostRecord> {
        self.hosts.iter_mut().find(|h| h.mac == mac)
    }

    /// Returns the standalone record, creating it when missing.
    pub fn standalone_mut(&mut self) -> &mut HostRecord {
        let idx = match self.hosts.iter().position(HostRecord::is_standalone) {
            Some(idx) => idx,
            None => {
                self.hosts.push(HostRecord::standalone());
                self.hosts.len() - 1
            }
        };
        &mut self.hosts[idx]
    }

    /// Sets the status of an action on a host and registers the column.
    ///
    /// Returns the previous status or None when the host is unknown.
    pub fn transition(
        &mut self,
        mac: &str,
        action: &str,
        status: ActionStatus,
    ) -> Option<ActionStatus> {
        self.register_column(action);
        let host = if mac == STANDALONE_MAC {
            self.standalone_mut()
        } else {
            self.get_mut(mac)?
        };
        let previous = host.status(action);
        host.set_status(action, status);
        Some(previous)
    }

    /// Hosts that were discovered, i.e. everything but the standalone record.
    pub fn discovered(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.iter().filter(|h| !h.is_standalone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_record_is_created_once() {
        let mut table = HostTable::default();
        table.standalone_mut().ip = "changed".to_owned();
        table.standalone_mut();
        assert_eq!(table.hosts.len(), 1);
        assert_eq!(table.hosts[0].ip, "changed");
    }

    #[test]
    fn transition_registers_column() {
        let mut table = HostTable {
            action_columns: vec![],
            hosts: vec![HostRecord::new("aa:bb", "10.0.0.1")],
        };
        let previous = table.transition("aa:bb", "SSHBruteforce", ActionStatus::from("success_20240101_000000"));
        assert_eq!(previous, Some(ActionStatus::NeverAttempted));
        assert_eq!(table.action_columns, vec!["SSHBruteforce".to_owned()]);
        assert!(table.hosts[0].status("SSHBruteforce").is_success());
        assert_eq!(table.transition("unknown", "SSHBruteforce", ActionStatus::NeverAttempted), None);
    }

    #[test]
    fn first_hostname() {
        let mut host = HostRecord::new("aa", "10.0.0.1");
        assert_eq!(host.hostname(), None);
        host.hostnames = ";router.lan;gw".to_owned();
        assert_eq!(host.hostname(), Some("router.lan"));
    }
}
