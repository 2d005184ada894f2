// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Configuration of the orchestrator.
//!
//! The configuration is read from `-c/--config` (`ORCHESTRATORD_CONFIG`), otherwise
//! from `$HOME/.config/orchestratord/orchestratord.toml` and finally from
//! `/etc/orchestratord/orchestratord.toml`. Selected keys can be overridden by
//! arguments or environment variables.
pub mod duration;
mod logging;

use std::{
    fmt::{self, Display, Formatter},
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ArgAction;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{LogFormat, Logging, SerLevel};

use crate::scheduling::{Phases, RetryPolicy, Strategy};

const ETC_CONFIG: &str = "/etc/orchestratord/orchestratord.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid target network {0}: {1}")]
    Network(String, String),
}

/// The `[scheduler]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    /// Ordering of the work within a pass.
    pub attack_order: Strategy,
    /// Maximum of concurrently running actions.
    pub max_concurrent: usize,
    /// Time to wait after a pass that had nothing to do.
    #[serde(with = "duration")]
    pub scan_interval: Duration,
    /// Granularity in which the idle wait checks for shutdown.
    #[serde(with = "duration")]
    pub idle_tick: Duration,
    /// Only hosts within this network are acted upon. A bare address is
    /// widened to `scan_network_prefix`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_network: Option<String>,
    pub scan_network_prefix: u8,
    pub run_parent_actions: bool,
    pub run_child_actions: bool,
    pub run_vuln_scan: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            attack_order: Strategy::default(),
            max_concurrent: 10,
            scan_interval: Duration::from_secs(180),
            idle_tick: Duration::from_secs(5),
            target_network: None,
            scan_network_prefix: 24,
            run_parent_actions: true,
            run_child_actions: true,
            run_vuln_scan: true,
        }
    }
}

impl Scheduler {
    pub fn phases(&self) -> Phases {
        Phases {
            parent: self.run_parent_actions,
            child: self.run_child_actions,
            vuln_scan: self.run_vuln_scan,
        }
    }

    /// Parses the target network.
    pub fn target_network(&self) -> Result<Option<IpNetwork>, ConfigError> {
        let Some(raw) = self.target_network.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let error = |e: String| ConfigError::Network(raw.to_owned(), e);
        if raw.contains('/') {
            let network: IpNetwork = raw.parse().map_err(|e| error(format!("{e}")))?;
            return IpNetwork::new(network.network(), network.prefix())
                .map(Some)
                .map_err(|e| error(format!("{e}")));
        }
        let ip: IpAddr = raw.parse().map_err(|e| error(format!("{e}")))?;
        let prefix = match ip {
            IpAddr::V4(_) => self.scan_network_prefix.min(32),
            IpAddr::V6(_) => self.scan_network_prefix.min(128),
        };
        let widened = IpNetwork::new(ip, prefix).map_err(|e| error(format!("{e}")))?;
        IpNetwork::new(widened.network(), prefix)
            .map(Some)
            .map_err(|e| error(format!("{e}")))
    }
}

/// The `[vuln_scan]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnScan {
    /// Path to the nmap executable.
    pub nmap: String,
    /// Timing template passed to nmap.
    pub aggressivity: String,
    /// Wall clock limit of a single nmap invocation.
    #[serde(with = "duration")]
    pub timeout: Duration,
    /// Limit of a single script within an invocation.
    #[serde(with = "duration")]
    pub script_timeout: Duration,
    /// Name of the status column of the vulnerability scan.
    pub status_key: String,
    /// Ports scanned with the web script batches.
    pub web_ports: Vec<u16>,
}

impl Default for VulnScan {
    fn default() -> Self {
        Self {
            nmap: "nmap".to_owned(),
            aggressivity: "-T2".to_owned(),
            timeout: Duration::from_secs(120),
            script_timeout: Duration::from_secs(30),
            status_key: "NmapVulnScanner".to_owned(),
            web_ports: vec![80, 443, 8080, 8443],
        }
    }
}

/// The `[storage]` section.
///
/// Relative paths are relative to `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub data_dir: PathBuf,
    pub hosts_file: PathBuf,
    pub actions_file: PathBuf,
    pub vulnerabilities_dir: PathBuf,
    pub vuln_summary_file: PathBuf,
    pub archive_dir: PathBuf,
    /// Copies the host table into the archive on startup.
    pub archive_on_startup: bool,
    /// Starts with an empty host table.
    pub clear_hosts_on_startup: bool,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/orchestratord"),
            hosts_file: PathBuf::from("hosts.csv"),
            actions_file: PathBuf::from("/etc/orchestratord/actions.json"),
            vulnerabilities_dir: PathBuf::from("vulnerabilities"),
            vuln_summary_file: PathBuf::from("vulnerabilities/vuln_summary.csv"),
            archive_dir: PathBuf::from("archives"),
            archive_on_startup: true,
            clear_hosts_on_startup: false,
        }
    }
}

impl Storage {
    /// Resolves `path` relative to the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.data_dir.join(path)
    }
}

/// The `[discovery]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Discovery {
    /// Command line of the discovery scanner. `{network}` and `{hosts_file}` are
    /// replaced. Without a command no discovery is run.
    pub command: Vec<String>,
    #[serde(with = "duration")]
    pub timeout: Duration,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            command: vec![],
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub vuln_scan: VulnScan,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub discovery: Discovery,
    #[serde(default)]
    pub log: Logging,
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", toml::to_string_pretty(self).unwrap_or_default())
    }
}

impl Config {
    fn load_etc() -> Option<Self> {
        let config = std::fs::read_to_string(ETC_CONFIG).ok()?;
        toml::from_str(&config).ok()
    }

    fn load_user() -> Option<Self> {
        let home = std::env::var("HOME").ok()?;
        let path = format!("{home}/.config/orchestratord/orchestratord.toml");
        let config = std::fs::read_to_string(path).ok()?;
        toml::from_str(&config).ok()
    }

    /// Reads a configuration file. Unlike the default locations a given file
    /// must exist and be valid.
    pub fn from_file<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        tracing::debug!(path=?path, "loading config");
        let config = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&config)?)
    }

    /// The arguments understood by the daemon.
    pub fn command() -> clap::Command {
        clap::Command::new("orchestratord")
            .about("Schedules attack actions and vulnerability scans against discovered hosts")
            .arg(
                clap::Arg::new("config")
                    .short('c')
                    .env("ORCHESTRATORD_CONFIG")
                    .long("config")
                    .action(ArgAction::Set)
                    .value_parser(clap::builder::PathBufValueParser::new())
                    .help("path to toml config file"),
            )
            .arg(
                clap::Arg::new("attack-order")
                    .env("ATTACK_ORDER")
                    .long("attack-order")
                    .value_parser(["spread", "per_host", "per_phase"])
                    .help("ordering of the work within a pass"),
            )
            .arg(
                clap::Arg::new("max-concurrent")
                    .env("MAX_CONCURRENT")
                    .long("max-concurrent")
                    .value_parser(clap::value_parser!(usize))
                    .help("maximum of concurrently running actions"),
            )
            .arg(
                clap::Arg::new("scan-interval")
                    .env("SCAN_INTERVAL")
                    .long("scan-interval")
                    .value_name("DURATION")
                    .value_parser(duration::parse)
                    .help("time to wait when there is nothing to do (e.g. 180s, 5m)"),
            )
            .arg(
                clap::Arg::new("target-network")
                    .env("TARGET_NETWORK")
                    .long("target-network")
                    .value_name("CIDR|IP")
                    .help("only act upon hosts within this network"),
            )
            .arg(
                clap::Arg::new("data-dir")
                    .env("DATA_DIR")
                    .long("data-dir")
                    .value_parser(clap::builder::PathBufValueParser::new())
                    .help("directory of the host table and the scan results"),
            )
            .arg(
                clap::Arg::new("actions-file")
                    .env("ACTIONS_FILE")
                    .long("actions-file")
                    .value_parser(clap::builder::PathBufValueParser::new())
                    .help("path to the action definitions"),
            )
            .arg(
                clap::Arg::new("clear-hosts-on-startup")
                    .env("CLEAR_HOSTS_ON_STARTUP")
                    .long("clear-hosts-on-startup")
                    .action(ArgAction::SetTrue)
                    .help("start with an empty host table"),
            )
    }

    /// Creates the configuration out of the parsed arguments.
    pub fn from_matches(cmds: &clap::ArgMatches) -> Result<Self, ConfigError> {
        let mut config = match cmds.get_one::<PathBuf>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::load_user()
                .or_else(Self::load_etc)
                .unwrap_or_default(),
        };
        if let Some(order) = cmds.get_one::<String>("attack-order") {
            config.scheduler.attack_order = order.parse().unwrap_or_default();
        }
        if let Some(max) = cmds.get_one::<usize>("max-concurrent") {
            config.scheduler.max_concurrent = *max;
        }
        if let Some(interval) = cmds.get_one::<Duration>("scan-interval") {
            config.scheduler.scan_interval = *interval;
        }
        if let Some(network) = cmds.get_one::<String>("target-network") {
            config.scheduler.target_network = Some(network.clone());
        }
        if let Some(path) = cmds.get_one::<PathBuf>("data-dir") {
            config.storage.data_dir = path.clone();
        }
        if let Some(path) = cmds.get_one::<PathBuf>("actions-file") {
            config.storage.actions_file = path.clone();
        }
        if cmds.get_flag("clear-hosts-on-startup") {
            config.storage.clear_hosts_on_startup = true;
        }
        // fail early instead of on the first pass
        config.scheduler.target_network()?;
        Ok(config)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_matches(&Self::command().get_matches())
    }
}
