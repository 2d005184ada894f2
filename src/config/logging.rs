// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{collections::HashMap, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{Level, metadata::ParseLevelError};
use tracing_subscriber::{
    EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

/// A tracing level that can be read from and written to the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SerLevel(Level);

impl Default for SerLevel {
    fn default() -> Self {
        Self(Level::INFO)
    }
}

impl FromStr for SerLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::from_str(s).map(SerLevel)
    }
}

impl From<Level> for SerLevel {
    fn from(level: Level) -> Self {
        SerLevel(level)
    }
}

impl From<SerLevel> for Level {
    fn from(ser_level: SerLevel) -> Self {
        ser_level.0
    }
}

impl Serialize for SerLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for SerLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Level::from_str(&s)
            .map(SerLevel)
            .map_err(serde::de::Error::custom)
    }
}

/// Output format of the log lines.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    /// One short line per event, for the small appliance display.
    Compact,
}

/// The `[log]` section.
///
/// `level` is the default for every target, `additional` overrides it per target,
/// e.g. `additional = { "orchestrator::vuln" = "DEBUG" }`. `RUST_LOG` replaces both.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub level: SerLevel,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub additional: HashMap<String, SerLevel>,
    pub format: LogFormat,
    /// Logs the duration of every host and port scan when its span closes.
    pub scan_timings: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: SerLevel::default(),
            additional: HashMap::new(),
            format: LogFormat::Full,
            scan_timings: true,
        }
    }
}

impl Logging {
    /// Maps the `-v` count of a command line tool to a level.
    pub fn verbose(count: u8) -> Self {
        let level = match count {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level: level.into(),
            format: LogFormat::Compact,
            scan_timings: false,
            ..Default::default()
        }
    }

    /// Filter directives, sorted by target so that the output is stable.
    fn directives(&self) -> String {
        let mut targets = self
            .additional
            .iter()
            .map(|(target, level)| format!("{target}={}", Level::from(*level)))
            .collect::<Vec<_>>();
        targets.sort();
        std::iter::once(Level::from(self.level).to_string())
            .chain(targets)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }

    /// Installs the global subscriber writing to stderr.
    ///
    /// Stdout stays free for results printed by `vulnctl`.
    pub fn init(&self) {
        let spans = if self.scan_timings {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(spans);
        let registry = tracing_subscriber::registry().with(self.filter());
        match self.format {
            LogFormat::Full => registry.with(layer).init(),
            LogFormat::Compact => registry.with(layer.compact().with_target(false)).init(),
        }
    }
}
