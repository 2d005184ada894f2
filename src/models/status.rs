// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{convert::Infallible, fmt::Display, str::FromStr};

use chrono::NaiveDateTime;

use super::Outcome;

/// Format of the timestamp embedded into persisted status strings.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const SUCCESS_PREFIX: &str = "success_";
const FAILED_PREFIX: &str = "failed_";
const NO_CREDS_PREFIX: &str = "no_creds_";

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// State of a single (host, action) pair.
///
/// The host table persists this as a compact string (`success_<ts>`,
/// `failed_<n>_<ts>`, `no_creds_<ts>` or empty). Parsing never fails: values
/// that don't follow one of the known encodings are kept verbatim as
/// `Unrecognized` so that writing the table back does not alter them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionStatus {
    /// The action never ran against this host.
    #[default]
    NeverAttempted,
    /// The last attempt succeeded.
    Success {
        /// When the attempt finished.
        at: NaiveDateTime,
    },
    /// The last attempts failed.
    Failed {
        /// Consecutive failures, `None` for the legacy `failed_<ts>` encoding.
        count: Option<u32>,
        /// When the last attempt finished.
        at: NaiveDateTime,
    },
    /// The resource the action depends on is exhausted. Terminal.
    NoCreds {
        /// When the attempt finished.
        at: NaiveDateTime,
    },
    /// Anything that cannot be parsed; handled like a first failure.
    Unrecognized(String),
}

impl ActionStatus {
    /// Returns true when the last attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ActionStatus::Success { .. })
    }

    /// Returns true when no status was recorded yet.
    pub fn is_never_attempted(&self) -> bool {
        matches!(self, ActionStatus::NeverAttempted)
    }

    /// Number of consecutive failures.
    ///
    /// The legacy encoding without a count as well as unrecognized values count
    /// as a single failure.
    pub fn failure_count(&self) -> u32 {
        match self {
            ActionStatus::Failed { count, .. } => count.unwrap_or(1),
            ActionStatus::Unrecognized(_) => 1,
            _ => 0,
        }
    }

    /// The time the status was recorded, if known.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            ActionStatus::Success { at }
            | ActionStatus::Failed { at, .. }
            | ActionStatus::NoCreds { at } => Some(*at),
            ActionStatus::NeverAttempted | ActionStatus::Unrecognized(_) => None,
        }
    }

    /// Calculates the status following an execution that finished at `at`.
    pub fn after(&self, outcome: Outcome, at: NaiveDateTime) -> ActionStatus {
        match outcome {
            Outcome::Success => ActionStatus::Success { at },
            Outcome::NoCredsFound => ActionStatus::NoCreds { at },
            Outcome::Failed => ActionStatus::Failed {
                count: Some(self.failure_count().saturating_add(1)),
                at,
            },
        }
    }
}

impl FromStr for ActionStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(ActionStatus::NeverAttempted);
        }
        let unrecognized = || ActionStatus::Unrecognized(s.to_owned());
        if let Some(ts) = s.strip_prefix(SUCCESS_PREFIX) {
            return Ok(parse_timestamp(ts)
                .map(|at| ActionStatus::Success { at })
                .unwrap_or_else(unrecognized));
        }
        if let Some(ts) = s.strip_prefix(NO_CREDS_PREFIX) {
            return Ok(parse_timestamp(ts)
                .map(|at| ActionStatus::NoCreds { at })
                .unwrap_or_else(unrecognized));
        }
        if let Some(rest) = s.strip_prefix(FAILED_PREFIX) {
            if let Some((count, ts)) = rest.split_once('_') {
                if let (Ok(count), Some(at)) = (count.parse::<u32>(), parse_timestamp(ts)) {
                    return Ok(ActionStatus::Failed {
                        count: Some(count),
                        at,
                    });
                }
            }
            return Ok(parse_timestamp(rest)
                .map(|at| ActionStatus::Failed { count: None, at })
                .unwrap_or_else(unrecognized));
        }
        Ok(unrecognized())
    }
}

impl Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::NeverAttempted => Ok(()),
            ActionStatus::Success { at } => {
                write!(f, "{SUCCESS_PREFIX}{}", at.format(TIMESTAMP_FORMAT))
            }
            ActionStatus::Failed { count: Some(n), at } => {
                write!(f, "{FAILED_PREFIX}{n}_{}", at.format(TIMESTAMP_FORMAT))
            }
            ActionStatus::Failed { count: None, at } => {
                write!(f, "{FAILED_PREFIX}{}", at.format(TIMESTAMP_FORMAT))
            }
            ActionStatus::NoCreds { at } => {
                write!(f, "{NO_CREDS_PREFIX}{}", at.format(TIMESTAMP_FORMAT))
            }
            ActionStatus::Unrecognized(raw) => write!(f, "{raw}"),
        }
    }
}

impl From<&str> for ActionStatus {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(x) => x,
            Err(e) => match e {},
        }
    }
}
