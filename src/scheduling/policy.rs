// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{fmt::Display, time::Duration};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::ActionStatus;

/// Decides whether an action may run again based on its last recorded status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Allows successful actions to run again after `success_retry_delay`.
    pub retry_on_success: bool,
    #[serde(with = "crate::config::duration")]
    pub success_retry_delay: Duration,
    /// Allows failed actions to run again after `failed_retry_delay`.
    pub retry_on_failure: bool,
    #[serde(with = "crate::config::duration")]
    pub failed_retry_delay: Duration,
    /// Consecutive failures after which an action is not retried anymore.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_on_success: true,
            success_retry_delay: Duration::from_secs(300),
            retry_on_failure: true,
            failed_retry_delay: Duration::from_secs(180),
            max_retries: 3,
        }
    }
}

/// Why an action was not executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The parent action did not succeed on this host yet.
    DependencyNotMet {
        /// Name of the parent action.
        parent: String,
    },
    /// The retry delay of the last attempt is not over yet.
    RetryDelay {
        /// Time until the action is eligible again.
        remaining: Duration,
    },
    /// The action failed too often.
    MaxRetries {
        /// Consecutive failures.
        count: u32,
        /// Configured maximum.
        max: u32,
    },
    /// The action exhausted its credential list on this host.
    CredentialsExhausted,
    /// Retrying is switched off for the last outcome.
    RetryDisabled,
}

impl SkipReason {
    /// Returns true when the reason cannot change without external intervention.
    ///
    /// Dependencies are not terminal on their own, see `scheduling::is_gated`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SkipReason::MaxRetries { .. }
                | SkipReason::CredentialsExhausted
                | SkipReason::RetryDisabled
        )
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DependencyNotMet { parent } => {
                write!(f, "dependency {parent} not met")
            }
            SkipReason::RetryDelay { remaining } => {
                write!(f, "retry possible in {}s", remaining.as_secs())
            }
            SkipReason::MaxRetries { count, max } => {
                write!(f, "max retries reached ({count}/{max})")
            }
            SkipReason::CredentialsExhausted => write!(f, "credentials exhausted"),
            SkipReason::RetryDisabled => write!(f, "retry disabled"),
        }
    }
}

/// The result of evaluating a status against a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run,
    Skip(SkipReason),
}

impl Decision {
    pub fn is_run(&self) -> bool {
        matches!(self, Decision::Run)
    }
}

fn remaining(since: NaiveDateTime, now: NaiveDateTime, delay: Duration) -> Option<Duration> {
    let elapsed = (now - since).to_std().unwrap_or_default();
    if now < since {
        // a timestamp in the future counts as just now
        return Some(delay);
    }
    delay.checked_sub(elapsed).filter(|r| !r.is_zero())
}

impl RetryPolicy {
    /// Evaluates the status of a (host, action) pair.
    ///
    /// The decision depends only on the arguments. Unrecognized statuses are
    /// handled like a first failure without a known time.
    pub fn evaluate(&self, status: &ActionStatus, now: NaiveDateTime) -> Decision {
        match status {
            ActionStatus::NeverAttempted => Decision::Run,
            ActionStatus::NoCreds { .. } => Decision::Skip(SkipReason::CredentialsExhausted),
            ActionStatus::Success { at } => {
                if !self.retry_on_success {
                    return Decision::Skip(SkipReason::RetryDisabled);
                }
                match remaining(*at, now, self.success_retry_delay) {
                    Some(remaining) => Decision::Skip(SkipReason::RetryDelay { remaining }),
                    None => Decision::Run,
                }
            }
            ActionStatus::Failed { .. } | ActionStatus::Unrecognized(_) => {
                if !self.retry_on_failure {
                    return Decision::Skip(SkipReason::RetryDisabled);
                }
                let count = status.failure_count();
                if count >= self.max_retries {
                    return Decision::Skip(SkipReason::MaxRetries {
                        count,
                        max: self.max_retries,
                    });
                }
                let remaining = status
                    .timestamp()
                    .and_then(|at| remaining(at, now, self.failed_retry_delay));
                match remaining {
                    Some(remaining) => Decision::Skip(SkipReason::RetryDelay { remaining }),
                    None => Decision::Run,
                }
            }
        }
    }

    /// Shorthand for `evaluate(..).is_run()`.
    pub fn should_run(&self, status: &ActionStatus, now: NaiveDateTime) -> bool {
        self.evaluate(status, now).is_run()
    }

    /// Returns true when the status will never become eligible under this policy.
    pub fn is_terminal(&self, status: &ActionStatus) -> bool {
        // the time is irrelevant for terminal reasons
        match self.evaluate(status, NaiveDateTime::MIN) {
            Decision::Run => false,
            Decision::Skip(reason) => reason.is_terminal(),
        }
    }
}
