// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Vulnerability scans with nmap scripts.
//!
//! A host is scanned port by port. Web ports are scanned with several small script
//! batches, every other port with the `vuln` category. The combined output is
//! parsed into findings which are stored in the [`VulnStore`](crate::storage::VulnStore).
mod batches;
pub mod parser;
mod runner;
mod scanner;
mod titles;

use thiserror::Error;

pub use batches::{Batch, MAX_SCRIPTS_PER_BATCH, batches_for, elide_redundant_ports};
pub use runner::{LambdaRunner, NmapRunner, ScriptRequest, ScriptRunner};
pub use scanner::{ScanReport, VulnScanner};
pub use titles::friendly_title;

use crate::{command::CommandError, storage::StorageError};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{0}")]
    Command(#[from] CommandError),
    #[error("no port of {0} returned any output")]
    NoOutput(String),
    #[error("scan of {0} was cancelled")]
    Cancelled(String),
    #[error("unable to store results: {0}")]
    Storage(#[from] StorageError),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ScanError {
    /// Returns true when a batch ran into its wall clock limit.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScanError::Command(CommandError::Timeout { .. }))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ScanError::Cancelled(_) | ScanError::Command(CommandError::Cancelled { .. })
        )
    }
}
