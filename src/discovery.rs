// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! The network discovery scanner refreshes the host table.
//!
//! The scheduler triggers it once at startup and whenever a pass found nothing to
//! do. Its results are picked up by reloading the host table afterwards.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::{self, CommandError};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{0}")]
    Command(#[from] CommandError),
    #[error("discovery exited with {0:?}")]
    Failed(Option<i32>),
}

#[async_trait]
pub trait Discovery: Send + Sync {
    /// Scans the network and updates the host table.
    async fn scan(&self, cancel: &CancellationToken) -> Result<(), DiscoveryError>;
}

/// Runs an external discovery scanner.
///
/// `{network}` and `{hosts_file}` within the arguments are replaced.
#[derive(Debug, Clone)]
pub struct CommandDiscovery {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandDiscovery {
    pub fn new(argv: &[String], timeout: Duration, network: &str, hosts_file: &str) -> Self {
        let values = HashMap::from([
            ("network", network.to_owned()),
            ("hosts_file", hosts_file.to_owned()),
        ]);
        Self {
            argv: command::substitute(argv, &values),
            timeout,
        }
    }
}

#[async_trait]
impl Discovery for CommandDiscovery {
    async fn scan(&self, cancel: &CancellationToken) -> Result<(), DiscoveryError> {
        info!("Running network discovery.");
        let output = command::run(&self.argv, self.timeout, cancel).await?;
        match output.code {
            Some(0) => Ok(()),
            code => Err(DiscoveryError::Failed(code)),
        }
    }
}

type ScanFn = dyn Fn() -> Result<(), DiscoveryError> + Send + Sync + 'static;

/// A discovery backed by a closure.
pub struct LambdaDiscovery {
    scan: Box<ScanFn>,
}

impl LambdaDiscovery {
    pub fn new<F>(scan: F) -> Self
    where
        F: Fn() -> Result<(), DiscoveryError> + Send + Sync + 'static,
    {
        Self {
            scan: Box::new(scan),
        }
    }
}

#[async_trait]
impl Discovery for LambdaDiscovery {
    async fn scan(&self, _: &CancellationToken) -> Result<(), DiscoveryError> {
        (self.scan)()
    }
}
