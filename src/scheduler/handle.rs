// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::sync::Arc;

use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{OrchestratorStatus, Scheduler, SchedulerError};

/// A running scheduler.
///
/// Allows stopping the scheduler and reading its status while it runs.
pub struct OrchestratorHandle {
    handle: JoinHandle<Result<(), SchedulerError>>,
    cancel: CancellationToken,
    status: Arc<RwLock<OrchestratorStatus>>,
}

impl OrchestratorHandle {
    /// Spawns the scheduler loop.
    pub fn start(scheduler: Scheduler) -> Self {
        let cancel = scheduler.cancel.clone();
        let status = scheduler.status.clone();
        Self {
            handle: tokio::spawn(async move { scheduler.run().await }),
            cancel,
            status,
        }
    }

    /// Signals the scheduler to stop.
    ///
    /// Running action modules finish. The nmap batch and the discovery in flight
    /// are killed.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn status(&self) -> OrchestratorStatus {
        self.status.read().await.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits until the scheduler stopped.
    ///
    /// Must not be called again once it returned.
    pub async fn wait(&mut self) -> Result<(), SchedulerError> {
        (&mut self.handle)
            .await
            .map_err(|e| SchedulerError::Panicked(e.to_string()))?
    }
}
