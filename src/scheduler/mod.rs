// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! The orchestration loop.
//!
//! A cycle reloads the host table, plans a pass according to the configured
//! attack order and executes it. Lanes of a stage run concurrently, bounded by a
//! semaphore. Every status transition is written through to the host store before
//! the next one is made.
//!
//! When a pass executes nothing the network is rescanned, the pass is repeated on
//! the fresh table and the standalone actions are tried. When all of that executed
//! nothing the scheduler waits for the scan interval.
mod handle;
mod status;
#[cfg(test)]
mod tests;

use std::{net::IpAddr, ops::AddAssign, sync::Arc};

use chrono::NaiveDateTime;
use futures::future::join_all;
use ipnetwork::IpNetwork;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use handle::OrchestratorHandle;
pub use status::{OrchestratorPhase, OrchestratorStatus};

use crate::{
    actions::{Action, ActionError, ActionRegistry},
    config::{self, ConfigError, duration::format_duration},
    discovery::Discovery,
    models::{ActionDescriptor, ActionStatus, HostRecord, HostTable, Outcome, STANDALONE_MAC, Target},
    scheduling::{
        Decision, Lane, Phase, Phases, Plan, RetryPolicy, dependency, is_applicable, is_exhausted,
    },
    storage::{HostStore, StorageError},
};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("host store: {0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Action(#[from] ActionError),
    #[error("the concurrency limit was closed")]
    Closed,
    #[error("scheduler task failed: {0}")]
    Panicked(String),
}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Panicked(value.to_string())
    }
}

/// Executions of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub actions: usize,
    pub vuln_scans: usize,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.actions + self.vuln_scans
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        self.actions += rhs.actions;
        self.vuln_scans += rhs.vuln_scans;
    }
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Decides which action runs against which host and executes it.
pub struct Scheduler {
    config: config::Scheduler,
    policy: RetryPolicy,
    registry: ActionRegistry,
    vuln_scan: Option<Arc<dyn Action>>,
    discovery: Option<Arc<dyn Discovery>>,
    hosts: Arc<dyn HostStore>,
    network: Option<IpNetwork>,
    table: Mutex<HostTable>,
    semaphore: Semaphore,
    status: Arc<RwLock<OrchestratorStatus>>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        config: config::Scheduler,
        policy: RetryPolicy,
        registry: ActionRegistry,
        hosts: Arc<dyn HostStore>,
        cancel: CancellationToken,
    ) -> Result<Self, SchedulerError> {
        let network = config.target_network()?;
        Ok(Self {
            semaphore: Semaphore::new(config.max_concurrent.max(1)),
            config,
            policy,
            registry,
            vuln_scan: None,
            discovery: None,
            hosts,
            network,
            table: Mutex::new(HostTable::default()),
            status: Arc::new(RwLock::new(OrchestratorStatus::default())),
            cancel,
        })
    }

    /// Sets the action executed in the vulnerability scan phase.
    pub fn with_vuln_scan(mut self, action: Arc<dyn Action>) -> Self {
        self.vuln_scan = Some(action);
        self
    }

    /// Sets the scanner refreshing the host table when there is nothing to do.
    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub async fn status(&self) -> OrchestratorStatus {
        self.status.read().await.clone()
    }

    fn phases(&self) -> Phases {
        let mut phases = self.config.phases();
        phases.vuln_scan &= self.vuln_scan.is_some();
        phases
    }

    fn is_target(&self, host: &HostRecord) -> bool {
        if !host.alive {
            return false;
        }
        match &self.network {
            None => true,
            Some(network) => host
                .ip
                .parse::<IpAddr>()
                .map(|ip| network.contains(ip))
                .unwrap_or(false),
        }
    }

    /// Loads the host table and returns the hosts to act upon.
    async fn reload(&self) -> Result<Vec<String>, SchedulerError> {
        let hosts = self.hosts.clone();
        let mut table = tokio::task::spawn_blocking(move || hosts.load()).await??;
        let descriptors = self
            .registry
            .host_actions()
            .chain(self.registry.standalone())
            .chain(self.vuln_scan.iter())
            .map(|a| a.descriptor().name.clone())
            .collect::<Vec<_>>();
        for name in descriptors {
            table.register_column(&name);
        }
        let hosts = table
            .discovered()
            .filter(|h| self.is_target(h))
            .map(|h| h.mac.clone())
            .collect();
        *self.table.lock().await = table;
        Ok(hosts)
    }

    async fn snapshot(&self, mac: &str) -> Option<HostRecord> {
        let mut table = self.table.lock().await;
        if mac == STANDALONE_MAC {
            Some(table.standalone_mut().clone())
        } else {
            table.get(mac).cloned()
        }
    }

    fn phase_actions(&self, phase: Phase) -> Vec<Arc<dyn Action>> {
        match phase {
            Phase::Parent => self.registry.parents().cloned().collect(),
            Phase::Child => self.registry.children().cloned().collect(),
            Phase::VulnScan => self.vuln_scan.iter().cloned().collect(),
        }
    }

    fn is_host_exhausted(&self, record: &HostRecord) -> bool {
        let mut actions: Vec<&ActionDescriptor> = self
            .registry
            .host_actions()
            .map(|a| a.descriptor())
            .collect();
        if self.phases().vuln_scan {
            actions.extend(self.vuln_scan.iter().map(|a| a.descriptor()));
        }
        is_exhausted(
            &self.policy,
            &actions,
            |name| self.registry.descriptor(name),
            record,
        )
    }

    /// Persists the status following `outcome` and returns it.
    async fn record(
        &self,
        mac: &str,
        action: &str,
        outcome: Outcome,
    ) -> Result<Option<ActionStatus>, SchedulerError> {
        let mut table = self.table.lock().await;
        let previous = if mac == STANDALONE_MAC {
            table.standalone_mut().status(action)
        } else {
            match table.get(mac) {
                Some(host) => host.status(action),
                None => {
                    warn!(mac, action, "Host vanished from the host table, dropping result.");
                    return Ok(None);
                }
            }
        };
        let next = previous.after(outcome, now());
        table.transition(mac, action, next.clone());
        // the lock is held until the table is written
        let (hosts, snapshot) = (self.hosts.clone(), table.clone());
        tokio::task::spawn_blocking(move || hosts.store(&snapshot)).await??;
        info!(mac, action, %previous, %next, "Status changed.");
        Ok(Some(next))
    }

    /// Executes a single action and records its outcome.
    ///
    /// Returns `None` when the action did not run to completion because of a
    /// shutdown.
    async fn run_item(
        &self,
        action: &Arc<dyn Action>,
        target: Target,
        record: HostRecord,
    ) -> Result<Option<Outcome>, SchedulerError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SchedulerError::Closed)?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let name = &action.descriptor().name;
        {
            let mut status = self.status.write().await;
            status.phase = OrchestratorPhase::Attacking;
            status.current_action = Some(name.clone());
            status.detail = target.to_string();
        }
        info!(action = %name, %target, "Executing action.");
        let outcome = match action.execute(&target, &record).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                info!(action = %name, %target, "Action interrupted by shutdown.");
                return Ok(None);
            }
            Err(e) => {
                error!(action = %name, %target, error = %e, "Action raised an error.");
                Outcome::Failed
            }
        };
        self.status.write().await.attacks += 1;
        self.record(&record.mac, name, outcome).await?;
        Ok(Some(outcome))
    }

    /// Runs the actions of a phase against a host.
    async fn run_host_phase(&self, phase: Phase, mac: &str) -> Result<Tally, SchedulerError> {
        let mut tally = Tally::default();
        let Some(record) = self.snapshot(mac).await else {
            return Ok(tally);
        };
        if self.is_host_exhausted(&record) {
            debug!(ip = %record.ip, %phase, "Host is exhausted, skipping.");
            return Ok(tally);
        }
        for action in self.phase_actions(phase) {
            if self.cancel.is_cancelled() {
                break;
            }
            // statuses may have changed by the previous action
            let Some(record) = self.snapshot(mac).await else {
                break;
            };
            let descriptor = action.descriptor();
            if !is_applicable(descriptor, &record) {
                continue;
            }
            if let Some(reason) = dependency(descriptor, &record) {
                debug!(ip = %record.ip, action = %descriptor.name, %reason, "Skipping action.");
                continue;
            }
            if let Decision::Skip(reason) = self
                .policy
                .evaluate(&record.status(&descriptor.name), now())
            {
                debug!(ip = %record.ip, action = %descriptor.name, %reason, "Skipping action.");
                continue;
            }
            let target = Target::Host {
                ip: record.ip.clone(),
                port: descriptor.port,
            };
            if self.run_item(&action, target, record).await?.is_some() {
                match phase {
                    Phase::VulnScan => tally.vuln_scans += 1,
                    _ => tally.actions += 1,
                }
            }
        }
        Ok(tally)
    }

    async fn run_lane(&self, lane: &Lane) -> Result<Tally, SchedulerError> {
        let mut tally = Tally::default();
        for step in lane {
            for mac in &step.hosts {
                if self.cancel.is_cancelled() {
                    return Ok(tally);
                }
                tally += self.run_host_phase(step.phase, mac).await?;
            }
        }
        Ok(tally)
    }

    /// Reloads the host table and executes one pass over all target hosts.
    pub async fn run_pass(&self) -> Result<Tally, SchedulerError> {
        let hosts = self.reload().await?;
        let plan = Plan::new(self.config.attack_order, &hosts, self.phases());
        debug!(
            hosts = hosts.len(),
            stages = plan.stages.len(),
            strategy = %self.config.attack_order,
            "Planned pass."
        );
        let mut tally = Tally::default();
        for stage in &plan.stages {
            if self.cancel.is_cancelled() {
                break;
            }
            let results = join_all(stage.iter().map(|lane| self.run_lane(lane))).await;
            for result in results {
                tally += result?;
            }
        }
        if tally.vuln_scans > 0 {
            if let Some(vuln_scan) = &self.vuln_scan {
                vuln_scan.finish_pass().await?;
            }
        }
        Ok(tally)
    }

    /// Tries the standalone actions until the first one succeeds.
    pub async fn run_standalone(&self) -> Result<usize, SchedulerError> {
        let mut executed = 0;
        let actions: Vec<Arc<dyn Action>> = self.registry.standalone().cloned().collect();
        for action in actions {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(record) = self.snapshot(STANDALONE_MAC).await else {
                break;
            };
            let name = &action.descriptor().name;
            if let Decision::Skip(reason) = self.policy.evaluate(&record.status(name), now()) {
                debug!(action = %name, %reason, "Skipping standalone action.");
                continue;
            }
            match self.run_item(&action, Target::Standalone, record).await? {
                Some(Outcome::Success) => {
                    executed += 1;
                    info!(action = %name, "Standalone action succeeded, ending the round.");
                    break;
                }
                Some(_) => executed += 1,
                None => {}
            }
        }
        Ok(executed)
    }

    async fn discover(&self) {
        let Some(discovery) = &self.discovery else {
            return;
        };
        {
            let mut status = self.status.write().await;
            status.phase = OrchestratorPhase::Discovering;
            status.current_action = None;
            status.detail.clear();
        }
        if let Err(e) = discovery.scan(&self.cancel).await {
            warn!(error = %e, "Network discovery failed.");
        }
    }

    async fn set_idle(&self, idle: bool) {
        let mut status = self.status.write().await;
        if idle {
            status.phase = OrchestratorPhase::Idle;
            status.current_action = None;
        } else {
            status.idle_streak = 0;
        }
    }

    /// Runs a pass and, when it executed nothing, the idle fallbacks: a rescan, a
    /// second pass on the fresh table and the standalone round.
    ///
    /// Returns the number of executed actions.
    pub async fn run_cycle(&self) -> Result<usize, SchedulerError> {
        let executed = self.run_pass().await?.total();
        if executed > 0 {
            self.set_idle(false).await;
            return Ok(executed);
        }
        self.set_idle(true).await;
        self.status.write().await.idle_streak += 1;
        if self.cancel.is_cancelled() {
            return Ok(0);
        }
        info!("Nothing to do, rescanning the network.");
        self.discover().await;
        let mut executed = self.run_pass().await?.total();
        if !self.cancel.is_cancelled() {
            executed += self.run_standalone().await?;
        }
        self.set_idle(executed == 0).await;
        Ok(executed)
    }

    async fn idle_wait(&self) {
        let mut remaining = self.config.scan_interval;
        info!(interval = %format_duration(&remaining), "Waiting for the next scan.");
        while !remaining.is_zero() {
            let tick = match remaining.min(self.config.idle_tick) {
                tick if tick.is_zero() => remaining,
                tick => tick,
            };
            self.status.write().await.detail = format!("next scan in {}s", remaining.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                _ = self.cancel.cancelled() => return,
            }
            remaining = remaining.saturating_sub(tick);
        }
    }

    /// Runs cycles until cancelled.
    ///
    /// Errors that are not caused by a single action, e.g. an unwritable host
    /// table, end the loop and are returned.
    pub async fn run(&self) -> Result<(), SchedulerError> {
        info!(
            strategy = %self.config.attack_order,
            max_concurrent = self.config.max_concurrent,
            actions = ?self.registry,
            "Starting orchestrator."
        );
        self.discover().await;
        let result = loop {
            if self.cancel.is_cancelled() {
                break Ok(());
            }
            match self.run_cycle().await {
                Ok(0) => self.idle_wait().await,
                Ok(executed) => debug!(executed, "Cycle finished."),
                Err(e) => {
                    error!(error = %e, "Orchestrator stopped because of an error.");
                    break Err(e);
                }
            }
        };
        let mut status = self.status.write().await;
        status.phase = OrchestratorPhase::Stopped;
        status.current_action = None;
        info!("Orchestrator stopped.");
        result
    }
}
