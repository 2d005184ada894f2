// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::sync::Arc;

use orchestrator::{
    actions::ActionRegistry,
    config::Config,
    discovery::CommandDiscovery,
    scheduler::{OrchestratorHandle, Scheduler},
    storage::{CsvHostStore, HostStore, VulnStore},
    vuln::{NmapRunner, VulnScanner},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn prepare_hosts(config: &Config, network: &str) -> Result<CsvHostStore> {
    let storage = &config.storage;
    let hosts = CsvHostStore::new(storage.resolve(&storage.hosts_file));
    if storage.archive_on_startup {
        hosts.archive(
            &storage.resolve(&storage.archive_dir),
            network,
            chrono::Local::now().naive_local(),
        )?;
    }
    if storage.clear_hosts_on_startup {
        hosts.clear()?;
    }
    Ok(hosts)
}

fn load_registry(config: &Config) -> Result<ActionRegistry> {
    let path = config.storage.resolve(&config.storage.actions_file);
    if !path.exists() {
        warn!(path=?path, "No action definitions found, only the vulnerability scan will run.");
        return Ok(ActionRegistry::default());
    }
    Ok(ActionRegistry::load(&path)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.log.init();
    tracing::debug!("config:\n{config}");

    let network = config
        .scheduler
        .target_network()?
        .map(|n| n.to_string())
        .unwrap_or_default();
    let cancel = CancellationToken::new();
    let storage = &config.storage;

    let hosts = prepare_hosts(&config, &network)?;
    let hosts_file = hosts.path().display().to_string();
    let hosts: Arc<dyn HostStore> = Arc::new(hosts);
    let registry = load_registry(&config)?;

    let runner = NmapRunner::new(
        config.vuln_scan.nmap.clone(),
        config.vuln_scan.aggressivity.clone(),
        cancel.clone(),
    );
    let store = VulnStore::new(
        storage.resolve(&storage.vulnerabilities_dir),
        storage.resolve(&storage.vuln_summary_file),
    );
    let scanner = VulnScanner::new(
        config.vuln_scan.clone(),
        Arc::new(runner),
        Arc::new(store),
        cancel.clone(),
    );

    let mut scheduler = Scheduler::new(
        config.scheduler.clone(),
        config.retry.clone(),
        registry,
        hosts,
        cancel.clone(),
    )?
    .with_vuln_scan(Arc::new(scanner));
    if config.discovery.command.is_empty() {
        info!("No discovery command configured, relying on an external scanner.");
    } else {
        scheduler = scheduler.with_discovery(Arc::new(CommandDiscovery::new(
            &config.discovery.command,
            config.discovery.timeout,
            &network,
            &hosts_file,
        )));
    }

    let mut handle = OrchestratorHandle::start(scheduler);
    info!(%network, "Orchestrator started.");
    let interrupted = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            true
        }
        result = handle.wait() => {
            result?;
            false
        }
    };
    if interrupted {
        info!("Received interrupt, stopping.");
        handle.stop();
        handle.wait().await?;
    }
    info!("Orchestrator stopped.");
    Ok(())
}
