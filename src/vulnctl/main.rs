// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Operator tool around the vulnerability scan and the host table.
mod error;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
pub use error::CliError;
use orchestrator::{
    config::{Config, Logging},
    models::HostRecord,
    storage::{CsvHostStore, HostStore, VulnStore},
    vuln::{NmapRunner, VulnScanner, parser},
};
use tokio_util::sync::CancellationToken;

#[derive(clap::Parser)]
#[command(name = "vulnctl", about = "Inspects and runs vulnerability scans.")]
struct Args {
    /// Path to the orchestratord configuration.
    #[arg(short, long, env = "ORCHESTRATORD_CONFIG")]
    config: Option<PathBuf>,
    /// Print more details while running
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Parses raw nmap script output and prints the findings as JSON.
    Parse {
        file: PathBuf,
        /// Port used for findings before the first port line.
        #[arg(short, long, default_value = "")]
        port: String,
    },
    /// Scans a single host.
    Scan {
        ip: String,
        #[arg(long)]
        hostname: Option<String>,
        /// Ports to scan.
        #[arg(short, long, value_delimiter = ',', required = true)]
        ports: Vec<String>,
        /// MAC address used to name the stored artifacts.
        #[arg(long, default_value = "")]
        mac: String,
        /// Stores the results in the vulnerability directory.
        #[arg(long)]
        store: bool,
    },
    /// Regenerates the vulnerability rollup from the summary.
    Rollup,
    /// Prints the action statuses of the host table.
    Status,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, CliError> {
    Ok(match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    })
}

fn vuln_store(config: &Config) -> VulnStore {
    let storage = &config.storage;
    VulnStore::new(
        storage.resolve(&storage.vulnerabilities_dir),
        storage.resolve(&storage.vuln_summary_file),
    )
}

fn parse(file: PathBuf, port: &str) -> Result<(), CliError> {
    let text = std::fs::read_to_string(&file).map_err(|source| CliError::Read {
        path: file.clone(),
        source,
    })?;
    let findings = parser::merge_findings(parser::parse_findings(&text, port));
    println!("{}", serde_json::to_string_pretty(&findings)?);
    Ok(())
}

async fn scan(
    config: Config,
    ip: String,
    hostname: Option<String>,
    ports: Vec<String>,
    mac: String,
    store: bool,
) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let runner = NmapRunner::new(
        config.vuln_scan.nmap.clone(),
        config.vuln_scan.aggressivity.clone(),
        cancel.clone(),
    );
    let scanner = VulnScanner::new(
        config.vuln_scan.clone(),
        Arc::new(runner),
        Arc::new(vuln_store(&config)),
        cancel.clone(),
    );
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let report = scanner.scan_host(&ip, hostname.as_deref(), &ports).await?;
    if store {
        let mut record = HostRecord::new(mac, ip);
        record.hostnames = hostname.unwrap_or_default();
        record.ports = ports;
        scanner.store_report(&record, &report).await?;
        scanner.store().rollup()?;
    }
    println!("{}", serde_json::to_string_pretty(&report.findings)?);
    Ok(())
}

fn rollup(config: &Config) -> Result<(), CliError> {
    let store = vuln_store(config);
    let rows = store.rollup()?;
    tracing::info!(path=?store.rollup_path(), hosts = rows.len(), "Rollup written.");
    Ok(())
}

fn status(config: &Config) -> Result<(), CliError> {
    let storage = &config.storage;
    let table = CsvHostStore::new(storage.resolve(&storage.hosts_file)).load()?;
    for host in table.hosts.iter() {
        let alive = if host.alive { "alive" } else { "gone" };
        println!("{} {} ({alive}) ports: {}", host.ip, host.mac, host.ports.join(","));
        for column in table.action_columns.iter() {
            println!("  {column}: {}", host.status(column));
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(args.config.as_ref())?;
    match args.command {
        Commands::Parse { file, port } => parse(file, &port),
        Commands::Scan {
            ip,
            hostname,
            ports,
            mac,
            store,
        } => scan(config, ip, hostname, ports, mac, store).await,
        Commands::Rollup => rollup(&config),
        Commands::Status => status(&config),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    Logging::verbose(args.verbose).init();
    if let Err(e) = run(args).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
