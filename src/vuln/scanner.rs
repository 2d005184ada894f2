// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::{
    actions::{Action, ActionError},
    config::VulnScan,
    models::{ActionDescriptor, Finding, HostRecord, Outcome, STANDALONE_PORT, Target, VulnSummaryRow},
    storage::{StorageError, VulnStore},
};

use super::{
    ScanError, ScriptRequest, ScriptRunner, batches_for, elide_redundant_ports,
    parser::{labels, merge_findings, parse_findings},
};

/// The results of scanning one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Ports that were scanned.
    pub ports: Vec<String>,
    /// Ports that returned output.
    pub succeeded: Vec<String>,
    /// Combined output of every successful batch.
    pub text: String,
    /// Findings merged across ports.
    pub findings: Vec<Finding>,
    pub labels: BTreeSet<String>,
}

/// Scans the open ports of a host for vulnerabilities.
///
/// As an action it applies to every host with at least one open port. Results are
/// persisted in the vulnerability store and a host is reported as failed only when
/// no port returned any output.
pub struct VulnScanner {
    descriptor: ActionDescriptor,
    config: VulnScan,
    runner: Arc<dyn ScriptRunner>,
    store: Arc<VulnStore>,
    cancel: CancellationToken,
}

impl VulnScanner {
    pub fn new(
        config: VulnScan,
        runner: Arc<dyn ScriptRunner>,
        store: Arc<VulnStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            descriptor: ActionDescriptor::new(config.status_key.clone(), STANDALONE_PORT),
            config,
            runner,
            store,
            cancel,
        }
    }

    pub fn store(&self) -> &VulnStore {
        &self.store
    }

    async fn scan_port(&self, ip: &str, port: &str, hostname: Option<&str>) -> Option<String> {
        let mut text = String::new();
        let mut succeeded = 0;
        for batch in batches_for(port, &self.config) {
            if self.cancel.is_cancelled() {
                break;
            }
            info!(batch = batch.name, "Running scripts.");
            let request =
                ScriptRequest::from_batch(&batch, ip, port, hostname, self.config.timeout);
            match self.runner.run_scripts(&request).await {
                Ok(output) => {
                    text.push_str(&output);
                    succeeded += 1;
                }
                Err(e) if e.is_timeout() => {
                    warn!(batch = batch.name, timeout = ?self.config.timeout, "Batch timed out, continuing.");
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => warn!(batch = batch.name, error = %e, "Batch failed, continuing."),
            }
        }
        (succeeded > 0).then_some(text)
    }

    /// Scans every open port of a host.
    ///
    /// Ports that time out or fail are skipped. Returns [`ScanError::NoOutput`] when
    /// no port returned output.
    pub async fn scan_host(
        &self,
        ip: &str,
        hostname: Option<&str>,
        ports: &[String],
    ) -> Result<ScanReport, ScanError> {
        let ports = elide_redundant_ports(ports);
        info!(ip, ports = ports.len(), timing = %self.config.aggressivity, "Scanning for vulnerabilities.");
        let mut report = ScanReport {
            ports: ports.clone(),
            ..Default::default()
        };
        let mut findings = Vec::new();
        for port in ports {
            if self.cancel.is_cancelled() {
                break;
            }
            let span = info_span!("port", port = port.as_str());
            let Some(text) = self.scan_port(ip, &port, hostname).instrument(span).await else {
                warn!(ip, port = %port, "No output, moving to the next port.");
                continue;
            };
            let port_findings = parse_findings(&text, &format!("{port}/tcp"));
            let port_labels = labels(&port_findings);
            if !port_labels.is_empty() {
                info!(ip, port = %port, labels = ?port_labels, "Vulnerabilities found.");
            }
            findings.extend(port_findings);
            report.text.push_str(&text);
            report.succeeded.push(port);
        }
        if report.succeeded.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(ScanError::Cancelled(ip.to_owned()));
            }
            return Err(ScanError::NoOutput(ip.to_owned()));
        }
        report.findings = merge_findings(findings);
        report.labels = labels(&report.findings);
        if report.labels.is_empty() {
            info!(ip, "No vulnerabilities found.");
        } else {
            info!(ip, labels = ?report.labels, "All vulnerabilities found.");
        }
        Ok(report)
    }

    /// Persists the results of a host on the blocking pool.
    pub async fn store_report(
        &self,
        record: &HostRecord,
        report: &ScanReport,
    ) -> Result<(), ScanError> {
        let store = self.store.clone();
        let row = VulnSummaryRow {
            ip: record.ip.clone(),
            hostname: record.hostnames.clone(),
            mac: record.mac.clone(),
            ports: report.ports.join(","),
            labels: report.labels.clone(),
        };
        let findings = report.findings.clone();
        let text = report.text.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            store.write_details(&row.mac, &row.ip, &findings)?;
            store.write_raw(&row.mac, &row.ip, &text)?;
            store.upsert_summary(row)
        })
        .await??;
        Ok(())
    }
}

#[async_trait]
impl Action for VulnScanner {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    async fn execute(&self, target: &Target, record: &HostRecord) -> Result<Outcome, ActionError> {
        let ip = match target {
            Target::Host { ip, .. } => ip.as_str(),
            Target::Standalone => {
                return Err(ActionError::Other(
                    "vulnerability scans need a host".to_owned(),
                ));
            }
        };
        let span = info_span!("vuln_scan", ip);
        let result = self
            .scan_host(ip, record.hostname(), &record.ports)
            .instrument(span)
            .await;
        match result {
            Ok(report) => {
                self.store_report(record, &report).await?;
                Ok(Outcome::Success)
            }
            Err(ScanError::NoOutput(_)) => {
                warn!(ip, "All ports timed out or failed.");
                Ok(Outcome::Failed)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn finish_pass(&self) -> Result<(), ActionError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.rollup())
            .await
            .map_err(ScanError::from)??;
        Ok(())
    }
}
