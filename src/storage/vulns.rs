// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, info};

use crate::models::{Finding, VulnSummaryRow};

use super::error::StorageError;

/// Header of the summary and rollup tables.
pub const SUMMARY_HEADER: [&str; 5] = ["IP", "Hostname", "MAC Address", "Port", "Vulnerabilities"];
/// File name of the rollup within the vulnerability directory.
pub const ROLLUP_FILE: &str = "final_vulnerability_summary.csv";

const LABEL_SEPARATOR: &str = "; ";

fn parse_labels(value: &str) -> BTreeSet<String> {
    value
        .split(LABEL_SEPARATOR)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn join_labels(labels: &BTreeSet<String>) -> String {
    labels
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(LABEL_SEPARATOR)
}

fn artifact_prefix(mac: &str, ip: &str) -> String {
    format!("{}_{ip}", mac.replace(':', ""))
}

/// Persists the results of vulnerability scans.
///
/// Per host there are two artifacts within the vulnerability directory: the raw
/// scanner output and the structured findings. Additionally a summary table keeps
/// one row per (IP, MAC Address) pair. Read-modify-write cycles on the summary are
/// serialized.
#[derive(Debug)]
pub struct VulnStore {
    dir: PathBuf,
    summary: PathBuf,
    lock: Mutex<()>,
}

impl VulnStore {
    /// Creates a store writing into `dir` and keeping the summary at `summary`.
    pub fn new<D, S>(dir: D, summary: S) -> Self
    where
        D: Into<PathBuf>,
        S: Into<PathBuf>,
    {
        Self {
            dir: dir.into(),
            summary: summary.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary
    }

    pub fn rollup_path(&self) -> PathBuf {
        self.dir.join(ROLLUP_FILE)
    }

    /// Path of the structured findings of a host.
    pub fn details_path(&self, mac: &str, ip: &str) -> PathBuf {
        self.dir
            .join(format!("{}_vuln_details.json", artifact_prefix(mac, ip)))
    }

    /// Path of the raw scanner output of a host.
    pub fn raw_path(&self, mac: &str, ip: &str) -> PathBuf {
        self.dir
            .join(format!("{}_vuln_scan.txt", artifact_prefix(mac, ip)))
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(StorageError::io(&self.dir))
    }

    fn read_rows(path: &Path) -> Result<Vec<VulnSummaryRow>, StorageError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StorageError::io(path)(e)),
        };
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = reader.headers()?.clone();
        let idx = |name: &str| headers.iter().position(|h| h.trim() == name);
        let (ip, hostname, mac, port, vulns) = (
            idx("IP"),
            idx("Hostname"),
            idx("MAC Address"),
            idx("Port"),
            idx("Vulnerabilities"),
        );
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: Option<usize>| {
                i.and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .to_owned()
            };
            rows.push(VulnSummaryRow {
                ip: field(ip),
                hostname: field(hostname),
                mac: field(mac),
                ports: field(port),
                labels: parse_labels(&field(vulns)),
            });
        }
        Ok(rows)
    }

    fn write_rows(path: &Path, rows: &[VulnSummaryRow]) -> Result<(), StorageError> {
        let tmp = path.with_extension("csv.tmp");
        let file = fs::File::create(&tmp).map_err(StorageError::io(&tmp))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(SUMMARY_HEADER)?;
        for row in rows {
            writer.write_record([
                row.ip.as_str(),
                row.hostname.as_str(),
                row.mac.as_str(),
                row.ports.as_str(),
                join_labels(&row.labels).as_str(),
            ])?;
        }
        writer.flush().map_err(csv::Error::from)?;
        fs::rename(&tmp, path).map_err(StorageError::io(path))?;
        Ok(())
    }

    /// Reads the summary table.
    pub fn read_summary(&self) -> Result<Vec<VulnSummaryRow>, StorageError> {
        let _guard = self.lock.lock()?;
        Self::read_rows(&self.summary)
    }

    /// Inserts or replaces the summary row of the (ip, mac) pair.
    pub fn upsert_summary(&self, row: VulnSummaryRow) -> Result<(), StorageError> {
        let _guard = self.lock.lock()?;
        if let Some(parent) = self.summary.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(StorageError::io(parent))?;
            }
        }
        let mut rows = Self::read_rows(&self.summary)?;
        match rows
            .iter_mut()
            .find(|r| r.ip == row.ip && r.mac == row.mac)
        {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        Self::write_rows(&self.summary, &rows)?;
        debug!(path=?self.summary, rows = rows.len(), "Updated vulnerability summary.");
        Ok(())
    }

    /// Overwrites the structured findings of a host.
    pub fn write_details(
        &self,
        mac: &str,
        ip: &str,
        findings: &[Finding],
    ) -> Result<PathBuf, StorageError> {
        self.ensure_dir()?;
        let path = self.details_path(mac, ip);
        let json = serde_json::to_string_pretty(findings)?;
        fs::write(&path, json).map_err(StorageError::io(&path))?;
        if !findings.is_empty() {
            info!(ip, path=?path, findings = findings.len(), "Stored vulnerability details.");
        }
        Ok(path)
    }

    /// Reads the structured findings of a host. Unknown hosts have none.
    pub fn read_details(&self, mac: &str, ip: &str) -> Result<Vec<Finding>, StorageError> {
        let path = self.details_path(mac, ip);
        match fs::read(&path) {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(StorageError::io(&path)(e)),
        }
    }

    /// Overwrites the raw scanner output of a host.
    pub fn write_raw(&self, mac: &str, ip: &str, text: &str) -> Result<PathBuf, StorageError> {
        self.ensure_dir()?;
        let path = self.raw_path(mac, ip);
        fs::write(&path, text).map_err(StorageError::io(&path))?;
        info!(ip, path=?path, "Stored raw scan output.");
        Ok(path)
    }

    /// Regenerates the rollup from the summary.
    ///
    /// Rows are grouped by (IP, Hostname, MAC Address) in order of first appearance.
    /// Ports and labels of a group are unified.
    pub fn rollup(&self) -> Result<Vec<VulnSummaryRow>, StorageError> {
        let rows = self.read_summary()?;
        let mut grouped: Vec<VulnSummaryRow> = Vec::new();
        let mut index: HashMap<(String, String, String), usize> = HashMap::new();
        for row in rows {
            let key = (row.ip.clone(), row.hostname.clone(), row.mac.clone());
            match index.get(&key) {
                Some(&i) => {
                    let group = &mut grouped[i];
                    for port in row.ports.split(',').filter(|p| !p.is_empty()) {
                        if !group.ports.split(',').any(|p2| p2 == port) {
                            if !group.ports.is_empty() {
                                group.ports.push(',');
                            }
                            group.ports.push_str(port);
                        }
                    }
                    group.labels.extend(row.labels);
                }
                None => {
                    index.insert(key, grouped.len());
                    grouped.push(row);
                }
            }
        }
        self.ensure_dir()?;
        let path = self.rollup_path();
        Self::write_rows(&path, &grouped)?;
        info!(path=?path, hosts = grouped.len(), "Regenerated vulnerability rollup.");
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::FindingState;

    use super::*;

    fn row(ip: &str, hostname: &str, mac: &str, labels: &[&str]) -> VulnSummaryRow {
        VulnSummaryRow {
            ip: ip.to_owned(),
            hostname: hostname.to_owned(),
            mac: mac.to_owned(),
            ports: "22,80".to_owned(),
            labels: labels.iter().map(|x| x.to_string()).collect(),
        }
    }

    fn store() -> (tempfile::TempDir, VulnStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = VulnStore::new(dir.path().join("vulns"), dir.path().join("vuln_summary.csv"));
        (dir, store)
    }

    #[test]
    fn upsert_replaces_row_of_same_host() {
        let (_dir, store) = store();
        store
            .upsert_summary(row("10.0.0.5", "fs", "aa:01", &["Old finding"]))
            .unwrap();
        store
            .upsert_summary(row("10.0.0.6", "", "aa:02", &[]))
            .unwrap();
        store
            .upsert_summary(row("10.0.0.5", "fs", "aa:01", &["B", "A"]))
            .unwrap();
        let rows = store.read_summary().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row("10.0.0.5", "fs", "aa:01", &["A", "B"]));
        assert_eq!(
            fs::read_to_string(store.summary_path()).unwrap(),
            "IP,Hostname,MAC Address,Port,Vulnerabilities\n10.0.0.5,fs,aa:01,\"22,80\",A; B\n10.0.0.6,,aa:02,\"22,80\",\n"
        );
    }

    #[test]
    fn same_ip_with_other_mac_is_separate_row() {
        let (_dir, store) = store();
        store.upsert_summary(row("10.0.0.5", "", "aa:01", &[])).unwrap();
        store.upsert_summary(row("10.0.0.5", "", "aa:02", &[])).unwrap();
        assert_eq!(store.read_summary().unwrap().len(), 2);
    }

    #[test]
    fn rollup_unions_labels() {
        let (_dir, store) = store();
        fs::write(
            store.summary_path(),
            "IP,Hostname,MAC Address,Port,Vulnerabilities\n\
             10.0.0.5,fs,aa:01,22,A; B\n\
             10.0.0.5,fs,aa:01,445,B; C\n\
             10.0.0.6,,aa:02,80,\n",
        )
        .unwrap();
        let rolled = store.rollup().unwrap();
        assert_eq!(rolled.len(), 2);
        assert_eq!(rolled[0].ports, "22,445");
        assert_eq!(
            rolled[0].labels.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        assert!(store.rollup_path().exists());
    }

    #[test]
    fn artifacts_use_mac_without_colons() {
        let (_dir, store) = store();
        let finding = Finding {
            port: "445/tcp".to_owned(),
            script_id: "smb-vuln-ms17-010".to_owned(),
            title: "MS17-010 EternalBlue".to_owned(),
            state: FindingState::Vulnerable,
            ..Default::default()
        };
        let details = store
            .write_details("aa:bb:cc:00:11:22", "10.0.0.5", &[finding.clone()])
            .unwrap();
        assert_eq!(
            details.file_name().unwrap(),
            "aabbcc001122_10.0.0.5_vuln_details.json"
        );
        assert_eq!(
            store.read_details("aa:bb:cc:00:11:22", "10.0.0.5").unwrap(),
            vec![finding]
        );
        let raw = store.write_raw("aa:bb:cc:00:11:22", "10.0.0.5", "first").unwrap();
        store.write_raw("aa:bb:cc:00:11:22", "10.0.0.5", "second").unwrap();
        assert_eq!(raw.file_name().unwrap(), "aabbcc001122_10.0.0.5_vuln_scan.txt");
        assert_eq!(fs::read_to_string(raw).unwrap(), "second");
    }
}
