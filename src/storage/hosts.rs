// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::models::{ActionStatus, HostRecord, HostTable, TIMESTAMP_FORMAT};

use super::error::StorageError;

pub const MAC_COLUMN: &str = "MAC Address";
pub const IPS_COLUMN: &str = "IPs";
pub const HOSTNAMES_COLUMN: &str = "Hostnames";
pub const ALIVE_COLUMN: &str = "Alive";
pub const PORTS_COLUMN: &str = "Ports";

/// Columns every host table starts with; all following columns are action statuses.
pub const BASE_COLUMNS: [&str; 5] = [
    MAC_COLUMN,
    IPS_COLUMN,
    HOSTNAMES_COLUMN,
    ALIVE_COLUMN,
    PORTS_COLUMN,
];

const PORT_SEPARATOR: char = ';';

/// Persists the host table.
///
/// The scheduler reloads the table at the start of every pass and writes every
/// status transition back before the next one is made.
pub trait HostStore: Send + Sync {
    /// Loads the complete table. A missing table is empty.
    fn load(&self) -> Result<HostTable, StorageError>;

    /// Replaces the complete table.
    fn store(&self, table: &HostTable) -> Result<(), StorageError>;
}

/// Keeps the host table in memory. Used for testing and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryHostStore {
    table: RwLock<HostTable>,
}

impl InMemoryHostStore {
    pub fn new(table: HostTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }
}

impl HostStore for InMemoryHostStore {
    fn load(&self) -> Result<HostTable, StorageError> {
        Ok(self.table.read()?.clone())
    }

    fn store(&self, table: &HostTable) -> Result<(), StorageError> {
        *self.table.write()? = table.clone();
        Ok(())
    }
}

/// Stores the host table as a CSV file shared with the discovery scanner.
#[derive(Debug, Clone)]
pub struct CsvHostStore {
    path: PathBuf,
}

fn column(headers: &csv::StringRecord, name: &'static str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn parse_alive(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True")
}

fn parse_ports(value: &str) -> Vec<String> {
    value
        .split(PORT_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

impl CsvHostStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_from<R: std::io::Read>(reader: R) -> Result<HostTable, StorageError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.clone();
        let mac_idx = column(&headers, MAC_COLUMN).ok_or(StorageError::MissingColumn(MAC_COLUMN))?;
        let ip_idx = column(&headers, IPS_COLUMN);
        let hostnames_idx = column(&headers, HOSTNAMES_COLUMN);
        let alive_idx = column(&headers, ALIVE_COLUMN);
        let ports_idx = column(&headers, PORTS_COLUMN);

        let action_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !BASE_COLUMNS.contains(&h.trim()))
            .map(|(i, h)| (i, h.to_owned()))
            .collect();

        let mut table = HostTable {
            action_columns: action_columns.iter().map(|(_, h)| h.clone()).collect(),
            hosts: Vec::new(),
        };
        for row in reader.records() {
            let row = row?;
            let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or_default();
            let mac = field(Some(mac_idx)).trim();
            if mac.is_empty() {
                continue;
            }
            if table.get(mac).is_some() {
                warn!(mac, "Ignoring duplicate host row.");
                continue;
            }
            let mut record = HostRecord::new(mac, field(ip_idx).trim());
            record.hostnames = field(hostnames_idx).to_owned();
            record.alive = parse_alive(field(alive_idx));
            record.ports = parse_ports(field(ports_idx));
            for (idx, name) in &action_columns {
                let raw = row.get(*idx).unwrap_or_default();
                if !raw.is_empty() {
                    record.set_status(name.clone(), ActionStatus::from(raw));
                }
            }
            table.hosts.push(record);
        }
        Ok(table)
    }

    fn write_to<W: std::io::Write>(writer: W, table: &HostTable) -> Result<(), StorageError> {
        let mut writer = csv::Writer::from_writer(writer);
        let header = BASE_COLUMNS
            .iter()
            .copied()
            .chain(table.action_columns.iter().map(String::as_str));
        writer.write_record(header)?;
        for host in &table.hosts {
            let ports = host.ports.join(&PORT_SEPARATOR.to_string());
            let mut row = vec![
                host.mac.clone(),
                host.ip.clone(),
                host.hostnames.clone(),
                if host.alive { "1" } else { "0" }.to_owned(),
                ports,
            ];
            row.extend(
                table
                    .action_columns
                    .iter()
                    .map(|c| host.status(c).to_string()),
            );
            writer.write_record(&row)?;
        }
        writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Returns true when the table contains at least one data row.
    pub fn has_data(&self) -> Result<bool, StorageError> {
        if !self.path.exists() {
            return Ok(false);
        }
        let content = fs::read_to_string(&self.path).map_err(StorageError::io(&self.path))?;
        Ok(content.lines().skip(1).any(|l| !l.trim().is_empty()))
    }

    /// Copies the table into `archive_dir` as `hosts_<network>_<ts>.csv`.
    ///
    /// Nothing is archived when the table has no data rows.
    pub fn archive(
        &self,
        archive_dir: &Path,
        network: &str,
        now: NaiveDateTime,
    ) -> Result<Option<PathBuf>, StorageError> {
        if !self.has_data()? {
            debug!(path=?self.path, "Host table is empty, nothing to archive.");
            return Ok(None);
        }
        fs::create_dir_all(archive_dir).map_err(StorageError::io(archive_dir))?;
        let safe_network = network.replace(['/', ':'], "_");
        let target = archive_dir.join(format!(
            "hosts_{safe_network}_{}.csv",
            now.format(TIMESTAMP_FORMAT)
        ));
        fs::copy(&self.path, &target).map_err(StorageError::io(&target))?;
        info!(archive=?target, "Archived host table.");
        Ok(Some(target))
    }

    /// Resets the table to the bare header.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store(&HostTable::default())?;
        info!(path=?self.path, "Cleared host table.");
        Ok(())
    }
}

impl HostStore for CsvHostStore {
    fn load(&self) -> Result<HostTable, StorageError> {
        match fs::File::open(&self.path) {
            Ok(file) => Self::read_from(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostTable::default()),
            Err(e) => Err(StorageError::io(&self.path)(e)),
        }
    }

    fn store(&self, table: &HostTable) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(StorageError::io(parent))?;
            }
        }
        let tmp = self.path.with_extension("csv.tmp");
        let file = fs::File::create(&tmp).map_err(StorageError::io(&tmp))?;
        Self::write_to(file, table)?;
        fs::rename(&tmp, &self.path).map_err(StorageError::io(&self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const TABLE: &str = "\
MAC Address,IPs,Hostnames,Alive,Ports,SSHBruteforce,StealFilesSSH,NmapVulnScanner
aa:bb:cc:dd:ee:01,10.0.0.5,fileserver;fs.lan,1,22;80;445;139,success_20240101_120000,failed_2_20240101_130000,
aa:bb:cc:dd:ee:02,10.0.0.6,,0,,no_creds_20240102_000000,,failed_20240101_000000
STANDALONE,STANDALONE,STANDALONE,0,0,,,
";

    fn store_with(content: &str) -> (tempfile::TempDir, CsvHostStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.csv");
        fs::write(&path, content).unwrap();
        (dir, CsvHostStore::new(path))
    }

    #[test]
    fn load_parses_hosts() {
        let (_dir, store) = store_with(TABLE);
        let table = store.load().unwrap();
        assert_eq!(
            table.action_columns,
            vec!["SSHBruteforce", "StealFilesSSH", "NmapVulnScanner"]
        );
        assert_eq!(table.hosts.len(), 3);
        let host = table.get("aa:bb:cc:dd:ee:01").unwrap();
        assert_eq!(host.ports, vec!["22", "80", "445", "139"]);
        assert!(host.alive);
        assert!(host.status("SSHBruteforce").is_success());
        assert_eq!(host.status("StealFilesSSH").failure_count(), 2);
        assert!(host.status("NmapVulnScanner").is_never_attempted());
        let host = table.get("aa:bb:cc:dd:ee:02").unwrap();
        assert!(!host.alive);
        assert!(host.ports.is_empty());
        assert!(table.get("STANDALONE").unwrap().is_standalone());
    }

    #[test]
    fn round_trip_preserves_table() {
        let (_dir, store) = store_with(TABLE);
        let table = store.load().unwrap();
        store.store(&table).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), TABLE);
        assert_eq!(store.load().unwrap(), table);
    }

    #[test]
    fn unknown_status_values_survive_round_trip() {
        let content = "MAC Address,IPs,Hostnames,Alive,Ports,FTPBruteforce\naa,10.0.0.1,,1,21,running\n";
        let (_dir, store) = store_with(content);
        let table = store.load().unwrap();
        store.store(&table).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), content);
    }

    #[test]
    fn missing_file_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvHostStore::new(dir.path().join("missing.csv"));
        assert_eq!(store.load().unwrap(), HostTable::default());
        assert!(!store.has_data().unwrap());
    }

    #[test]
    fn missing_mac_column_is_rejected() {
        let (_dir, store) = store_with("IPs,Ports\n10.0.0.1,22\n");
        assert!(matches!(
            store.load(),
            Err(StorageError::MissingColumn(MAC_COLUMN))
        ));
    }

    #[test]
    fn archive_and_clear() {
        let (dir, store) = store_with(TABLE);
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .unwrap();
        let archives = dir.path().join("archives");
        let archived = store.archive(&archives, "10.0.0.0/24", now).unwrap().unwrap();
        assert_eq!(
            archived.file_name().unwrap(),
            "hosts_10.0.0.0_24_20240301_083000.csv"
        );
        assert_eq!(fs::read_to_string(archived).unwrap(), TABLE);

        store.clear().unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "MAC Address,IPs,Hostnames,Alive,Ports\n"
        );
        assert_eq!(store.archive(&archives, "10.0.0.0/24", now).unwrap(), None);
    }

    #[test]
    fn in_memory_store_keeps_last_table() {
        let store = InMemoryHostStore::default();
        let mut table = HostTable::default();
        table.hosts.push(HostRecord::new("aa", "10.0.0.1"));
        store.store(&table).unwrap();
        assert_eq!(store.load().unwrap(), table);
    }
}
