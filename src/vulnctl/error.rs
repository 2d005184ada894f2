// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::path::PathBuf;

use orchestrator::{config::ConfigError, storage::StorageError, vuln::ScanError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("unable to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Scan(#[from] ScanError),
    #[error("unable to print results: {0}")]
    Json(#[from] serde_json::Error),
}
