// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{io, path::PathBuf, sync::PoisonError};

use thiserror::Error;

/// Defines the error cases of the host and vulnerability stores
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing a table failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file that was accessed.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A table could not be parsed or written as CSV.
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    /// Finding records could not be serialized.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A table lacks a mandatory column.
    #[error("Missing column {0}")]
    MissingColumn(&'static str),
    /// Did expected a different kind of data and is unable to fulfil the request.
    #[error("Unexpected data: {0}")]
    UnexpectedData(String),
    /// A lock guarding a table was poisoned.
    #[error("Unexpected issue: {0}")]
    Dirty(String),
}

impl StorageError {
    pub(crate) fn io<P: Into<PathBuf>>(path: P) -> impl FnOnce(io::Error) -> StorageError {
        let path = path.into();
        move |source| StorageError::Io { path, source }
    }
}

impl<S> From<PoisonError<S>> for StorageError {
    fn from(value: PoisonError<S>) -> Self {
        Self::Dirty(format!("{value:?}"))
    }
}
