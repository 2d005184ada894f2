// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Persistence of the host table and of vulnerability scan results.
//!
//! Both are plain CSV files so that they can be shared with the discovery scanner
//! and inspected by the operator.

pub mod error;
mod hosts;
mod vulns;

pub use error::StorageError;
pub use hosts::*;
pub use vulns::*;
