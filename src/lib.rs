// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

pub mod actions;
pub mod command;
pub mod config;
pub mod discovery;
pub mod models;
pub mod scheduler;
pub mod scheduling;
pub mod storage;
pub mod vuln;
