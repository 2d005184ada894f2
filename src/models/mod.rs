// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Data types shared between the scheduler, the stores and the vulnerability scanner.

mod action;
mod finding;
mod host;
mod status;

pub use action::*;
pub use finding::*;
pub use host::*;
pub use status::*;
