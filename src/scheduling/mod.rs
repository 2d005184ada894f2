// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Decides what runs against which host and in which order.
//!
//! The retry policy evaluates the recorded status of a single (host, action) pair,
//! the plan groups hosts and phases of a pass into stages that may run concurrently
//! and the helpers within this module answer the dependency and exhaustion
//! questions on a host record.
mod plan;
mod policy;

pub use plan::{Lane, Phase, Phases, Plan, Stage, Step, Strategy};
pub use policy::{Decision, RetryPolicy, SkipReason};

use crate::models::{ActionDescriptor, HostRecord};

/// Returns true when the action targets a port the host has open.
///
/// Actions without a port (e.g. the vulnerability scan) apply to every host with at
/// least one open port.
pub fn is_applicable(action: &ActionDescriptor, record: &HostRecord) -> bool {
    if action.is_standalone() {
        !record.ports.is_empty()
    } else {
        record.has_port(&action.port.to_string())
    }
}

/// Returns the skip reason when the parent of `action` did not succeed on the host.
pub fn dependency(action: &ActionDescriptor, record: &HostRecord) -> Option<SkipReason> {
    let parent = action.parent.as_ref()?;
    if record.status(parent).is_success() {
        None
    } else {
        Some(SkipReason::DependencyNotMet {
            parent: parent.clone(),
        })
    }
}

/// Returns true when the dependency of `action` can never be met on this host.
///
/// That is the case when the parent did not succeed and either does not apply to
/// the host or will never run again.
pub fn is_gated(
    policy: &RetryPolicy,
    action: &ActionDescriptor,
    parent: Option<&ActionDescriptor>,
    record: &HostRecord,
) -> bool {
    let Some(parent_name) = action.parent.as_ref() else {
        return false;
    };
    let status = record.status(parent_name);
    if status.is_success() {
        return false;
    }
    match parent {
        Some(parent) if is_applicable(parent, record) => policy.is_terminal(&status),
        _ => true,
    }
}

/// Returns true when no applicable action can ever run on the host again.
///
/// `actions` are all known actions; `lookup` resolves parents by name.
pub fn is_exhausted<'a, F>(
    policy: &RetryPolicy,
    actions: &[&'a ActionDescriptor],
    lookup: F,
    record: &HostRecord,
) -> bool
where
    F: Fn(&str) -> Option<&'a ActionDescriptor>,
{
    actions
        .iter()
        .filter(|a| is_applicable(a, record))
        .all(|a| {
            let parent = a.parent.as_deref().and_then(&lookup);
            is_gated(policy, a, parent, record) || policy.is_terminal(&record.status(&a.name))
        })
}
