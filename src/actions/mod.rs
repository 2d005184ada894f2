// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Action modules the scheduler executes against hosts.
//!
//! An action is identified by its descriptor; the scheduler only knows the
//! descriptor and the `execute` contract. Actions are declared in a registry file
//! and are external executables (see `CommandAction`). Tests use `LambdaAction`.
mod command;
mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use command::CommandAction;
pub use registry::{ActionDefinition, ActionRegistry, RegistryError};

use crate::{
    command::CommandError,
    models::{ActionDescriptor, HostRecord, Outcome, Target},
};

/// Errors raised while executing an action. The scheduler records them as a failure.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Command(#[from] CommandError),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("{0}")]
    Scan(#[from] crate::vuln::ScanError),
    #[error("{0}")]
    Other(String),
}

impl ActionError {
    /// Returns true when the execution was interrupted by a shutdown.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ActionError::Command(CommandError::Cancelled { .. }) => true,
            ActionError::Scan(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

/// An action module.
#[async_trait]
pub trait Action: Send + Sync {
    fn descriptor(&self) -> &ActionDescriptor;

    /// Executes the action against the target.
    ///
    /// The record is a snapshot of the host taken before the execution.
    async fn execute(&self, target: &Target, record: &HostRecord) -> Result<Outcome, ActionError>;

    /// Called after every pass in which the action ran.
    async fn finish_pass(&self) -> Result<(), ActionError> {
        Ok(())
    }
}

#[async_trait]
impl<T> Action for Arc<T>
where
    T: Action + ?Sized,
{
    fn descriptor(&self) -> &ActionDescriptor {
        self.as_ref().descriptor()
    }

    async fn execute(&self, target: &Target, record: &HostRecord) -> Result<Outcome, ActionError> {
        self.as_ref().execute(target, record).await
    }

    async fn finish_pass(&self) -> Result<(), ActionError> {
        self.as_ref().finish_pass().await
    }
}

type ExecuteFn =
    dyn Fn(&Target, &HostRecord) -> Result<Outcome, ActionError> + Send + Sync + 'static;

/// An action backed by a closure.
pub struct LambdaAction {
    descriptor: ActionDescriptor,
    execute: Box<ExecuteFn>,
}

impl LambdaAction {
    pub fn new<F>(descriptor: ActionDescriptor, execute: F) -> Self
    where
        F: Fn(&Target, &HostRecord) -> Result<Outcome, ActionError> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            execute: Box::new(execute),
        }
    }

    /// An action that always reports the same outcome.
    pub fn constant(descriptor: ActionDescriptor, outcome: Outcome) -> Self {
        Self::new(descriptor, move |_, _| Ok(outcome))
    }
}

#[async_trait]
impl Action for LambdaAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    async fn execute(&self, target: &Target, record: &HostRecord) -> Result<Outcome, ActionError> {
        (self.execute)(target, record)
    }
}
