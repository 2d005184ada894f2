// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    command,
    models::{ActionDescriptor, HostRecord, Outcome, Target},
};

use super::{Action, ActionError};

/// Exit code signalling that the credential list was exhausted.
pub const NO_CREDS_EXIT_CODE: i32 = 2;

/// An action module that is an external executable.
///
/// The placeholders `{ip}`, `{port}`, `{mac}` and `{hostname}` within the
/// arguments are replaced by the values of the target. Exit code 0 is a success,
/// 2 means that no credentials were found and everything else is a failure.
///
/// A running module is not interrupted by a shutdown, only by its timeout.
#[derive(Debug, Clone)]
pub struct CommandAction {
    descriptor: ActionDescriptor,
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandAction {
    pub fn new(descriptor: ActionDescriptor, argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            descriptor,
            argv,
            timeout,
        }
    }

    fn command_line(&self, target: &Target, record: &HostRecord) -> Vec<String> {
        let mut values = HashMap::new();
        values.insert("mac", record.mac.clone());
        values.insert("hostname", record.hostname().unwrap_or_default().to_owned());
        match target {
            Target::Host { ip, port } => {
                values.insert("ip", ip.clone());
                values.insert("port", port.to_string());
            }
            Target::Standalone => {
                values.insert("ip", String::new());
                values.insert("port", self.descriptor.port.to_string());
            }
        }
        command::substitute(&self.argv, &values)
    }
}

#[async_trait]
impl Action for CommandAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    async fn execute(&self, target: &Target, record: &HostRecord) -> Result<Outcome, ActionError> {
        let argv = self.command_line(target, record);
        let output = command::run_to_completion(&argv, self.timeout).await?;
        let outcome = match output.code {
            Some(0) => Outcome::Success,
            Some(NO_CREDS_EXIT_CODE) => Outcome::NoCredsFound,
            _ => Outcome::Failed,
        };
        debug!(action = %self.descriptor.name, %target, code = ?output.code, %outcome, "Action finished.");
        Ok(outcome)
    }
}
