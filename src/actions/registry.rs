// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::ActionDescriptor;

use super::{Action, CommandAction};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid action definitions: {0}")]
    Json(#[from] serde_json::Error),
    #[error("action {0} is declared more than once")]
    Duplicate(String),
    #[error("action {0} has no command")]
    MissingCommand(String),
}

fn default_timeout() -> Duration {
    Duration::from_secs(600)
}

/// An entry of the action definition file.
///
/// ```json
/// [
///   { "name": "SSHBruteforce", "port": 22, "command": ["/opt/actions/ssh_brute", "{ip}", "{port}"] },
///   { "name": "StealFilesSSH", "port": 22, "parent": "SSHBruteforce",
///     "command": ["/opt/actions/steal_ssh", "{ip}"], "timeout": "30m" }
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    #[serde(flatten)]
    pub descriptor: ActionDescriptor,
    pub command: Vec<String>,
    #[serde(default = "default_timeout", with = "crate::config::duration")]
    pub timeout: Duration,
}

/// All actions known to the scheduler in declaration order.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Vec<Arc<dyn Action>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|a| &a.descriptor().name))
            .finish()
    }
}

impl ActionRegistry {
    /// Creates a registry of the given actions.
    pub fn new(actions: Vec<Arc<dyn Action>>) -> Result<Self, RegistryError> {
        for (i, action) in actions.iter().enumerate() {
            let name = &action.descriptor().name;
            if actions[..i].iter().any(|a| &a.descriptor().name == name) {
                return Err(RegistryError::Duplicate(name.clone()));
            }
        }
        let result = Self { actions };
        for action in result.actions.iter().map(|a| a.descriptor()) {
            if let Some(parent) = &action.parent {
                if result.get(parent).is_none() {
                    warn!(action = %action.name, %parent, "Parent action is unknown, the action will never run.");
                }
            }
        }
        Ok(result)
    }

    /// Creates command backed actions from definitions.
    pub fn from_definitions(definitions: Vec<ActionDefinition>) -> Result<Self, RegistryError> {
        let mut actions: Vec<Arc<dyn Action>> = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if definition.command.is_empty() {
                return Err(RegistryError::MissingCommand(definition.descriptor.name));
            }
            actions.push(Arc::new(CommandAction::new(
                definition.descriptor,
                definition.command,
                definition.timeout,
            )));
        }
        Self::new(actions)
    }

    /// Reads the definitions from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let definitions: Vec<ActionDefinition> = serde_json::from_str(&content)?;
        let result = Self::from_definitions(definitions)?;
        info!(path=?path, actions = result.actions.len(), "Loaded actions.");
        Ok(result)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Action>> {
        self.actions.iter().find(|a| a.descriptor().name == name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ActionDescriptor> {
        self.get(name).map(|a| a.descriptor())
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions bound to a host port.
    pub fn host_actions(&self) -> impl Iterator<Item = &Arc<dyn Action>> {
        self.actions.iter().filter(|a| !a.descriptor().is_standalone())
    }

    /// Host actions without a parent.
    pub fn parents(&self) -> impl Iterator<Item = &Arc<dyn Action>> {
        self.host_actions().filter(|a| !a.descriptor().is_child())
    }

    /// Host actions depending on a parent.
    pub fn children(&self) -> impl Iterator<Item = &Arc<dyn Action>> {
        self.host_actions().filter(|a| a.descriptor().is_child())
    }

    /// Actions not bound to a discovered host.
    pub fn standalone(&self) -> impl Iterator<Item = &Arc<dyn Action>> {
        self.actions.iter().filter(|a| a.descriptor().is_standalone())
    }
}

#[cfg(test)]
mod tests {
    use crate::{actions::LambdaAction, models::Outcome};

    use super::*;

    fn lambda(descriptor: ActionDescriptor) -> Arc<dyn Action> {
        Arc::new(LambdaAction::constant(descriptor, Outcome::Success))
    }

    #[test]
    fn reads_definitions() {
        let json = r#"[
            { "name": "SSHBruteforce", "port": 22, "command": ["ssh_brute", "{ip}"] },
            { "name": "StealFilesSSH", "port": 22, "parent": "SSHBruteforce",
              "command": ["steal", "{ip}"], "timeout": "30m" },
            { "name": "LogStandalone", "command": ["log"] }
        ]"#;
        let definitions: Vec<ActionDefinition> = serde_json::from_str(json).unwrap();
        assert_eq!(definitions[0].timeout, Duration::from_secs(600));
        assert_eq!(definitions[1].timeout, Duration::from_secs(1800));
        assert_eq!(definitions[1].descriptor.parent.as_deref(), Some("SSHBruteforce"));
        let registry = ActionRegistry::from_definitions(definitions).unwrap();
        let names = |it: Vec<&Arc<dyn Action>>| {
            it.into_iter()
                .map(|a| a.descriptor().name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(registry.parents().collect()), vec!["SSHBruteforce"]);
        assert_eq!(names(registry.children().collect()), vec!["StealFilesSSH"]);
        assert_eq!(names(registry.standalone().collect()), vec!["LogStandalone"]);
    }

    #[test]
    fn rejects_duplicates() {
        let result = ActionRegistry::new(vec![
            lambda(ActionDescriptor::new("A", 22)),
            lambda(ActionDescriptor::new("A", 21)),
        ]);
        assert!(matches!(result, Err(RegistryError::Duplicate(name)) if name == "A"));
    }

    #[test]
    fn rejects_empty_command() {
        let definitions = vec![ActionDefinition {
            descriptor: ActionDescriptor::new("A", 22),
            command: vec![],
            timeout: default_timeout(),
        }];
        assert!(matches!(
            ActionRegistry::from_definitions(definitions),
            Err(RegistryError::MissingCommand(_))
        ));
    }

    #[test]
    #[tracing_test::traced_test]
    fn warns_about_unknown_parent() {
        ActionRegistry::new(vec![lambda(
            ActionDescriptor::new("B", 22).with_parent("Missing"),
        )])
        .unwrap();
        assert!(logs_contain("Parent action is unknown"));
    }
}
