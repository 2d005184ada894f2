// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Runs external executables (action modules, the discovery scanner and nmap).
//!
//! Every execution is bounded by a timeout. Executions started with [`run`] can
//! additionally be cancelled. In both cases the child process is killed.

use std::{collections::HashMap, process::Stdio, time::Duration};

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Errors of running an external executable
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command line")]
    Empty,
    #[error("unable to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("{program} was cancelled")]
    Cancelled { program: String },
    #[error("unable to read output of {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Exit code and stdout of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
}

/// Replaces `{name}` placeholders within every argument.
pub fn substitute(args: &[String], values: &HashMap<&str, String>) -> Vec<String> {
    args.iter()
        .map(|arg| {
            values.iter().fold(arg.clone(), |acc, (k, v)| {
                acc.replace(&format!("{{{k}}}"), v)
            })
        })
        .collect()
}

/// Runs `argv` until it finishes, the timeout elapses or `cancel` is triggered.
pub async fn run(
    argv: &[String],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, CommandError> {
    let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;
    trace!(program, ?args, "Starting process.");
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

    // dropping the future drops the child which kills it
    tokio::select! {
        result = tokio::time::timeout(timeout, child.wait_with_output()) => {
            match result {
                Ok(Ok(output)) => {
                    let code = output.status.code();
                    debug!(program, ?code, "Process finished.");
                    if !output.stderr.is_empty() {
                        trace!(program, stderr = %String::from_utf8_lossy(&output.stderr));
                    }
                    Ok(CommandOutput {
                        code,
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    })
                }
                Ok(Err(source)) => Err(CommandError::Io { program: program.clone(), source }),
                Err(_) => Err(CommandError::Timeout { program: program.clone(), timeout }),
            }
        }
        _ = cancel.cancelled() => Err(CommandError::Cancelled { program: program.clone() }),
    }
}

/// Runs `argv` until it finishes or the timeout elapses.
///
/// Used for action modules, which are never interrupted by a shutdown.
pub async fn run_to_completion(
    argv: &[String],
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    run(argv, timeout, &CancellationToken::new()).await
}
