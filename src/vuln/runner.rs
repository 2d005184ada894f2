// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command;

use super::{Batch, ScanError};

/// A single invocation of the script engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    pub ip: String,
    pub port: String,
    /// Script names or categories.
    pub scripts: Vec<String>,
    pub script_timeout: Duration,
    /// Wall clock limit of the whole invocation.
    pub batch_timeout: Duration,
    /// Values of `--script-args`.
    pub script_args: Vec<String>,
}

impl ScriptRequest {
    /// Creates the request of `batch` against `ip:port`.
    ///
    /// A hostname is passed as virtual host when the batch asks for it.
    pub fn from_batch(
        batch: &Batch,
        ip: &str,
        port: &str,
        hostname: Option<&str>,
        batch_timeout: Duration,
    ) -> Self {
        let mut script_args: Vec<String> = batch.args.iter().map(|x| x.to_string()).collect();
        if let Some(hostname) = hostname.filter(|h| batch.virtual_host && !h.is_empty()) {
            script_args.push(format!("http.host={hostname}"));
        }
        Self {
            ip: ip.to_owned(),
            port: port.to_owned(),
            scripts: batch.scripts.iter().map(|x| x.to_string()).collect(),
            script_timeout: batch.script_timeout,
            batch_timeout,
            script_args,
        }
    }
}

/// Executes scan scripts and returns their text output.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs the scripts of the request.
    ///
    /// Returns the captured output or the reason why there is none, e.g. an
    /// elapsed batch timeout.
    async fn run_scripts(&self, request: &ScriptRequest) -> Result<String, ScanError>;
}

/// Runs the scripts with nmap.
#[derive(Debug, Clone)]
pub struct NmapRunner {
    nmap: String,
    timing: String,
    cancel: CancellationToken,
}

impl NmapRunner {
    pub fn new<S: Into<String>>(nmap: S, timing: S, cancel: CancellationToken) -> Self {
        Self {
            nmap: nmap.into(),
            timing: timing.into(),
            cancel,
        }
    }

    /// The command line of a request.
    pub fn command_line(&self, request: &ScriptRequest) -> Vec<String> {
        let mut argv = vec![
            self.nmap.clone(),
            self.timing.clone(),
            "--script".to_owned(),
            request.scripts.join(","),
            "--script-timeout".to_owned(),
            format!("{}s", request.script_timeout.as_secs().max(1)),
        ];
        if !request.script_args.is_empty() {
            argv.push("--script-args".to_owned());
            argv.push(request.script_args.join(","));
        }
        argv.extend([
            "-p".to_owned(),
            request.port.clone(),
            request.ip.clone(),
        ]);
        argv
    }
}

#[async_trait]
impl ScriptRunner for NmapRunner {
    async fn run_scripts(&self, request: &ScriptRequest) -> Result<String, ScanError> {
        let argv = self.command_line(request);
        let output = command::run(&argv, request.batch_timeout, &self.cancel).await?;
        // nmap reports unreachable hosts with a non zero exit code but still prints
        // what it got so far
        debug!(ip = request.ip, port = request.port, code = ?output.code, "nmap finished.");
        Ok(output.stdout)
    }
}

type RunFn = dyn Fn(&ScriptRequest) -> Result<String, ScanError> + Send + Sync + 'static;

/// A script runner backed by a closure.
pub struct LambdaRunner {
    run: Box<RunFn>,
}

impl LambdaRunner {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(&ScriptRequest) -> Result<String, ScanError> + Send + Sync + 'static,
    {
        Self { run: Box::new(run) }
    }
}

#[async_trait]
impl ScriptRunner for LambdaRunner {
    async fn run_scripts(&self, request: &ScriptRequest) -> Result<String, ScanError> {
        (self.run)(request)
    }
}
