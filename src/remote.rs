// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Running commands on fleets of hosts.
//!
//! Hosts are addressed through selectors. A selector is either an alias defined in the
//! `hosts:` section of the configuration (e.g. `A:dns-rec`) or a comma-separated list
//! of hostnames.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::dns_errors::RemoteError;

/// Result of a command on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutput {
    /// Host the command ran on
    pub host: String,
    /// Exit code, `None` if the process was killed or never started
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error, or the spawn error
    pub stderr: String,
}

impl HostOutput {
    /// Whether the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a shell command on every host matched by a selector.
#[async_trait]
pub trait RemoteCommandExecutor: Send + Sync {
    /// Run `command` on all hosts of `selector`, in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NoHosts`] if the selector is empty and
    /// [`RemoteError::CommandFailed`] if the command failed on any host.
    async fn run_on_hosts(
        &self,
        selector: &str,
        command: &str,
    ) -> Result<Vec<HostOutput>, RemoteError>;
}

/// Executor running commands over `ssh`.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    aliases: BTreeMap<String, Vec<String>>,
    ssh_program: String,
}

impl SshExecutor {
    /// Create an executor resolving selectors through `aliases`.
    #[must_use]
    pub fn new(aliases: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            aliases,
            ssh_program: "ssh".to_string(),
        }
    }

    /// Use another program in place of `ssh`. It is invoked as `<program> <host> <command>`.
    #[must_use]
    pub fn with_program(mut self, program: &str) -> Self {
        self.ssh_program = program.to_string();
        self
    }

    /// Hosts matched by `selector`.
    #[must_use]
    pub fn resolve_selector(&self, selector: &str) -> Vec<String> {
        if let Some(hosts) = self.aliases.get(selector) {
            return hosts.clone();
        }
        if selector.starts_with("A:") {
            return Vec::new();
        }
        selector
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect()
    }

    async fn run_on_host(&self, host: String, command: &str) -> HostOutput {
        debug!(host = %host, command = %command, "Running remote command");
        let output = Command::new(&self.ssh_program)
            .arg(&host)
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => HostOutput {
                host,
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => HostOutput {
                host,
                exit_code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl RemoteCommandExecutor for SshExecutor {
    async fn run_on_hosts(
        &self,
        selector: &str,
        command: &str,
    ) -> Result<Vec<HostOutput>, RemoteError> {
        let hosts = self.resolve_selector(selector);
        if hosts.is_empty() {
            return Err(RemoteError::NoHosts {
                selector: selector.to_string(),
            });
        }

        info!(
            selector = %selector,
            hosts = hosts.len(),
            command = %command,
            "Executing command on hosts"
        );

        let total = hosts.len();
        let outputs = join_all(hosts.into_iter().map(|h| self.run_on_host(h, command))).await;
        check_outputs(command, total, outputs)
    }
}

/// Turn per-host outputs into an error if any host failed.
pub(crate) fn check_outputs(
    command: &str,
    total: usize,
    outputs: Vec<HostOutput>,
) -> Result<Vec<HostOutput>, RemoteError> {
    let failures: Vec<&HostOutput> = outputs.iter().filter(|o| !o.success()).collect();
    if let Some(first) = failures.first() {
        error!(
            command = %command,
            failed = failures.len(),
            total,
            host = %first.host,
            stderr = %first.stderr.trim(),
            "Remote command failed"
        );
        return Err(RemoteError::CommandFailed {
            command: command.to_string(),
            failed: failures.len(),
            total,
            first_error: format!("{}: {}", first.host, first.stderr.trim()),
        });
    }
    Ok(outputs)
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod remote_tests;
