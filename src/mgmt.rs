// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The command/query gateway to the cluster management service.
//!
//! Every interaction with the cluster goes through the storage engine's admin
//! CLI, invoked as a subprocess against a named node. The gateway is the only
//! place that knows about subprocesses, exit statuses, and the CLI's output
//! quirks; everything above it sees commands, replies, and typed errors.

use std::process::Stdio;
use std::time::Duration;

use log::{error, info};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ProvisionError, Result};

/// Fixed ceiling on any single management command. Waiting for cluster-side
/// convergence happens in the poll loops, never inside one command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Output of a successfully completed management command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
}

/// One management command invocation against a cluster endpoint.
///
/// `host` overrides the default clustering endpoint for per-node queries;
/// `stdin` carries a JSON document for commands that read one. A non-zero
/// exit is a `Command` error; failing to run the CLI at all is `Transport`.
///
/// Implemented by [`MgmtCli`] in production and by the in-memory cluster
/// simulator in tests.
#[allow(async_fn_in_trait)]
pub trait Gateway {
    async fn execute(
        &self,
        host: Option<&str>,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput>;
}

/// Gateway implementation that shells out to the admin CLI.
#[derive(Debug)]
pub struct MgmtCli {
    program: String,
    default_host: String,
}

impl MgmtCli {
    pub fn new(program: String, default_host: String) -> Self {
        MgmtCli {
            program,
            default_host,
        }
    }
}

impl Gateway for MgmtCli {
    async fn execute(
        &self,
        host: Option<&str>,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput> {
        let host = host.unwrap_or(&self.default_host);
        let mut full_args = vec!["--host", host];
        full_args.extend_from_slice(args);
        exec(&self.program, &full_args, stdin).await
    }
}

/// Run a program to completion, classifying the outcome.
///
/// Shared by the management gateway and the cloud CLI callers; both have the
/// same needs: a piped stdin payload, captured output, a hard per-call
/// timeout, and logged stdout/stderr.
pub(crate) async fn exec(
    program: &str,
    args: &[&str],
    stdin: Option<&str>,
) -> Result<CommandOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let outcome = tokio::time::timeout(COMMAND_TIMEOUT, run_child(program, command, stdin)).await;
    let output = match outcome {
        Ok(output) => output?,
        Err(_) => {
            return Err(ProvisionError::Transport(format!(
                "'{program} {}' timed out after {}s",
                args.join(" "),
                COMMAND_TIMEOUT.as_secs()
            )));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !stdout.trim().is_empty() {
        info!("{}", stdout.trim());
    }
    if !stderr.trim().is_empty() {
        error!("{}", stderr.trim());
    }

    match output.status.code() {
        Some(0) => Ok(CommandOutput { stdout }),
        Some(code) => {
            error!("command failed: {program} {}", args.join(" "));
            Err(ProvisionError::Command {
                command: format!("{program} {}", args.join(" ")),
                code,
                stderr,
            })
        }
        None => Err(ProvisionError::Transport(format!(
            "'{program}' was terminated by a signal"
        ))),
    }
}

async fn run_child(
    program: &str,
    mut command: Command,
    stdin: Option<&str>,
) -> Result<std::process::Output> {
    let mut child = command
        .spawn()
        .map_err(|e| ProvisionError::Transport(format!("could not run {program}: {e}")))?;

    if let Some(payload) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(payload.as_bytes()).await.map_err(|e| {
                ProvisionError::Transport(format!("could not write to {program} stdin: {e}"))
            })?;
        }
    }

    child
        .wait_with_output()
        .await
        .map_err(|e| ProvisionError::Transport(format!("could not collect {program} output: {e}")))
}

/// Decode a JSON reply, tolerating the admin CLI's habit of printing
/// documents with Python-style single quotes.
pub fn lenient_json<T: DeserializeOwned>(reply: &str) -> Result<T> {
    match serde_json::from_str(reply) {
        Ok(value) => Ok(value),
        Err(strict) => serde_json::from_str(&reply.replace('\'', "\""))
            .map_err(|_| ProvisionError::Decode(format!("{strict}: {}", reply.trim()))),
    }
}
