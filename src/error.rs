// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::fmt;

/// Everything that can go wrong during a provisioning run.
///
/// The variants matter to callers: the wait loops treat `Command` and
/// `Transport` as "not yet" while a cluster operation settles, whereas
/// `Precondition` always aborts the run before any further mutation.
#[derive(Debug)]
pub enum ProvisionError {
    /// The cluster is in a state against which convergence must not be
    /// attempted. The operator has to resolve it before re-running.
    Precondition(String),

    /// A management command ran to completion but reported failure.
    Command {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The management endpoint or the secret store could not be reached.
    Transport(String),

    /// A reply could not be decoded, even tolerating loose quoting.
    Decode(String),

    /// The declared configuration is invalid.
    Config(String),

    /// A bounded wait expired. Only reachable when a poll deadline is set;
    /// the production waits are unbounded.
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precondition(msg) => write!(f, "precondition failed: {msg}"),
            Self::Command {
                command,
                code,
                stderr,
            } => {
                write!(f, "command failed with exit code {code}: {command}")?;
                if !stderr.trim().is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                Ok(())
            }
            Self::Transport(msg) => write!(f, "transport failure: {msg}"),
            Self::Decode(msg) => write!(f, "could not decode reply: {msg}"),
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Timeout(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ProvisionError {}
