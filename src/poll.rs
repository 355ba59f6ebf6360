// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The single wait primitive shared by every "wait for X" operation.
//!
//! Cluster convergence operations have no fixed completion deadline, so the
//! production waits prefer to retry forever over declaring an ultimately
//! transient condition a permanent failure. The absence of a deadline is an
//! explicit, named value rather than an implicit loop shape, so tests can
//! bound every wait.

use std::future::Future;
use std::time::Duration;

use log::debug;

use crate::error::{ProvisionError, Result};

/// The production choice for quorum and membership waits: no deadline.
pub const UNBOUNDED: Option<Duration> = None;

/// How a wait loop paces itself.
#[derive(Debug, Clone, Copy)]
pub struct Poll {
    pub interval: Duration,
    pub deadline: Option<Duration>,
}

impl Poll {
    pub const fn new(interval: Duration, deadline: Option<Duration>) -> Self {
        Poll { interval, deadline }
    }
}

/// Poll pacing for each kind of wait a run performs.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Quorum formation and membership-metadata waits.
    pub quorum: Poll,
    /// Floating-IP application waits on the network-status endpoint.
    pub network: Poll,
    /// Pre-survey readiness probing of the management service.
    pub readiness: Poll,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            quorum: Poll::new(Duration::from_secs(10), UNBOUNDED),
            network: Poll::new(Duration::from_secs(10), UNBOUNDED),
            readiness: Poll::new(Duration::from_secs(10), UNBOUNDED),
        }
    }
}

/// Run `probe` until it yields a value, sleeping `poll.interval` between
/// attempts. `None` from the probe means "not yet"; probes are expected to
/// swallow transport errors into `None` themselves.
pub async fn until<T, F, Fut>(poll: &Poll, what: &str, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = tokio::time::Instant::now();
    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }
        if let Some(deadline) = poll.deadline {
            if started.elapsed() >= deadline {
                return Err(ProvisionError::Timeout(format!(
                    "gave up waiting for {what}"
                )));
            }
        }
        debug!("waiting for {what}");
        tokio::time::sleep(poll.interval).await;
    }
}
