// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Pre-survey readiness probing.
//!
//! A fresh instance races the storage engine's service start on every node,
//! so nothing may query or mutate cluster state until each node's management
//! endpoint answers. Nodes present self-signed certificates, so certificate
//! verification is disabled for the probe.

use std::time::Duration;

use futures::future;
use log::info;

use crate::error::{ProvisionError, Result};
use crate::poll::{self, Poll};

/// Per-request ceiling on one readiness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Block until the management service answers on every given node.
///
/// Nodes still booting are expected here, so every failure is "not yet"; the
/// production poll settings leave this unbounded.
pub async fn wait_for_management(addresses: &[String], port: u16, poll: &Poll) -> Result<()> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| ProvisionError::Transport(format!("could not build probe client: {e}")))?;

    let probes = addresses.iter().map(|address| {
        let client = client.clone();
        async move {
            let url = format!("https://{address}:{port}/v1/node/state");
            poll::until(poll, &format!("management service on {address}"), || {
                let client = client.clone();
                let url = url.clone();
                async move {
                    match client.get(&url).send().await {
                        Ok(reply) if reply.status().is_success() => Some(()),
                        _ => None,
                    }
                }
            })
            .await?;
            info!("management service is up on {address}");
            Ok(())
        }
    });

    future::join_all(probes)
        .await
        .into_iter()
        .collect::<Result<Vec<()>>>()?;
    Ok(())
}
