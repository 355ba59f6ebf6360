// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Floating-IP convergence, shared by bootstrap and reconcile.
//!
//! This engine manages exactly one frontend network (index 0). The network
//! document is modeled with typed fields for what we manage and flattened
//! maps for everything else, so a read-modify-write round-trip never drops
//! fields owned by other tooling.

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProvisionError, Result};
use crate::mgmt::{lenient_json, Gateway};
use crate::poll;
use crate::secrets::SecretStore;

use super::Engine;

/// Lowest revision whose management API carries the v3 network endpoints.
/// Compared against the first three digits of the revision string.
const NETWORK_V3_MIN_REVISION: u32 = 751;

/// Whether the surveyed revision supports floating-IP management. Below the
/// gate the whole dimension is silently skipped; this is a capability test,
/// not a failure.
pub fn supports_floating_ips(revision: &str) -> bool {
    let digits: String = revision
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(3)
        .collect();
    match digits.parse::<u32>() {
        Ok(n) => n >= NETWORK_V3_MIN_REVISION,
        Err(_) => false,
    }
}

/// The cluster's frontend network document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub frontend_networks: Vec<FrontendNetwork>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendNetwork {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<AddressAssignment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressAssignment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_addresses: Option<HostAddresses>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostAddresses {
    #[serde(default)]
    pub floating_ip_ranges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NetworkConfig {
    /// The floating-IP ranges of the single managed frontend network.
    pub fn floating_ip_ranges(&self) -> &[String] {
        self.frontend_networks
            .first()
            .and_then(|net| net.addresses.as_ref())
            .and_then(|addrs| addrs.host_addresses.as_ref())
            .map(|hosts| hosts.floating_ip_ranges.as_slice())
            .unwrap_or(&[])
    }

    /// The initial document submitted when no frontend network exists yet.
    pub fn initial(floating_ips: &[String], netmask: &str) -> Self {
        NetworkConfig {
            frontend_networks: vec![FrontendNetwork {
                id: 1,
                name: "default".to_string(),
                addresses: Some(AddressAssignment {
                    kind: "HOST".to_string(),
                    host_addresses: Some(HostAddresses {
                        floating_ip_ranges: floating_ips.to_vec(),
                        netmask: Some(netmask.to_string()),
                        extra: Map::new(),
                    }),
                    extra: Map::new(),
                }),
                extra: Map::new(),
            }],
            extra: Map::new(),
        }
    }
}

/// What floating-IP convergence will do, decided from the current document
/// and the declared address list.
#[derive(Debug, Clone, PartialEq)]
pub enum FlipPlan {
    /// Current and declared ranges match; nothing to submit.
    Noop,
    /// No frontend network (or an empty range) exists yet: build the initial
    /// configuration and settle on the network-status endpoint.
    ApplyInitial,
    /// Replace the existing range with the declared list; structural change,
    /// settles on quorum.
    Replace(NetworkConfig),
    /// Declared list is empty: remove the frontend network entirely rather
    /// than leaving an empty range; structural change, settles on quorum.
    Clear(NetworkConfig),
}

/// Plan floating-IP convergence.
///
/// Range equality is literal ordered-list equality: a reordered but
/// otherwise equal declared list counts as changed and is resubmitted.
/// Callers supply floating IPs in a stable order.
pub fn plan_floating_ips(mut current: NetworkConfig, declared: &[String]) -> FlipPlan {
    if current.floating_ip_ranges().is_empty() {
        return FlipPlan::ApplyInitial;
    }
    if current.floating_ip_ranges() == declared {
        return FlipPlan::Noop;
    }
    if declared.is_empty() {
        current.frontend_networks.clear();
        return FlipPlan::Clear(current);
    }
    if let Some(hosts) = current
        .frontend_networks
        .first_mut()
        .and_then(|net| net.addresses.as_mut())
        .and_then(|addrs| addrs.host_addresses.as_mut())
    {
        hosts.floating_ip_ranges = declared.to_vec();
    }
    FlipPlan::Replace(current)
}

/// Whether any entry in a network-status reply carries a floating-address
/// assignment field.
fn has_floating_addresses(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key("floating_addresses") || map.values().any(has_floating_addresses)
        }
        Value::Array(items) => items.iter().any(has_floating_addresses),
        _ => false,
    }
}

impl<G: Gateway, S: SecretStore> Engine<'_, G, S> {
    /// Converge the cluster's floating-IP set, when the revision supports it.
    pub async fn maybe_update_floating_ips(&self, revision: &str) -> Result<()> {
        if !supports_floating_ips(revision) {
            return Ok(());
        }

        let reply = self
            .gateway
            .execute(None, &["network_v3_get_config"], None)
            .await?;
        let current: NetworkConfig = lenient_json(&reply.stdout)?;
        let declared = &self.config.network.floating_ips;

        match plan_floating_ips(current, declared) {
            FlipPlan::Noop => Ok(()),
            FlipPlan::ApplyInitial => {
                info!("no floating IPs configured, applying initial floating IPs");
                self.apply_initial_floating_ips(declared, &self.config.network.netmask)
                    .await
            }
            FlipPlan::Clear(network) => {
                info!("floating IPs unset, clearing network config");
                self.submit_network_config(&network).await
            }
            FlipPlan::Replace(network) => {
                info!("updating floating IPs to {}", declared.join(", "));
                self.submit_network_config(&network).await
            }
        }
    }

    /// Submit a structurally changed network document. Structural changes
    /// are only safely confirmed once quorum re-stabilizes.
    async fn submit_network_config(&self, network: &NetworkConfig) -> Result<()> {
        let document = serde_json::to_string(network)
            .map_err(|e| ProvisionError::Decode(format!("network config: {e}")))?;
        self.gateway
            .execute(None, &["network_v3_put_config"], Some(&document))
            .await?;
        self.wait_for_new_quorum().await
    }

    /// Build and submit the initial frontend-network configuration, then
    /// wait until the network-status endpoint reports floating addresses.
    /// Address application is directly observable there, so this path does
    /// not wait on quorum.
    pub(crate) async fn apply_initial_floating_ips(
        &self,
        floating_ips: &[String],
        netmask: &str,
    ) -> Result<()> {
        if floating_ips.is_empty() {
            return Ok(());
        }

        info!(
            "applying network configuration with floating IPs: {}",
            floating_ips.join(", ")
        );

        let network = NetworkConfig::initial(floating_ips, netmask);
        let document = serde_json::to_string(&network)
            .map_err(|e| ProvisionError::Decode(format!("network config: {e}")))?;
        self.gateway
            .execute(
                None,
                &[
                    "raw",
                    "--content-type",
                    "application/json",
                    "PUT",
                    "/v3/network",
                ],
                Some(&document),
            )
            .await?;

        poll::until(
            &self.polls.network,
            "network configuration to apply",
            || async move {
                let reply = self
                    .gateway
                    .execute(None, &["raw", "GET", "/v3/network/status"], None)
                    .await
                    .ok()?;
                let status: Value = lenient_json(&reply.stdout).ok()?;
                has_floating_addresses(&status).then_some(())
            },
        )
        .await?;
        info!("network configuration applied");
        Ok(())
    }
}
