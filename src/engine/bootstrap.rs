// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Forming a new cluster.
//!
//! Bootstrap runs only when no node in either pool is in quorum; the
//! top-level decision routes every other situation into reconcile, which is
//! what makes re-running after a crash safe.

use log::info;

use crate::error::Result;
use crate::mgmt::Gateway;
use crate::secrets::SecretStore;

use super::Engine;

/// Socket receive timeout applied to the cluster's object-storage client, in
/// milliseconds. Keeps client I/O from stalling indefinitely when a backing
/// store stops answering.
const OBJECT_CLIENT_RECV_TIMEOUT_MS: u32 = 10_000;

impl<G: Gateway, S: SecretStore> Engine<'_, G, S> {
    /// Create the cluster named by the configuration and bring it to a state
    /// where it answers client traffic.
    pub(crate) async fn bootstrap(&self) -> Result<()> {
        let config = self.config;
        if config.nodes.count == 0 {
            return Ok(());
        }

        info!(
            "all of the nodes are out of quorum, forming a new cluster with {} nodes",
            config.nodes.count
        );

        let members = config.primary_members();
        let member_list = members.join(" ");
        let clamp = format!("{}TB", config.storage.soft_capacity_limit_tb);
        let uris = config.storage.uris.join(" ");

        self.gateway
            .execute(
                None,
                &[
                    "create_object_backed_cluster",
                    "--cluster-name",
                    config.cluster.name.as_str(),
                    "--admin-password",
                    config.cluster.admin_password.as_str(),
                    "--host-instance-id",
                    config.nodes.clustering_instance_id.as_str(),
                    "--accept-eula",
                    "--usable-capacity-clamp",
                    clamp.as_str(),
                    "--product-type",
                    config.cluster.product_type.as_str(),
                    "--object-storage-uris",
                    uris.as_str(),
                    "--node-ips-and-fault-domains",
                    member_list.as_str(),
                    "--key-vault",
                    config.secrets.key_vault.as_str(),
                ],
                None,
            )
            .await?;

        // The secret store becomes the durable record that future reconcile
        // runs compare against.
        self.secrets
            .put(&config.secrets.node_count, &members.len().to_string())
            .await?;
        self.secrets
            .put(
                &config.secrets.permanent_disk_count,
                &config.storage.permanent_disk_count.to_string(),
            )
            .await?;
        self.secrets
            .put(
                &config.secrets.capacity_limit,
                &config.storage.soft_capacity_limit_tb.to_string(),
            )
            .await?;

        self.login().await?;

        info!("setting object client receive timeout to {OBJECT_CLIENT_RECV_TIMEOUT_MS}ms");
        let tunable = serde_json::json!({
            "configured_value": OBJECT_CLIENT_RECV_TIMEOUT_MS.to_string(),
        })
        .to_string();
        self.gateway
            .execute(
                None,
                &[
                    "raw",
                    "--content-type",
                    "application/json",
                    "PUT",
                    "/v1/tunables/s3_object_client_socket_recv_timeout_ms",
                ],
                Some(&tunable),
            )
            .await?;

        if config.deployment.dev_environment {
            if let (Some(mq_host), Some(api_host)) = (
                &config.deployment.staging_mq_host,
                &config.deployment.staging_api_host,
            ) {
                info!("dev environment: pointing monitoring at staging endpoints");
                self.gateway
                    .execute(
                        None,
                        &[
                            "set_monitoring_conf",
                            "--mq-host",
                            mq_host.as_str(),
                            "--nexus-host",
                            api_host.as_str(),
                        ],
                        None,
                    )
                    .await?;
            }
        }

        self.apply_initial_floating_ips(&config.network.floating_ips, &config.network.netmask)
            .await?;

        info!("restarting quorum to ready the cluster for client access");
        self.gateway
            .execute(None, &["raw", "POST", "/v1/debug/quorum/abandon"], None)
            .await?;
        self.wait_for_new_quorum().await
    }
}
