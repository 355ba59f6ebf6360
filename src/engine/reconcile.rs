// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Reconciling an existing cluster: membership, then buckets, then capacity,
//! then floating IPs. Each dimension converges independently; a dimension
//! already at its target issues no mutation.

use log::info;

use crate::config::{NodeSpec, ProvisioningConfig};
use crate::error::{ProvisionError, Result};
use crate::mgmt::{lenient_json, Gateway};
use crate::secrets::SecretStore;
use crate::survey::ClusterSurvey;

use super::Engine;

/// Which membership mutation a reconcile run needs, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// The primary node count differs from target; the swing pool is stable.
    Resize,
    /// The swing pool is requested but not fully in quorum.
    ActivateSwing,
    /// The swing pool is no longer requested; drain its remaining nodes.
    DrainSwing,
}

/// Decide the membership mutation from the observed in-quorum counts.
///
/// Changing the primary node count and the swing-pool state in the same run
/// is forbidden: membership recomputation could not tell which change caused
/// an observed mismatch, so the combination fails before any mutation.
pub fn membership_change(
    in_quorum_primary: usize,
    in_quorum_swing: usize,
    config: &ProvisioningConfig,
) -> Result<Option<MembershipChange>> {
    let swing = &config.swing;
    if in_quorum_primary != config.nodes.count {
        if (swing.enabled && in_quorum_swing == 0) || (!swing.enabled && in_quorum_swing > 0) {
            return Err(ProvisionError::Precondition(
                "cannot change node count and change swing pool state at the same time"
                    .to_string(),
            ));
        }
        return Ok(Some(MembershipChange::Resize));
    }
    if swing.enabled && in_quorum_swing != swing.count {
        return Ok(Some(MembershipChange::ActivateSwing));
    }
    if !swing.enabled && in_quorum_swing > 0 {
        return Ok(Some(MembershipChange::DrainSwing));
    }
    Ok(None)
}

impl<G: Gateway, S: SecretStore> Engine<'_, G, S> {
    pub(crate) async fn reconcile(
        &self,
        primary: &ClusterSurvey,
        swing: &ClusterSurvey,
    ) -> Result<()> {
        self.login().await?;

        let config = self.config;
        match membership_change(primary.in_quorum_count(), swing.in_quorum_count(), config)? {
            Some(MembershipChange::Resize) => {
                info!(
                    "changing the number of nodes in the cluster from {} to {}",
                    primary.in_quorum_count(),
                    config.nodes.count
                );
                let (swing_target, swing_members): (usize, &[NodeSpec]) = if config.swing.enabled {
                    (config.swing.count, &config.swing.members)
                } else {
                    (0, &[])
                };
                self.update_membership(config.nodes.count, swing_target, swing_members)
                    .await?;
            }
            Some(MembershipChange::ActivateSwing) => {
                info!("activating swing pool nodes");
                self.update_membership(config.nodes.count, config.swing.count, &config.swing.members)
                    .await?;
            }
            Some(MembershipChange::DrainSwing) => {
                info!("deactivating swing pool nodes");
                self.update_membership(config.nodes.count, 0, &[]).await?;
            }
            None => {}
        }

        self.converge_buckets().await?;
        self.converge_capacity().await?;
        self.maybe_update_floating_ips(&primary.revision).await?;
        Ok(())
    }

    /// Replace the full cluster membership and wait until it takes effect.
    ///
    /// The membership command is a full replacement, not an incremental
    /// add/remove, and it returns before the new membership is durably
    /// formed: both the quorum and the reported membership length have to
    /// settle before the node count is recorded. Swing nodes are ephemeral
    /// capacity and are excluded from the recorded count.
    async fn update_membership(
        &self,
        primary_target: usize,
        swing_target: usize,
        swing_members: &[NodeSpec],
    ) -> Result<()> {
        let mut members: Vec<String> = self.config.nodes.members[..primary_target]
            .iter()
            .map(NodeSpec::to_string)
            .collect();
        members.extend(swing_members.iter().map(NodeSpec::to_string));
        let member_list = members.join(" ");

        info!("running cluster membership change with nodes: {member_list}");
        self.gateway
            .execute(
                None,
                &[
                    "modify_object_backed_cluster_membership",
                    "--node-ips-and-fault-domains",
                    member_list.as_str(),
                    "--batch",
                ],
                None,
            )
            .await?;

        self.wait_for_new_quorum().await?;
        self.wait_for_membership_count(primary_target + swing_target)
            .await?;

        self.secrets
            .put(&self.config.secrets.node_count, &primary_target.to_string())
            .await?;
        Ok(())
    }

    /// Buckets are only ever added by this engine; shrinking the set is not
    /// supported.
    async fn converge_buckets(&self) -> Result<()> {
        let reply = self
            .gateway
            .execute(None, &["get_object_storage_uris"], None)
            .await?;
        let current: Vec<String> = lenient_json(&reply.stdout)?;
        let declared = &self.config.storage.uris;

        if current.len() < declared.len() {
            info!(
                "updating the cluster to use the following buckets: {}",
                declared.join(" ")
            );
            let uris = declared.join(" ");
            self.gateway
                .execute(
                    None,
                    &["add_object_storage_uris", "--uris", uris.as_str()],
                    None,
                )
                .await?;
            self.wait_for_new_quorum().await?;
        }
        Ok(())
    }

    /// Raise the capacity clamp when the declared limit exceeds the recorded
    /// one.
    ///
    /// The secret store, not the cluster, records the last limit we
    /// successfully requested; the cluster converges first and the record is
    /// updated second, so the record never claims a capacity ahead of the
    /// cluster.
    async fn converge_capacity(&self) -> Result<()> {
        let recorded = self
            .secrets
            .get(&self.config.secrets.capacity_limit)
            .await?;
        let recorded: u64 = recorded.trim().parse().map_err(|_| {
            ProvisionError::Decode(format!(
                "recorded capacity limit '{}' is not an integer",
                recorded.trim()
            ))
        })?;
        info!("current cluster capacity in TB: {recorded}");

        let declared = self.config.storage.soft_capacity_limit_tb;
        if declared > recorded {
            info!("increasing cluster capacity to {declared}TB");
            let clamp = format!("{declared}TB");
            self.gateway
                .execute(None, &["capacity_clamp_set", "--clamp", clamp.as_str()], None)
                .await?;
            self.wait_for_new_quorum().await?;

            self.secrets
                .put(&self.config.secrets.capacity_limit, &declared.to_string())
                .await?;
        }
        Ok(())
    }
}
