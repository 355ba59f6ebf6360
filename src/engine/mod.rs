// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The convergence engine.
//!
//! Given surveys of the primary and swing pools plus the declared
//! configuration, the engine either bootstraps a new cluster or reconciles an
//! existing one, driving each dimension (membership, buckets, capacity,
//! floating IPs) to its target with idempotent, poll-until-settled
//! operations. There is no rollback: a run that fails partway leaves its
//! progress in the cluster, and the next invocation re-surveys and resumes
//! from whatever the cluster reports.

pub mod bootstrap;
pub mod network;
pub mod reconcile;

use log::info;
use serde::Deserialize;

use crate::config::ProvisioningConfig;
use crate::error::{ProvisionError, Result};
use crate::mgmt::{lenient_json, Gateway};
use crate::poll::{self, PollSettings};
use crate::secrets::SecretStore;
use crate::survey::{node_status_from_reply, ClusterSurvey, NodeQuorumStatus};

/// What a run will do to the cluster, decided from the surveys alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Bootstrap,
    Reconcile,
}

/// Decide between forming a new cluster and reconciling an existing one.
///
/// The target cluster exists exactly when some node, in either pool, is in
/// quorum. A crash after a partial bootstrap leaves nodes in quorum, so the
/// next run lands in reconcile rather than a second bootstrap.
pub fn choose_action(primary: &ClusterSurvey, swing: &ClusterSurvey) -> Action {
    if primary.in_quorum_count() == 0 && swing.in_quorum_count() == 0 {
        Action::Bootstrap
    } else {
        Action::Reconcile
    }
}

#[derive(Debug, Deserialize)]
pub struct MembershipReply {
    pub membership: Membership,
}

#[derive(Debug, Deserialize)]
pub struct Membership {
    pub node_ips_and_fault_domains: Vec<String>,
}

/// Drives one convergence run against a cluster.
pub struct Engine<'a, G, S> {
    pub(crate) gateway: &'a G,
    pub(crate) secrets: &'a S,
    pub(crate) config: &'a ProvisioningConfig,
    pub(crate) polls: PollSettings,
}

impl<'a, G: Gateway, S: SecretStore> Engine<'a, G, S> {
    pub fn new(
        gateway: &'a G,
        secrets: &'a S,
        config: &'a ProvisioningConfig,
        polls: PollSettings,
    ) -> Self {
        Engine {
            gateway,
            secrets,
            config,
            polls,
        }
    }

    /// Run one full convergence pass from the given surveys.
    ///
    /// Any out-of-quorum node in either pool is fatal: convergence against a
    /// partially-unreachable cluster is never attempted.
    pub async fn run(&self, primary: &ClusterSurvey, swing: &ClusterSurvey) -> Result<()> {
        let unreachable = primary.out_of_quorum();
        if !unreachable.is_empty() {
            return Err(ProvisionError::Precondition(format!(
                "found out of quorum nodes at {}; come back when the cluster is healthy",
                unreachable.join(" ")
            )));
        }
        let unreachable = swing.out_of_quorum();
        if !unreachable.is_empty() {
            return Err(ProvisionError::Precondition(format!(
                "found out of quorum swing pool nodes at {}; come back when the cluster is healthy",
                unreachable.join(" ")
            )));
        }

        match choose_action(primary, swing) {
            Action::Bootstrap => self.bootstrap().await,
            Action::Reconcile => self.reconcile(primary, swing).await,
        }
    }

    /// Authenticate the management session against the cluster.
    pub(crate) async fn login(&self) -> Result<()> {
        self.gateway
            .execute(
                None,
                &[
                    "login",
                    "-u",
                    "admin",
                    "-p",
                    self.config.cluster.admin_password.as_str(),
                ],
                None,
            )
            .await?;
        Ok(())
    }

    /// Wait for the cluster to report an active quorum.
    ///
    /// Membership and configuration changes tear down the current quorum;
    /// failures while the new one forms are "not yet", never fatal.
    pub(crate) async fn wait_for_new_quorum(&self) -> Result<()> {
        poll::until(&self.polls.quorum, "new quorum", || async move {
            match self.gateway.execute(None, &["node_state_get"], None).await {
                Ok(reply) => {
                    (node_status_from_reply(&reply.stdout) == NodeQuorumStatus::InQuorum)
                        .then_some(())
                }
                Err(_) => None,
            }
        })
        .await?;
        info!("new quorum formed");
        Ok(())
    }

    /// Wait until the cluster's reported membership has the expected length.
    /// Membership metadata can lag quorum formation, so this is a separate
    /// wait from [`Self::wait_for_new_quorum`].
    pub(crate) async fn wait_for_membership_count(&self, expected: usize) -> Result<()> {
        poll::until(&self.polls.quorum, "new cluster membership", || async move {
            let reply = self
                .gateway
                .execute(None, &["get_object_backed_nodes"], None)
                .await
                .ok()?;
            let nodes: MembershipReply = lenient_json(&reply.stdout).ok()?;
            (nodes.membership.node_ips_and_fault_domains.len() == expected).then_some(())
        })
        .await?;
        info!("new cluster membership in effect");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::{NodeReport, NodeQuorumStatus};

    fn survey_of(statuses: &[NodeQuorumStatus]) -> ClusterSurvey {
        ClusterSurvey {
            revision: "7.5.1".to_string(),
            reports: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| NodeReport {
                    address: format!("10.0.0.{i}"),
                    status: *status,
                })
                .collect(),
        }
    }

    #[test]
    fn no_quorum_anywhere_bootstraps() {
        let primary = survey_of(&[
            NodeQuorumStatus::Unconfigured,
            NodeQuorumStatus::Unconfigured,
        ]);
        let swing = ClusterSurvey::empty("7.5.1");
        assert_eq!(choose_action(&primary, &swing), Action::Bootstrap);
    }

    #[test]
    fn any_quorum_reconciles() {
        let primary = survey_of(&[NodeQuorumStatus::InQuorum, NodeQuorumStatus::Unconfigured]);
        let swing = ClusterSurvey::empty("7.5.1");
        assert_eq!(choose_action(&primary, &swing), Action::Reconcile);

        let primary = survey_of(&[NodeQuorumStatus::Unconfigured]);
        let swing = survey_of(&[NodeQuorumStatus::InQuorum]);
        assert_eq!(choose_action(&primary, &swing), Action::Reconcile);
    }
}
