// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The cluster surveyor.
//!
//! A survey asks every node in a pool for its software revision and quorum
//! status, and classifies the whole set. Surveys are rebuilt on every
//! invocation and never cached across convergence steps, because membership
//! can change mid-run.

use log::info;
use serde::Deserialize;

use crate::error::{ProvisionError, Result};
use crate::mgmt::{lenient_json, Gateway};

/// Quorum-relevant state of one node, decoded from its node-state query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeQuorumStatus {
    /// Participating in an active quorum.
    InQuorum,
    /// Booted but never joined a cluster.
    Unconfigured,
    /// Previously a cluster member, since removed.
    Removed,
    /// Unreachable, or in a state this engine does not recognize.
    OutOfQuorum,
}

#[derive(Debug, Deserialize)]
struct NodeStateReply {
    state: String,
}

#[derive(Debug, Deserialize)]
struct VersionReply {
    revision_id: String,
}

/// One node's survey result.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub address: String,
    pub status: NodeQuorumStatus,
}

/// Snapshot of a node pool: every address classified exactly once, plus the
/// software revision the pool was verified against.
#[derive(Debug, Clone, Default)]
pub struct ClusterSurvey {
    pub revision: String,
    pub reports: Vec<NodeReport>,
}

impl ClusterSurvey {
    /// A survey of an empty pool.
    pub fn empty(revision: &str) -> Self {
        ClusterSurvey {
            revision: revision.to_string(),
            reports: Vec::new(),
        }
    }

    pub fn in_quorum(&self) -> Vec<&str> {
        self.with_status(NodeQuorumStatus::InQuorum)
    }

    pub fn out_of_quorum(&self) -> Vec<&str> {
        self.with_status(NodeQuorumStatus::OutOfQuorum)
    }

    pub fn in_quorum_count(&self) -> usize {
        self.in_quorum().len()
    }

    fn with_status(&self, status: NodeQuorumStatus) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|report| report.status == status)
            .map(|report| report.address.as_str())
            .collect()
    }

    fn count(&self, status: NodeQuorumStatus) -> usize {
        self.with_status(status).len()
    }
}

/// Decode a node-state reply into a quorum status. Undecodable replies count
/// as out of quorum, the same as an unrecognized state.
pub fn node_status_from_reply(reply: &str) -> NodeQuorumStatus {
    match lenient_json::<NodeStateReply>(reply) {
        Ok(node) => classify(&node.state),
        Err(_) => NodeQuorumStatus::OutOfQuorum,
    }
}

fn classify(state: &str) -> NodeQuorumStatus {
    match state {
        "ACTIVE" => NodeQuorumStatus::InQuorum,
        "UNCONFIGURED" => NodeQuorumStatus::Unconfigured,
        "REMOVED" => NodeQuorumStatus::Removed,
        _ => NodeQuorumStatus::OutOfQuorum,
    }
}

/// Strip a revision string down to its numeric form, e.g.
/// "Storage Core 7.5.1" to "7.5.1".
pub fn numeric_revision(revision_id: &str) -> String {
    revision_id
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

/// Query one node's software revision.
pub async fn node_revision<G: Gateway>(gateway: &G, address: &str) -> Result<String> {
    let reply = gateway
        .execute(Some(address), &["raw", "GET", "/v1/version"], None)
        .await?;
    let version: VersionReply = lenient_json(&reply.stdout)?;
    Ok(numeric_revision(&version.revision_id))
}

/// Survey a pool of nodes against the reference `revision`.
///
/// Convergence across mixed software revisions is unsafe, so any node
/// reporting a different revision aborts the run. A node whose state query
/// fails is reported `OutOfQuorum` and not retried here; the caller decides
/// whether out-of-quorum nodes are acceptable.
pub async fn survey_pool<G: Gateway>(
    gateway: &G,
    addresses: &[String],
    revision: &str,
) -> Result<ClusterSurvey> {
    let mut reports = Vec::with_capacity(addresses.len());
    for address in addresses {
        let observed = node_revision(gateway, address).await?;
        if observed != revision {
            return Err(ProvisionError::Precondition(format!(
                "node at {address} has the wrong software revision {observed}; \
                 make sure all nodes are at revision {revision}"
            )));
        }

        let status = match gateway
            .execute(Some(address.as_str()), &["node_state_get"], None)
            .await
        {
            Ok(reply) => node_status_from_reply(&reply.stdout),
            Err(_) => NodeQuorumStatus::OutOfQuorum,
        };
        reports.push(NodeReport {
            address: address.clone(),
            status,
        });
    }

    let survey = ClusterSurvey {
        revision: revision.to_string(),
        reports,
    };
    info!(
        "{} nodes unconfigured, {} nodes out of quorum, {} nodes removed, {} nodes in quorum",
        survey.count(NodeQuorumStatus::Unconfigured),
        survey.count(NodeQuorumStatus::OutOfQuorum),
        survey.count(NodeQuorumStatus::Removed),
        survey.in_quorum_count(),
    );
    Ok(survey)
}
