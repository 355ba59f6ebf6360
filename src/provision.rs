// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! One full provisioning run: survey both pools, converge, signal completion.
//!
//! Runs are re-entrant: a run interrupted partway leaves its progress in the
//! cluster and the secret store, and the next invocation resumes from
//! whatever the surveys report. There is no rollback.

use log::info;

use crate::config::ProvisioningConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::instance;
use crate::mgmt::Gateway;
use crate::poll::PollSettings;
use crate::secrets::SecretStore;
use crate::survey::{self, ClusterSurvey};

pub async fn run<G: Gateway, S: SecretStore>(
    gateway: &G,
    secrets: &S,
    config: &ProvisioningConfig,
    polls: PollSettings,
) -> Result<()> {
    let revision = survey::node_revision(gateway, &config.nodes.clustering_address).await?;
    info!("cluster software revision: {revision}");

    let primary_addresses: Vec<String> = config
        .nodes
        .members
        .iter()
        .map(|node| node.address.clone())
        .collect();
    let primary = survey::survey_pool(gateway, &primary_addresses, &revision).await?;

    let swing = if config.swing.members.is_empty() {
        ClusterSurvey::empty(&revision)
    } else {
        let swing_addresses: Vec<String> = config
            .swing
            .members
            .iter()
            .map(|node| node.address.clone())
            .collect();
        survey::survey_pool(gateway, &swing_addresses, &revision).await?
    };

    let engine = Engine::new(gateway, secrets, config, polls);
    engine.run(&primary, &swing).await?;

    info!("provisioning completed successfully");
    instance::signal_complete(secrets, config).await
}
