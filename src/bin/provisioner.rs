// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::Parser;
use log::{error, info};

use anneal_lib::{
    config::ProvisioningConfig,
    error::{ProvisionError, Result},
    instance,
    mgmt::MgmtCli,
    poll::PollSettings,
    probe, provision,
    secrets::CloudVault,
};

/// Converge an object-backed storage cluster to its declared configuration.
///
/// Runs once per boot of the provisioner instance: waits for every declared
/// node's management service, surveys the cluster, creates or reconciles it,
/// then signals completion and stops this instance.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the declared cluster configuration.
    #[arg(long)]
    config: Option<String>,

    /// Leave the provisioner instance running after a successful run.
    #[arg(long)]
    keep_instance: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("ANNEAL_LOG", "info"))
        .init();

    let args = Cli::parse();
    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => anneal_lib::default_config_path(),
    };
    let config = ProvisioningConfig::load(&path)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| ProvisionError::Transport(format!("could not launch runtime: {e}")))?;

    rt.block_on(async {
        let gateway = MgmtCli::new(
            anneal_lib::default_mgmt_cli(),
            config.nodes.clustering_address.clone(),
        );
        let secrets = CloudVault::new(anneal_lib::default_cloud_cli());
        let polls = PollSettings::default();
        let port = anneal_lib::mgmt_port();

        let primary_addresses: Vec<String> = config
            .nodes
            .members
            .iter()
            .map(|node| node.address.clone())
            .collect();
        info!(
            "waiting for cluster nodes to be up and running: {}",
            primary_addresses.join(" ")
        );
        probe::wait_for_management(&primary_addresses, port, &polls.readiness).await?;

        if config.swing.enabled && !config.swing.members.is_empty() {
            let swing_addresses: Vec<String> = config
                .swing
                .members
                .iter()
                .map(|node| node.address.clone())
                .collect();
            info!(
                "waiting for swing pool nodes to be up and running: {}",
                swing_addresses.join(" ")
            );
            probe::wait_for_management(&swing_addresses, port, &polls.readiness).await?;
        }

        provision::run(&gateway, &secrets, &config, polls).await?;

        if !args.keep_instance {
            instance::stop_provisioner(&anneal_lib::default_cloud_cli(), &config).await?;
        }
        Ok(())
    })
}
