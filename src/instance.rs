// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! End-of-run duties: signal completion and release the provisioner's own
//! compute instance.

use std::time::Duration;

use log::info;
use serde::Deserialize;

use crate::config::ProvisioningConfig;
use crate::error::{ProvisionError, Result};
use crate::secrets::{self, SecretStore};

/// Instance metadata endpoint, reachable only from inside the instance.
const METADATA_URL: &str = "http://169.254.169.254/opc/v2/instance/";

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Record that convergence succeeded. Deployment automation watches this
/// secret to learn the cluster is ready.
pub async fn signal_complete<S: SecretStore>(
    secrets: &S,
    config: &ProvisioningConfig,
) -> Result<()> {
    secrets.put(&config.secrets.complete, "true").await
}

#[derive(Deserialize)]
struct InstanceMetadata {
    id: String,
}

/// Stop the provisioner's own instance; it has no further work. Dev
/// environments keep it running so logs can be collected afterwards.
pub async fn stop_provisioner(cloud_cli: &str, config: &ProvisioningConfig) -> Result<()> {
    if config.deployment.dev_environment {
        info!("dev environment: leaving the provisioner instance running");
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .timeout(METADATA_TIMEOUT)
        .build()
        .map_err(|e| ProvisionError::Transport(format!("could not build metadata client: {e}")))?;
    let metadata: InstanceMetadata = client
        .get(METADATA_URL)
        .header("Authorization", "Bearer Oracle")
        .send()
        .await
        .map_err(|e| ProvisionError::Transport(format!("could not query instance metadata: {e}")))?
        .json()
        .await
        .map_err(|e| ProvisionError::Decode(format!("instance metadata: {e}")))?;

    info!("stopping provisioner instance {}", metadata.id);
    secrets::run_cloud_cli(
        cloud_cli,
        &[
            "compute",
            "instance",
            "action",
            "--instance-id",
            &metadata.id,
            "--action",
            "STOP",
            "--auth",
            "instance_principal",
        ],
    )
    .await?;
    Ok(())
}
