// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The secret store client.
//!
//! Small scalar facts (node count, capacity limit, completion flag) live in
//! the cloud vault so they survive across runs and instances. Access goes
//! through the cloud CLI under instance-principal authentication; no
//! credentials are passed by this engine. Values are base64-wrapped on the
//! wire.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::{ProvisionError, Result};
use crate::mgmt;

#[allow(async_fn_in_trait)]
pub trait SecretStore {
    async fn get(&self, secret_id: &str) -> Result<String>;
    async fn put(&self, secret_id: &str, value: &str) -> Result<()>;
}

/// Secret store backed by the cloud vault.
#[derive(Debug)]
pub struct CloudVault {
    program: String,
}

impl CloudVault {
    pub fn new(program: String) -> Self {
        CloudVault { program }
    }
}

#[derive(Deserialize)]
struct SecretBundle {
    data: BundleData,
}

#[derive(Deserialize)]
struct BundleData {
    #[serde(rename = "secret-bundle-content")]
    content: BundleContent,
}

#[derive(Deserialize)]
struct BundleContent {
    content: String,
}

impl SecretStore for CloudVault {
    async fn get(&self, secret_id: &str) -> Result<String> {
        let reply = run_cloud_cli(
            &self.program,
            &[
                "secrets",
                "secret-bundle",
                "get",
                "--secret-id",
                secret_id,
                "--auth",
                "instance_principal",
            ],
        )
        .await?;

        let bundle: SecretBundle = serde_json::from_str(&reply)
            .map_err(|e| ProvisionError::Decode(format!("secret bundle for {secret_id}: {e}")))?;
        let bytes = BASE64
            .decode(bundle.data.content.content.trim())
            .map_err(|e| ProvisionError::Decode(format!("secret {secret_id} is not base64: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| ProvisionError::Decode(format!("secret {secret_id} is not UTF-8: {e}")))
    }

    async fn put(&self, secret_id: &str, value: &str) -> Result<()> {
        let encoded = BASE64.encode(value);
        run_cloud_cli(
            &self.program,
            &[
                "vault",
                "secret",
                "update-base64",
                "--secret-id",
                secret_id,
                "--secret-content-content",
                &encoded,
                "--auth",
                "instance_principal",
            ],
        )
        .await?;
        Ok(())
    }
}

/// Run the cloud CLI and return its stdout.
pub(crate) async fn run_cloud_cli(program: &str, args: &[&str]) -> Result<String> {
    let output = mgmt::exec(program, args, None).await?;
    Ok(output.stdout)
}
