// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

pub mod config;
pub mod engine;
pub mod error;
pub mod instance;
pub mod mgmt;
pub mod poll;
pub mod probe;
pub mod provision;
pub mod secrets;
pub mod survey;
pub mod test_env;

/// Gets the port that the cluster management service listens on.
pub fn mgmt_port() -> u16 {
    match std::env::var("ANNEAL_MGMT_PORT") {
        Ok(port) => port
            .parse::<u16>()
            .expect("ANNEAL_MGMT_PORT must be a valid port number"),
        Err(_) => 8000,
    }
}

pub fn default_config_path() -> String {
    match std::env::var("ANNEAL_CONFIG") {
        Ok(conf) => conf,
        Err(_) => "/etc/anneal/provision.toml".to_string(),
    }
}

/// Path to the storage engine's admin CLI on this instance.
pub fn default_mgmt_cli() -> String {
    match std::env::var("ANNEAL_MGMT_CLI") {
        Ok(cli) => cli,
        Err(_) => "/usr/bin/clusterctl".to_string(),
    }
}

/// Path to the cloud CLI used for the vault and instance control.
pub fn default_cloud_cli() -> String {
    match std::env::var("ANNEAL_CLOUD_CLI") {
        Ok(cli) => cli,
        Err(_) => "/root/bin/oci".to_string(),
    }
}
