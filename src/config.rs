// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ProvisionError, Result};

/// ProvisioningConfig is the declared desired state of the cluster, read once
/// from the configuration file that deployment automation writes onto the
/// provisioner instance. It is immutable for the duration of a run.
///
/// The config model is intentionally decoupled from the state observed on the
/// cluster itself: a run compares the two and mutates only the cluster, never
/// this struct.
#[derive(Debug, Deserialize)]
pub struct ProvisioningConfig {
    pub cluster: ClusterSettings,
    pub nodes: NodeSettings,
    #[serde(default)]
    pub swing: SwingSettings,
    pub storage: StorageSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    pub secrets: SecretIds,
    #[serde(default)]
    pub deployment: DeploymentSettings,
}

#[derive(Debug, Deserialize)]
pub struct ClusterSettings {
    pub name: String,
    pub admin_password: String,
    pub product_type: String,
}

#[derive(Debug, Deserialize)]
pub struct NodeSettings {
    /// Target number of permanent cluster nodes. May be smaller than the
    /// declared member list; only the first `count` members are used.
    pub count: usize,
    /// Address of the node used as the management endpoint for the run.
    pub clustering_address: String,
    /// Cloud instance id of the clustering node, passed to cluster creation.
    pub clustering_instance_id: String,
    pub members: Vec<NodeSpec>,
}

/// The swing pool is a temporary set of nodes that can be attached to or
/// drained from the cluster without changing its durable declared size.
#[derive(Debug, Default, Deserialize)]
pub struct SwingSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub members: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    /// Object-storage bucket URIs backing the cluster.
    pub uris: Vec<String>,
    pub soft_capacity_limit_tb: u64,
    pub permanent_disk_count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkSettings {
    /// Front-end floating IPs, in the order they should be configured.
    #[serde(default)]
    pub floating_ips: Vec<String>,
    #[serde(default)]
    pub netmask: String,
}

/// Identifiers of the vault secrets this engine reads and writes. The vault
/// is the durable record that survives across runs and instances.
#[derive(Debug, Deserialize)]
pub struct SecretIds {
    pub key_vault: String,
    pub node_count: String,
    pub permanent_disk_count: String,
    pub capacity_limit: String,
    pub complete: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeploymentSettings {
    #[serde(default)]
    pub dev_environment: bool,
    /// Staging telemetry endpoints, applied at cluster creation in dev
    /// environments only.
    pub staging_mq_host: Option<String>,
    pub staging_api_host: Option<String>,
}

/// One cluster-capable host: its address and the fault domain it belongs to.
/// Rendered as `address,fault_domain` on the management CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeSpec {
    pub address: String,
    pub fault_domain: String,
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.address, self.fault_domain)
    }
}

impl FromStr for NodeSpec {
    type Err = ProvisionError;

    fn from_str(entry: &str) -> Result<Self> {
        let Some((address, fault_domain)) = entry.split_once(',') else {
            return Err(ProvisionError::Config(format!(
                "node entry '{entry}' is not of the form 'address,fault_domain'"
            )));
        };
        Ok(NodeSpec {
            address: address.to_string(),
            fault_domain: fault_domain.to_string(),
        })
    }
}

impl ProvisioningConfig {
    /// Read and validate the declared configuration.
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Config(format!("could not open config file '{path}': {e}"))
        })?;
        let config: ProvisioningConfig = toml::from_str(&raw)
            .map_err(|e| ProvisionError::Config(format!("could not parse '{path}': {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations a run could not complete against. Convergence
    /// compares observed counts to these values, so inconsistencies here
    /// would otherwise surface as waits that never settle.
    pub fn validate(&self) -> Result<()> {
        if self.cluster.name.is_empty() {
            return Err(ProvisionError::Config("cluster name is empty".to_string()));
        }
        if self.cluster.admin_password.is_empty() {
            return Err(ProvisionError::Config(
                "admin password is empty".to_string(),
            ));
        }
        if self.nodes.count > self.nodes.members.len() {
            return Err(ProvisionError::Config(format!(
                "node count {} exceeds the {} declared members",
                self.nodes.count,
                self.nodes.members.len()
            )));
        }
        if self.swing.enabled && self.swing.count != self.swing.members.len() {
            return Err(ProvisionError::Config(format!(
                "swing count {} does not match the {} declared swing members",
                self.swing.count,
                self.swing.members.len()
            )));
        }
        for ip in &self.network.floating_ips {
            if ip.parse::<Ipv4Addr>().is_err() {
                return Err(ProvisionError::Config(format!(
                    "'{ip}' is not a valid floating IP address"
                )));
            }
        }
        if !self.network.floating_ips.is_empty() && self.network.netmask.parse::<Ipv4Addr>().is_err()
        {
            return Err(ProvisionError::Config(format!(
                "'{}' is not a valid netmask",
                self.network.netmask
            )));
        }
        Ok(())
    }

    /// The fault-domain-tagged entries for the first `count` primary nodes,
    /// in declaration order.
    pub fn primary_members(&self) -> Vec<String> {
        self.nodes.members[..self.nodes.count]
            .iter()
            .map(NodeSpec::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
            [cluster]
            name = "store1"
            admin_password = "hunter2"
            product_type = "ACTIVE_WITH_STANDBY"

            [nodes]
            count = 3
            clustering_address = "10.0.0.2"
            clustering_instance_id = "inst-0001"
            members = [
                { address = "10.0.0.2", fault_domain = "fd-0" },
                { address = "10.0.0.3", fault_domain = "fd-1" },
                { address = "10.0.0.4", fault_domain = "fd-2" },
            ]

            [storage]
            uris = ["https://objects.region-1.example/bucket-0"]
            soft_capacity_limit_tb = 100
            permanent_disk_count = 12

            [network]
            floating_ips = ["10.0.1.10", "10.0.1.11"]
            netmask = "255.255.255.0"

            [secrets]
            key_vault = "vault-0"
            node_count = "secret-node-count"
            permanent_disk_count = "secret-disk-count"
            capacity_limit = "secret-capacity"
            complete = "secret-complete"
        "#
    }

    #[test]
    fn parse_and_validate() {
        let config: ProvisioningConfig = toml::from_str(sample_toml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.nodes.count, 3);
        assert!(!config.swing.enabled);
        assert!(!config.deployment.dev_environment);
        assert_eq!(
            config.primary_members(),
            vec!["10.0.0.2,fd-0", "10.0.0.3,fd-1", "10.0.0.4,fd-2"]
        );
    }

    #[test]
    fn node_count_beyond_members_rejected() {
        let mut config: ProvisioningConfig = toml::from_str(sample_toml()).unwrap();
        config.nodes.count = 4;
        assert!(matches!(
            config.validate(),
            Err(ProvisionError::Config(_))
        ));
    }

    #[test]
    fn swing_count_mismatch_rejected() {
        let mut config: ProvisioningConfig = toml::from_str(sample_toml()).unwrap();
        config.swing.enabled = true;
        config.swing.count = 2;
        assert!(matches!(
            config.validate(),
            Err(ProvisionError::Config(_))
        ));
    }

    #[test]
    fn bad_floating_ip_rejected() {
        let mut config: ProvisioningConfig = toml::from_str(sample_toml()).unwrap();
        config.network.floating_ips = vec!["not-an-ip".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ProvisionError::Config(_))
        ));
    }

    #[test]
    fn node_spec_round_trip() {
        let spec: NodeSpec = "10.0.0.5,fd-1".parse().unwrap();
        assert_eq!(spec.address, "10.0.0.5");
        assert_eq!(spec.fault_domain, "fd-1");
        assert_eq!(spec.to_string(), "10.0.0.5,fd-1");

        assert!("10.0.0.5".parse::<NodeSpec>().is_err());
    }
}
