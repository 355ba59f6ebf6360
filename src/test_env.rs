// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Test collaborators: an in-memory cluster simulator behind the [`Gateway`]
//! trait and an in-memory secret store.
//!
//! The simulator answers the same commands the real admin CLI does, with the
//! same reply shapes, including the loosely-quoted document form some query
//! commands print. Mutating commands take effect immediately, so the
//! engine's settle loops terminate on their first probe.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::config::{
    ClusterSettings, DeploymentSettings, NetworkSettings, NodeSettings, NodeSpec,
    ProvisioningConfig, SecretIds, StorageSettings, SwingSettings,
};
use crate::error::{ProvisionError, Result};
use crate::mgmt::{CommandOutput, Gateway};
use crate::poll::{Poll, PollSettings};
use crate::secrets::SecretStore;

/// Everything the simulated cluster remembers between commands.
#[derive(Debug, Default)]
pub struct SimState {
    /// Per-node management state, keyed by address. Values are the wire
    /// strings: "ACTIVE", "UNCONFIGURED", "REMOVED", or anything else.
    pub node_states: HashMap<String, String>,
    /// Per-node revision overrides; nodes not listed report the default.
    pub revisions: HashMap<String, String>,
    pub default_revision: String,
    /// Fault-domain-tagged membership entries, as the cluster reports them.
    pub membership: Vec<String>,
    pub buckets: Vec<String>,
    pub capacity_clamp: Option<String>,
    /// The current network document, if one was ever submitted.
    pub network: Option<Value>,
    /// Whether the network-status endpoint reports floating addresses.
    pub network_applied: bool,
    /// Payloads submitted to tunable endpoints, by path.
    pub tunables: Vec<(String, String)>,
    /// Address queried when a command carries no host override; the
    /// equivalent of the real gateway's clustering endpoint.
    pub default_host: String,
    /// Addresses whose node-state query fails with a command error.
    pub failing: HashSet<String>,
    pub logged_in: bool,
    /// Every command line issued, in order.
    pub commands: Vec<String>,
}

/// An in-memory cluster that the engine can be run against.
#[derive(Debug, Default)]
pub struct SimCluster {
    state: Mutex<SimState>,
}

impl SimCluster {
    pub fn new(revision: &str) -> Self {
        let sim = SimCluster::default();
        sim.lock().default_revision = revision.to_string();
        sim
    }

    /// A simulator with every given node in the given state. The first
    /// address becomes the default management endpoint.
    pub fn with_nodes(revision: &str, addresses: &[&str], state: &str) -> Self {
        let sim = SimCluster::new(revision);
        {
            let mut inner = sim.lock();
            inner.default_host = addresses.first().unwrap_or(&"").to_string();
            for address in addresses {
                inner
                    .node_states
                    .insert(address.to_string(), state.to_string());
            }
        }
        sim
    }

    pub fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    /// Number of issued commands whose line starts with `prefix`.
    pub fn command_count(&self, prefix: &str) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    /// The first issued command line starting with `prefix`, if any.
    pub fn find_command(&self, prefix: &str) -> Option<String> {
        self.lock()
            .commands
            .iter()
            .find(|line| line.starts_with(prefix))
            .cloned()
    }

    fn reply(text: String) -> Result<CommandOutput> {
        Ok(CommandOutput { stdout: text })
    }

    fn command_error(line: &str) -> Result<CommandOutput> {
        Err(ProvisionError::Command {
            command: line.to_string(),
            code: 1,
            stderr: String::new(),
        })
    }

    fn handle_raw(
        state: &mut SimState,
        host: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput> {
        // A raw invocation ends with the method and the path; any
        // content-type flags come before them.
        let method = args[args.len() - 2];
        let path = args[args.len() - 1];
        match (method, path) {
            ("GET", "/v1/version") => {
                let revision = state
                    .revisions
                    .get(host)
                    .unwrap_or(&state.default_revision)
                    .clone();
                Self::reply(format!("{{\"revision_id\": \"{revision}\"}}"))
            }
            ("GET", "/v3/network/status") => {
                if state.network_applied {
                    Self::reply(
                        r#"[{"node_id": 1, "interface_status": {"floating_addresses": []}}]"#
                            .to_string(),
                    )
                } else {
                    Self::reply(r#"[{"node_id": 1, "interface_status": {}}]"#.to_string())
                }
            }
            ("PUT", "/v3/network") => {
                let document: Value =
                    serde_json::from_str(stdin.unwrap_or_default()).map_err(|e| {
                        ProvisionError::Decode(format!("simulated network put: {e}"))
                    })?;
                state.network = Some(document);
                state.network_applied = true;
                Self::reply(String::new())
            }
            ("PUT", path) if path.starts_with("/v1/tunables/") => {
                state
                    .tunables
                    .push((path.to_string(), stdin.unwrap_or_default().to_string()));
                Self::reply(String::new())
            }
            ("POST", "/v1/debug/quorum/abandon") => Self::reply(String::new()),
            _ => Self::command_error(&format!("raw {method} {path}")),
        }
    }

    fn set_membership(state: &mut SimState, entries: Vec<String>) {
        let new_addresses: HashSet<String> = entries
            .iter()
            .filter_map(|entry| entry.split(',').next())
            .map(|address| address.to_string())
            .collect();

        let old_addresses: Vec<String> = state
            .membership
            .iter()
            .filter_map(|entry| entry.split(',').next())
            .map(|address| address.to_string())
            .collect();
        for address in old_addresses {
            if !new_addresses.contains(&address) {
                state.node_states.insert(address, "REMOVED".to_string());
            }
        }
        for address in &new_addresses {
            state
                .node_states
                .insert(address.clone(), "ACTIVE".to_string());
        }
        state.membership = entries;
    }
}

fn flag_value<'a>(args: &'a [&str], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|pair| pair[0] == flag)
        .map(|pair| pair[1])
}

fn entries(list: &str) -> Vec<String> {
    list.split_whitespace().map(|s| s.to_string()).collect()
}

fn quoted_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("'{item}'")).collect();
    format!("[{}]", quoted.join(", "))
}

impl Gateway for SimCluster {
    async fn execute(
        &self,
        host: Option<&str>,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput> {
        let mut state = self.lock();
        let line = args.join(" ");
        state.commands.push(line.clone());
        let host = match host {
            Some(host) => host.to_string(),
            None => state.default_host.clone(),
        };

        match args[0] {
            "raw" => Self::handle_raw(&mut state, &host, args, stdin),
            "node_state_get" => {
                if state.failing.contains(&host) {
                    return Self::command_error(&line);
                }
                match state.node_states.get(&host) {
                    Some(node_state) => {
                        Self::reply(format!("{{\"state\": \"{node_state}\"}}"))
                    }
                    None => Err(ProvisionError::Transport(format!(
                        "no simulated node at {host}"
                    ))),
                }
            }
            "login" => {
                state.logged_in = true;
                Self::reply(String::new())
            }
            "set_monitoring_conf" => Self::reply(String::new()),
            "create_object_backed_cluster" => {
                let members = flag_value(args, "--node-ips-and-fault-domains").unwrap_or("");
                let uris = flag_value(args, "--object-storage-uris").unwrap_or("");
                let clamp = flag_value(args, "--usable-capacity-clamp").unwrap_or("");
                Self::set_membership(&mut state, entries(members));
                state.buckets = entries(uris);
                state.capacity_clamp = Some(clamp.to_string());
                Self::reply(String::new())
            }
            "modify_object_backed_cluster_membership" => {
                let members = flag_value(args, "--node-ips-and-fault-domains").unwrap_or("");
                Self::set_membership(&mut state, entries(members));
                Self::reply(String::new())
            }
            "get_object_backed_nodes" => {
                // The real CLI prints this document with Python-style quotes.
                let membership = quoted_list(&state.membership);
                Self::reply(format!(
                    "{{'membership': {{'node_ips_and_fault_domains': {membership}}}}}"
                ))
            }
            "get_object_storage_uris" => Self::reply(quoted_list(&state.buckets)),
            "add_object_storage_uris" => {
                let uris = entries(flag_value(args, "--uris").unwrap_or(""));
                for uri in uris {
                    if !state.buckets.contains(&uri) {
                        state.buckets.push(uri);
                    }
                }
                Self::reply(String::new())
            }
            "capacity_clamp_set" => {
                let clamp = flag_value(args, "--clamp").unwrap_or("");
                state.capacity_clamp = Some(clamp.to_string());
                Self::reply(String::new())
            }
            "network_v3_get_config" => {
                let document = state
                    .network
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"frontend_networks": []}));
                Self::reply(document.to_string())
            }
            "network_v3_put_config" => {
                let document: Value =
                    serde_json::from_str(stdin.unwrap_or_default()).map_err(|e| {
                        ProvisionError::Decode(format!("simulated network put: {e}"))
                    })?;
                state.network_applied = !document["frontend_networks"]
                    .as_array()
                    .map(|networks| networks.is_empty())
                    .unwrap_or(true);
                state.network = Some(document);
                Self::reply(String::new())
            }
            _ => Self::command_error(&line),
        }
    }
}

/// An in-memory secret store.
#[derive(Debug, Default)]
pub struct MemorySecrets {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySecrets {
    pub fn new() -> Self {
        MemorySecrets::default()
    }

    pub fn insert(&self, secret_id: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(secret_id.to_string(), value.to_string());
    }

    pub fn value(&self, secret_id: &str) -> Option<String> {
        self.values.lock().unwrap().get(secret_id).cloned()
    }
}

impl SecretStore for MemorySecrets {
    async fn get(&self, secret_id: &str) -> Result<String> {
        self.value(secret_id).ok_or_else(|| {
            ProvisionError::Transport(format!("no secret with id {secret_id}"))
        })
    }

    async fn put(&self, secret_id: &str, value: &str) -> Result<()> {
        self.insert(secret_id, value);
        Ok(())
    }
}

/// A declared configuration with the given primary pool; tests adjust the
/// fields they care about.
pub fn sample_config(addresses: &[&str], node_count: usize) -> ProvisioningConfig {
    ProvisioningConfig {
        cluster: ClusterSettings {
            name: "store1".to_string(),
            admin_password: "hunter2".to_string(),
            product_type: "ACTIVE_WITH_STANDBY".to_string(),
        },
        nodes: NodeSettings {
            count: node_count,
            clustering_address: addresses[0].to_string(),
            clustering_instance_id: "inst-0001".to_string(),
            members: addresses
                .iter()
                .enumerate()
                .map(|(i, address)| NodeSpec {
                    address: address.to_string(),
                    fault_domain: format!("fd-{i}"),
                })
                .collect(),
        },
        swing: SwingSettings::default(),
        storage: StorageSettings {
            uris: vec!["https://objects.region-1.example/bucket-0".to_string()],
            soft_capacity_limit_tb: 100,
            permanent_disk_count: 12,
        },
        network: NetworkSettings {
            floating_ips: Vec::new(),
            netmask: "255.255.255.0".to_string(),
        },
        secrets: SecretIds {
            key_vault: "vault-0".to_string(),
            node_count: "secret-node-count".to_string(),
            permanent_disk_count: "secret-disk-count".to_string(),
            capacity_limit: "secret-capacity".to_string(),
            complete: "secret-complete".to_string(),
        },
        deployment: DeploymentSettings::default(),
    }
}

/// Poll settings that keep test runs fast and guarantee they terminate.
pub fn fast_polls() -> PollSettings {
    let poll = Poll::new(
        std::time::Duration::from_millis(1),
        Some(std::time::Duration::from_secs(5)),
    );
    PollSettings {
        quorum: poll,
        network: poll,
        readiness: poll,
    }
}
