// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use tokio::runtime::Runtime;

    use anneal_lib::config::NodeSpec;
    use anneal_lib::error::ProvisionError;
    use anneal_lib::provision;
    use anneal_lib::test_env::{fast_polls, sample_config, MemorySecrets, SimCluster};

    fn run_provision(
        sim: &SimCluster,
        secrets: &MemorySecrets,
        config: &anneal_lib::config::ProvisioningConfig,
    ) -> anneal_lib::error::Result<()> {
        let rt = Runtime::new().unwrap();
        rt.block_on(provision::run(sim, secrets, config, fast_polls()))
    }

    #[test]
    fn bootstrap_forms_a_new_cluster() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "UNCONFIGURED");
        let secrets = MemorySecrets::new();
        let config = sample_config(&addresses, 3);

        run_provision(&sim, &secrets, &config).unwrap();

        // Exactly the three declared nodes, fault domains included.
        let create = sim.find_command("create_object_backed_cluster").unwrap();
        assert!(create.contains("10.0.0.2,fd-0 10.0.0.3,fd-1 10.0.0.4,fd-2"));
        assert!(create.contains("--cluster-name store1"));
        assert!(create.contains("--usable-capacity-clamp 100TB"));
        assert_eq!(sim.command_count("create_object_backed_cluster"), 1);

        // Object client timeout tunable was applied after creation.
        {
            let state = sim.lock();
            assert_eq!(state.tunables.len(), 1);
            assert_eq!(
                state.tunables[0].0,
                "/v1/tunables/s3_object_client_socket_recv_timeout_ms"
            );
            assert!(state.tunables[0].1.contains("10000"));
            assert!(state.logged_in);
            assert_eq!(state.membership.len(), 3);
        }

        // Quorum was restarted before declaring success.
        assert_eq!(sim.command_count("raw POST /v1/debug/quorum/abandon"), 1);

        assert_eq!(secrets.value("secret-node-count").as_deref(), Some("3"));
        assert_eq!(secrets.value("secret-disk-count").as_deref(), Some("12"));
        assert_eq!(secrets.value("secret-capacity").as_deref(), Some("100"));
        assert_eq!(secrets.value("secret-complete").as_deref(), Some("true"));
    }

    #[test]
    fn bootstrap_with_zero_nodes_is_a_noop() {
        let addresses = ["10.0.0.2"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "UNCONFIGURED");
        let secrets = MemorySecrets::new();
        let config = sample_config(&addresses, 0);

        run_provision(&sim, &secrets, &config).unwrap();

        assert_eq!(sim.command_count("create_object_backed_cluster"), 0);
        assert_eq!(secrets.value("secret-node-count"), None);
    }

    #[test]
    fn rerun_after_bootstrap_reconciles() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "UNCONFIGURED");
        let secrets = MemorySecrets::new();
        let config = sample_config(&addresses, 3);

        run_provision(&sim, &secrets, &config).unwrap();
        run_provision(&sim, &secrets, &config).unwrap();

        // The second run routed into reconcile and found nothing to change.
        assert_eq!(sim.command_count("create_object_backed_cluster"), 1);
        assert_eq!(
            sim.command_count("modify_object_backed_cluster_membership"),
            0
        );
        assert_eq!(sim.command_count("add_object_storage_uris"), 0);
        assert_eq!(sim.command_count("capacity_clamp_set"), 0);
    }

    #[test]
    fn reconcile_grows_the_cluster() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5", "10.0.0.6"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "UNCONFIGURED");
        {
            let mut state = sim.lock();
            for address in &addresses[..3] {
                state
                    .node_states
                    .insert(address.to_string(), "ACTIVE".to_string());
            }
            state.membership = vec![
                "10.0.0.2,fd-0".to_string(),
                "10.0.0.3,fd-1".to_string(),
                "10.0.0.4,fd-2".to_string(),
            ];
            state.buckets = vec!["https://objects.region-1.example/bucket-0".to_string()];
        }
        let secrets = MemorySecrets::new();
        secrets.insert("secret-capacity", "100");
        let config = sample_config(&addresses, 5);

        run_provision(&sim, &secrets, &config).unwrap();

        let modify = sim
            .find_command("modify_object_backed_cluster_membership")
            .unwrap();
        assert!(modify.contains(
            "10.0.0.2,fd-0 10.0.0.3,fd-1 10.0.0.4,fd-2 10.0.0.5,fd-3 10.0.0.6,fd-4"
        ));
        assert_eq!(
            sim.command_count("modify_object_backed_cluster_membership"),
            1
        );
        assert_eq!(sim.lock().membership.len(), 5);
        assert_eq!(secrets.value("secret-node-count").as_deref(), Some("5"));
    }

    #[test]
    fn simultaneous_resize_and_swing_change_aborts_before_mutating() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "ACTIVE");
        {
            let mut state = sim.lock();
            // Only three of the four declared primaries are in quorum.
            state
                .node_states
                .insert("10.0.0.5".to_string(), "UNCONFIGURED".to_string());
            // The swing node exists but has not joined.
            state
                .node_states
                .insert("10.0.9.0".to_string(), "UNCONFIGURED".to_string());
        }
        let secrets = MemorySecrets::new();
        secrets.insert("secret-capacity", "100");
        let mut config = sample_config(&addresses, 4);
        config.swing.enabled = true;
        config.swing.count = 1;
        config.swing.members = vec![NodeSpec {
            address: "10.0.9.0".to_string(),
            fault_domain: "fd-9".to_string(),
        }];

        let result = run_provision(&sim, &secrets, &config);
        assert!(matches!(result, Err(ProvisionError::Precondition(_))));

        assert_eq!(
            sim.command_count("modify_object_backed_cluster_membership"),
            0
        );
        assert_eq!(sim.command_count("create_object_backed_cluster"), 0);
    }

    #[test]
    fn swing_pool_activation_adds_swing_nodes() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "ACTIVE");
        {
            let mut state = sim.lock();
            state.membership = vec![
                "10.0.0.2,fd-0".to_string(),
                "10.0.0.3,fd-1".to_string(),
                "10.0.0.4,fd-2".to_string(),
            ];
            state.buckets = vec!["https://objects.region-1.example/bucket-0".to_string()];
            state
                .node_states
                .insert("10.0.9.0".to_string(), "UNCONFIGURED".to_string());
        }
        let secrets = MemorySecrets::new();
        secrets.insert("secret-capacity", "100");
        let mut config = sample_config(&addresses, 3);
        config.swing.enabled = true;
        config.swing.count = 1;
        config.swing.members = vec![NodeSpec {
            address: "10.0.9.0".to_string(),
            fault_domain: "fd-9".to_string(),
        }];

        run_provision(&sim, &secrets, &config).unwrap();

        let modify = sim
            .find_command("modify_object_backed_cluster_membership")
            .unwrap();
        assert!(modify.contains("10.0.0.2,fd-0 10.0.0.3,fd-1 10.0.0.4,fd-2 10.0.9.0,fd-9"));
        assert_eq!(sim.lock().membership.len(), 4);
        // Swing nodes are excluded from the durable node count.
        assert_eq!(secrets.value("secret-node-count").as_deref(), Some("3"));
    }

    #[test]
    fn swing_pool_drain_removes_swing_nodes() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "ACTIVE");
        {
            let mut state = sim.lock();
            state.membership = vec![
                "10.0.0.2,fd-0".to_string(),
                "10.0.0.3,fd-1".to_string(),
                "10.0.0.4,fd-2".to_string(),
                "10.0.9.0,fd-9".to_string(),
            ];
            state.buckets = vec!["https://objects.region-1.example/bucket-0".to_string()];
            state
                .node_states
                .insert("10.0.9.0".to_string(), "ACTIVE".to_string());
        }
        let secrets = MemorySecrets::new();
        secrets.insert("secret-capacity", "100");
        let mut config = sample_config(&addresses, 3);
        config.swing.members = vec![NodeSpec {
            address: "10.0.9.0".to_string(),
            fault_domain: "fd-9".to_string(),
        }];

        run_provision(&sim, &secrets, &config).unwrap();

        let modify = sim
            .find_command("modify_object_backed_cluster_membership")
            .unwrap();
        assert!(!modify.contains("10.0.9.0"));
        {
            let state = sim.lock();
            assert_eq!(state.membership.len(), 3);
            assert_eq!(
                state.node_states.get("10.0.9.0").map(String::as_str),
                Some("REMOVED")
            );
        }
    }

    #[test]
    fn missing_buckets_are_added() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "ACTIVE");
        {
            let mut state = sim.lock();
            state.membership = vec![
                "10.0.0.2,fd-0".to_string(),
                "10.0.0.3,fd-1".to_string(),
                "10.0.0.4,fd-2".to_string(),
            ];
            state.buckets = vec!["https://objects.region-1.example/bucket-0".to_string()];
        }
        let secrets = MemorySecrets::new();
        secrets.insert("secret-capacity", "100");
        let mut config = sample_config(&addresses, 3);
        config.storage.uris = vec![
            "https://objects.region-1.example/bucket-0".to_string(),
            "https://objects.region-1.example/bucket-1".to_string(),
        ];

        run_provision(&sim, &secrets, &config).unwrap();

        let add = sim.find_command("add_object_storage_uris").unwrap();
        assert!(add.contains("bucket-0"));
        assert!(add.contains("bucket-1"));
        assert_eq!(sim.lock().buckets.len(), 2);
    }

    #[test]
    fn capacity_rises_only_above_the_recorded_limit() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "ACTIVE");
        {
            let mut state = sim.lock();
            state.membership = vec![
                "10.0.0.2,fd-0".to_string(),
                "10.0.0.3,fd-1".to_string(),
                "10.0.0.4,fd-2".to_string(),
            ];
            state.buckets = vec!["https://objects.region-1.example/bucket-0".to_string()];
        }
        let secrets = MemorySecrets::new();
        secrets.insert("secret-capacity", "100");
        let mut config = sample_config(&addresses, 3);

        // Equal declared and recorded limits: no mutation.
        run_provision(&sim, &secrets, &config).unwrap();
        assert_eq!(sim.command_count("capacity_clamp_set"), 0);
        assert_eq!(secrets.value("secret-capacity").as_deref(), Some("100"));

        // A larger declared limit converges the cluster, then the record.
        config.storage.soft_capacity_limit_tb = 150;
        run_provision(&sim, &secrets, &config).unwrap();
        let clamp = sim.find_command("capacity_clamp_set").unwrap();
        assert!(clamp.contains("150TB"));
        assert_eq!(sim.lock().capacity_clamp.as_deref(), Some("150TB"));
        assert_eq!(secrets.value("secret-capacity").as_deref(), Some("150"));
    }

    #[test]
    fn out_of_quorum_nodes_abort_the_run() {
        let addresses = ["10.0.0.2", "10.0.0.3", "10.0.0.4"];
        let sim = SimCluster::with_nodes("7.5.1", &addresses, "ACTIVE");
        sim.lock()
            .node_states
            .insert("10.0.0.4".to_string(), "PANICKED".to_string());
        let secrets = MemorySecrets::new();
        let config = sample_config(&addresses, 3);

        let result = run_provision(&sim, &secrets, &config);
        assert!(matches!(result, Err(ProvisionError::Precondition(_))));
        assert_eq!(sim.command_count("login"), 0);
        assert_eq!(secrets.value("secret-complete"), None);
    }
}
