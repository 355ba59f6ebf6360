// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use tokio::runtime::Runtime;

    use anneal_lib::error::ProvisionError;
    use anneal_lib::survey::{self, NodeQuorumStatus};
    use anneal_lib::test_env::SimCluster;

    fn addresses(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn survey_classifies_every_node_once() {
        let sim = SimCluster::new("7.5.1");
        {
            let mut state = sim.lock();
            state.default_host = "10.0.0.2".to_string();
            state
                .node_states
                .insert("10.0.0.2".to_string(), "ACTIVE".to_string());
            state
                .node_states
                .insert("10.0.0.3".to_string(), "UNCONFIGURED".to_string());
            state
                .node_states
                .insert("10.0.0.4".to_string(), "REMOVED".to_string());
            state
                .node_states
                .insert("10.0.0.5".to_string(), "PANICKED".to_string());
        }

        let rt = Runtime::new().unwrap();
        let survey = rt
            .block_on(survey::survey_pool(
                &sim,
                &addresses(&["10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]),
                "7.5.1",
            ))
            .unwrap();

        assert_eq!(survey.reports.len(), 4);
        assert_eq!(survey.in_quorum(), vec!["10.0.0.2"]);
        assert_eq!(survey.out_of_quorum(), vec!["10.0.0.5"]);
        assert_eq!(survey.reports[1].status, NodeQuorumStatus::Unconfigured);
        assert_eq!(survey.reports[2].status, NodeQuorumStatus::Removed);
    }

    #[test]
    fn mixed_revisions_are_fatal() {
        let sim = SimCluster::with_nodes("7.5.1", &["10.0.0.2", "10.0.0.3"], "ACTIVE");
        sim.lock()
            .revisions
            .insert("10.0.0.3".to_string(), "7.4.0".to_string());

        let rt = Runtime::new().unwrap();
        let result = rt.block_on(survey::survey_pool(
            &sim,
            &addresses(&["10.0.0.2", "10.0.0.3"]),
            "7.5.1",
        ));

        assert!(matches!(result, Err(ProvisionError::Precondition(_))));
    }

    #[test]
    fn failing_state_query_is_out_of_quorum() {
        let sim = SimCluster::with_nodes("7.5.1", &["10.0.0.2", "10.0.0.3"], "ACTIVE");
        sim.lock().failing.insert("10.0.0.3".to_string());

        let rt = Runtime::new().unwrap();
        let survey = rt
            .block_on(survey::survey_pool(
                &sim,
                &addresses(&["10.0.0.2", "10.0.0.3"]),
                "7.5.1",
            ))
            .unwrap();

        assert_eq!(survey.in_quorum(), vec!["10.0.0.2"]);
        assert_eq!(survey.out_of_quorum(), vec!["10.0.0.3"]);
    }

    #[test]
    fn revision_query_strips_the_product_label() {
        let sim = SimCluster::new("Storage Core 7.5.1");
        sim.lock().default_host = "10.0.0.2".to_string();

        let rt = Runtime::new().unwrap();
        let revision = rt
            .block_on(survey::node_revision(&sim, "10.0.0.2"))
            .unwrap();
        assert_eq!(revision, "7.5.1");
    }
}
