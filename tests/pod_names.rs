// tests/pod_names.rs

use std::sync::Arc;

use proptest::prelude::*;

use swan_exec::executor::{KubernetesConfig, KubernetesExecutor};
use swan_exec_test_utils::fake_pod_api::{FakePodApi, PodScenario};

fn executor(cfg: KubernetesConfig) -> KubernetesExecutor {
    KubernetesExecutor::new(cfg, Arc::new(FakePodApi::new(PodScenario::StayPending)))
}

proptest! {
    #[test]
    fn generated_names_are_prefix_dash_hex(prefix in "[a-z][a-z0-9-]{0,20}[a-z0-9]") {
        let exec = executor(KubernetesConfig {
            pod_name_prefix: prefix.clone(),
            ..KubernetesConfig::default()
        });

        let name = exec.generate_pod_name();
        let suffix = name.strip_prefix(&format!("{prefix}-")).unwrap();
        prop_assert_eq!(suffix.len(), 12);
        prop_assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn explicit_name_wins_over_prefix(
        name in "[a-z][a-z0-9]{0,20}",
        prefix in "[a-z]{1,10}",
    ) {
        let exec = executor(KubernetesConfig {
            pod_name: Some(name.clone()),
            pod_name_prefix: prefix,
            ..KubernetesConfig::default()
        });

        prop_assert_eq!(exec.generate_pod_name(), name);
    }
}
