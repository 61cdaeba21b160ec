use super::{BrokerBox, Config};
use std::collections::BTreeMap;
use std::time::Duration;

/// Creates a new test configuration.
///
/// Only the noop driver is enabled so nothing shells out or hits the network.
pub fn new_test_config() -> Config {
    Config {
        broker: BrokerBox {
            env: super::TEST.to_string(),
            logs: Some(super::Logs {
                level: Some("debug".to_string()),
            }),
            runtime: Some(super::Runtime { num_cpus: 2 }),
            api: Some(super::Api {
                name: Some("svcbroker:8092".to_string()),
                port: Some("0".to_string()),
            }),
            store: Some(super::Store {
                kind: super::StoreKind::Memory,
                dump_file: None,
            }),
            dispatch: Some(super::Dispatch {
                aliases: BTreeMap::from([("test".to_string(), "dummy".to_string())]),
            }),
            drivers: Some(super::Drivers {
                compose: Some(super::Compose {
                    enabled: false,
                    work_dir: None,
                    binary: Some("docker".to_string()),
                    update_images: false,
                    delete_timeout: Some(Duration::from_secs(20)),
                }),
                kube: Some(super::Kube {
                    enabled: false,
                    work_dir: None,
                    binary: Some("kubectl".to_string()),
                    request_timeout: Some(Duration::from_secs(60)),
                }),
                epm: Some(super::Epm {
                    enabled: false,
                    work_dir: None,
                    api: Some("http://localhost:8180/v1".to_string()),
                    timeout: Some(Duration::from_secs(5)),
                }),
                noop: Some(super::Noop { fixture: None }),
            }),
            monitor: Some(super::Monitor {
                enabled: false,
                interval: Some(Duration::from_millis(50)),
                max_retries: Some(3),
                retry_delay: Some(Duration::from_millis(10)),
                port: Some(56567),
                path: Some("/health".to_string()),
                timeout: Some(Duration::from_secs(1)),
            }),
            runner: Some(super::Runner {
                concurrency: Some(4),
                drain_timeout: Some(Duration::from_secs(5)),
            }),
            auth: Some(super::Auth {
                kind: super::AuthKind::Static,
                username_prefix: Some("test".to_string()),
            }),
            k8s: Some(super::K8S {
                probe: super::Probe {
                    timeout: Some(Duration::from_secs(1)),
                },
            }),
        },
    }
}
