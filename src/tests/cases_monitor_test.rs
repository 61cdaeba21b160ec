// Health monitoring against a live HTTP endpoint.

use std::sync::Arc;
use std::time::Duration;

use crate::broker::Broker;
use crate::http::client::create_client;
use crate::model::ServiceRequest;
use crate::monitor::{HealthMonitor, HealthStatus, HttpHealthProbe};
use crate::runner::AsyncRunner;
use crate::support::drivers::running_attrs;
use crate::support::fixtures::{fast_monitor_settings, Harness, PLAN_ID, SERVICE_ID};
use crate::support::health::HealthServer;
use crate::support::wait_until;

async fn wait_for(monitor: &HealthMonitor, id: &str, status: HealthStatus) -> bool {
    wait_until(Duration::from_secs(3), || {
        monitor.snapshot(id).map(|s| s.status) == Some(status)
    })
    .await
}

#[tokio::test]
async fn provisioned_instance_is_probed_over_http() {
    let server = HealthServer::start().await;
    let h = Harness::new();
    h.driver.set_steady(running_attrs("127.0.0.1"));
    h.seed_catalog(true).await;

    let mut settings = fast_monitor_settings();
    settings.port = server.port();
    let probe = Arc::new(HttpHealthProbe::new(create_client().unwrap(), settings.timeout));
    let monitor = Arc::new(HealthMonitor::new(h.dispatcher.clone(), probe, settings));
    let broker = Broker::new(h.ctx().with_monitor(monitor.clone()), Arc::new(AsyncRunner::new(2)));

    let reply = broker.provision("inst-1", ServiceRequest::new(SERVICE_ID, PLAN_ID), false).await;
    assert!(reply.is_success());
    assert!(wait_for(&monitor, "inst-1", HealthStatus::Healthy).await);
    let snapshot = monitor.snapshot("inst-1").unwrap();
    assert_eq!(snapshot.endpoint, Some(server.url("/health")));

    server.set_up(false);
    assert!(wait_for(&monitor, "inst-1", HealthStatus::Unhealthy).await);

    server.set_up(true);
    assert!(wait_for(&monitor, "inst-1", HealthStatus::Healthy).await);

    // The loop survives the endpoint disappearing entirely.
    server.close().await;
    assert!(wait_for(&monitor, "inst-1", HealthStatus::Unhealthy).await);
    assert!(monitor.is_monitoring("inst-1"));

    assert!(broker.deprovision("inst-1", false).await.is_success());
    assert!(!monitor.is_monitoring("inst-1"));
}

#[tokio::test]
async fn instance_without_an_address_stays_unreachable() {
    let h = Harness::new();
    h.driver.set_steady(crate::support::drivers::attrs(&[("web_state", "Up")]));
    h.seed_catalog(true).await;
    h.seed_instance("inst-1", true).await;
    let broker = Broker::new(h.ctx_with_monitor(), Arc::new(AsyncRunner::new(2)));

    assert!(broker.measure("inst-1").await.is_success());
    assert!(wait_for(&h.monitor, "inst-1", HealthStatus::Unreachable).await);
    assert!(h.probe.urls().is_empty());

    assert!(broker.stop_measuring("inst-1").is_success());
    h.monitor.stop_all(Duration::from_secs(1)).await;
}
