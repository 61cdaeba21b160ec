// The assembled application: ops endpoints over a real listener, then shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::config::new_test_config;
use crate::liveness;
use crate::model::{LifecycleState, ServiceRequest};
use crate::shutdown::GracefulShutdown;
use crate::support::fixtures::{manifest, service_type, MANIFEST_ID, PLAN_ID, SERVICE_ID};
use crate::support::wait_until;
use crate::task::TaskResponse;

async fn start_app() -> (App, CancellationToken, GracefulShutdown, String) {
    let token = CancellationToken::new();
    let probe = Arc::new(liveness::Probe::new(Duration::from_secs(1)));
    let app = App::new(token.clone(), new_test_config(), probe)
        .await
        .expect("app should build");

    let gsh = GracefulShutdown::new(token.clone());
    gsh.add(1);
    app.serve(Arc::new(gsh.clone())).await.expect("app should start");

    assert!(wait_until(Duration::from_secs(3), || app.local_addr().is_some()).await);
    let port = app.local_addr().map(|a| a.port()).unwrap_or_default();
    (app, token, gsh, format!("http://127.0.0.1:{port}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ops_endpoints_are_served() {
    let (app, token, gsh, base) = start_app().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/k8s/probe")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(format!("{base}/broker/config")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let cfg: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(cfg["broker"]["env"], "test");

    let resp = client.get(format!("{base}/broker/monitors")).send().await.unwrap();
    let monitors: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(monitors["enabled"], false);
    assert_eq!(monitors["active"], 0);

    token.cancel();
    assert!(wait_until(Duration::from_secs(5), || gsh.pending() == 0).await);
    assert!(!app.broker().is_ok().await, "store should be closed after shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lifecycle_runs_on_the_configured_drivers() {
    let (app, token, _gsh, _) = start_app().await;
    let broker = app.broker().clone();

    broker.register_service(service_type(true)).await.unwrap();
    // Compose is disabled in the test config, so "docker" lands on the noop driver.
    broker.store_manifest(MANIFEST_ID, manifest("docker")).await.unwrap();

    let reply = broker.provision("inst-1", ServiceRequest::new(SERVICE_ID, PLAN_ID), true).await;
    assert_eq!(reply.outcome.status, 202);
    assert!(broker.runner().wait_idle(Duration::from_secs(5)).await);

    let TaskResponse::Instance(instance) = broker.instance("inst-1").await.response else {
        panic!("expected an instance");
    };
    assert_eq!(instance.state.state, LifecycleState::Succeeded);
    assert_eq!(
        instance.context.get("spark-master_state").map(String::as_str),
        Some("Up")
    );

    assert!(broker.deprovision("inst-1", false).await.is_success());

    app.close().await.unwrap();
    // Closing twice is harmless.
    app.close().await.unwrap();
    assert!(token.is_cancelled());

    let reply = broker.provision("inst-2", ServiceRequest::new(SERVICE_ID, PLAN_ID), true).await;
    assert_eq!(reply.outcome.status, 503);
}
