// Many callers against the same broker at once.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::broker::Broker;
use crate::model::{BindingRequest, LifecycleState, ServiceRequest};
use crate::runner::AsyncRunner;
use crate::support::fixtures::{Harness, PLAN_ID, SERVICE_ID};
use crate::task::create;

fn broker(h: &Harness, concurrency: usize) -> Arc<Broker> {
    Arc::new(Broker::new(h.ctx(), Arc::new(AsyncRunner::new(concurrency))))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_instance_id_is_created_once() {
    let h = Harness::new();
    h.seed_catalog(true).await;
    h.driver.create_delay(Duration::from_millis(30));
    let broker = broker(&h, 4);

    let calls = (0..8).map(|_| {
        let broker = broker.clone();
        tokio::spawn(async move {
            broker
                .provision("inst-1", ServiceRequest::new(SERVICE_ID, PLAN_ID), false)
                .await
        })
    });
    let replies: Vec<_> = join_all(calls).await.into_iter().map(|r| r.unwrap()).collect();

    let created = replies.iter().filter(|r| r.is_success()).count();
    let conflicts: Vec<_> = replies.iter().filter(|r| r.outcome.status == 409).collect();
    assert_eq!(created, 1);
    assert_eq!(conflicts.len(), 7);
    assert!(conflicts
        .iter()
        .all(|r| r.outcome.message == create::conflict_message("inst-1")));
    assert_eq!(h.driver.count("create"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_instances_deploy_in_parallel() {
    let h = Harness::new();
    h.seed_catalog(true).await;
    h.driver.create_delay(Duration::from_millis(200));
    let broker = broker(&h, 4);

    let started = Instant::now();
    let calls = (0..4).map(|i| {
        let broker = broker.clone();
        tokio::spawn(async move {
            broker
                .provision(&format!("inst-{i}"), ServiceRequest::new(SERVICE_ID, PLAN_ID), false)
                .await
        })
    });
    let replies = join_all(calls).await;
    let elapsed = started.elapsed();

    assert!(replies.into_iter().all(|r| r.unwrap().is_success()));
    // Serialized deployments would take at least 800ms.
    assert!(elapsed < Duration::from_millis(700), "took {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_provisions_respect_runner_slots() {
    let h = Harness::new();
    h.seed_catalog(true).await;
    h.driver.create_delay(Duration::from_millis(100));
    let broker = broker(&h, 2);

    let started = Instant::now();
    for i in 0..4 {
        let reply = broker
            .provision(&format!("inst-{i}"), ServiceRequest::new(SERVICE_ID, PLAN_ID), true)
            .await;
        assert_eq!(reply.outcome.status, 202);
    }
    assert!(broker.runner().wait_idle(Duration::from_secs(5)).await);
    assert!(started.elapsed() >= Duration::from_millis(200));

    for i in 0..4 {
        let stored = h.stored(&format!("inst-{i}")).await.expect("instance stored");
        assert_eq!(stored.state.state, LifecycleState::Succeeded);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_binds_issue_one_binding() {
    let h = Harness::new();
    h.seed_catalog(true).await;
    h.seed_instance("inst-1", true).await;
    let broker = broker(&h, 4);

    let calls = (0..6).map(|i| {
        let broker = broker.clone();
        tokio::spawn(async move { broker.bind("inst-1", BindingRequest::new(&format!("b-{i}"))).await })
    });
    let replies: Vec<_> = join_all(calls).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(replies.iter().filter(|r| r.is_success()).count(), 1);
    assert_eq!(replies.iter().filter(|r| r.outcome.status == 409).count(), 5);
}
