use super::reconcile::*;
use crate::model::{Attributes, LifecycleState};

fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn parses_driver_vocabularies() {
    assert_eq!(ResourceState::parse("Up"), ResourceState::Running);
    assert_eq!(ResourceState::parse("running"), ResourceState::Running);
    assert_eq!(
        ResourceState::parse("Exit 137"),
        ResourceState::Exited("Exit 137".to_string())
    );
    assert_eq!(
        ResourceState::parse("Failed: CrashLoopBackOff"),
        ResourceState::Failed("Failed: CrashLoopBackOff".to_string())
    );
    assert_eq!(
        ResourceState::parse("Restarting"),
        ResourceState::Pending("Restarting".to_string())
    );
}

#[test]
fn all_up_is_succeeded() {
    let op = reconcile_attributes(&attrs(&[("web_state", "Up"), ("db_state", "Up")]));
    assert_eq!(op.state, LifecycleState::Succeeded);
    assert_eq!(op.description, CREATED_DESCRIPTION);
}

#[test]
fn mixed_running_vocabulary_still_succeeds() {
    let op = reconcile_attributes(&attrs(&[("web_state", "Up"), ("pod_state", "Running")]));
    assert_eq!(op.state, LifecycleState::Succeeded);
}

#[test]
fn any_exit_fails_even_with_running_peers() {
    let op = reconcile_attributes(&attrs(&[
        ("a_state", "Up"),
        ("b_state", "Exit 1"),
        ("c_state", "Up"),
    ]));
    assert_eq!(op.state, LifecycleState::Failed);
    assert!(op.description.contains("Exit 1"));
}

#[test]
fn failure_precedes_pending() {
    let op = reconcile_attributes(&attrs(&[("a_state", "Created"), ("b_state", "Exit 2")]));
    assert_eq!(op.state, LifecycleState::Failed);
}

#[test]
fn no_states_is_in_progress() {
    let op = reconcile_attributes(&Attributes::new());
    assert_eq!(op.state, LifecycleState::InProgress);
    assert_eq!(op.description, CREATING_DESCRIPTION);

    let op = reconcile_attributes(&attrs(&[("web_Ip", "10.0.0.1")]));
    assert_eq!(op.state, LifecycleState::InProgress);
}

#[test]
fn completed_pods_count_as_running() {
    assert_eq!(ResourceState::parse("Completed"), ResourceState::Running);

    let op = reconcile_attributes(&attrs(&[("job-x_state", "Completed"), ("web_state", "Running")]));
    assert_eq!(op.state, LifecycleState::Succeeded);
}

#[test]
fn pending_mix_is_in_progress() {
    let op = reconcile_attributes(&attrs(&[("a_state", "Up"), ("b_state", "Restarting")]));
    assert_eq!(op.state, LifecycleState::InProgress);
}

#[test]
fn environment_keys_are_not_states() {
    let op = reconcile_attributes(&attrs(&[
        ("web_state", "Up"),
        ("web_environment_app_state", "Exit"),
    ]));
    assert_eq!(op.state, LifecycleState::Succeeded);
}

#[test]
fn reconcile_is_idempotent() {
    let bag = attrs(&[("a_state", "Up"), ("b_state", "Restarting")]);
    assert_eq!(reconcile_attributes(&bag), reconcile_attributes(&bag));
}
