use std::sync::Arc;
use std::time::Duration;

use super::compose::*;
use super::driver::BackendDriver;
use crate::model::Parameters;
use crate::support::runner::FakeRunner;

const MANIFEST: &str = "services:\n  web:\n    image: nginx:latest\n    environment:\n      - MODE=dev\n      - LEVEL=1\n  db:\n    image: postgres:16\n";

const INSPECT: &str = r#"[
  {
    "Name": "/svc-web-1",
    "Image": "sha256:aaa",
    "Config": {"Image": "nginx:latest", "Cmd": ["nginx", "-g", "daemon off;"], "Env": ["MODE=prod", "EMPTY"]},
    "State": {"Status": "running", "Running": true, "ExitCode": 0},
    "NetworkSettings": {
      "Ports": {"80/tcp": [{"HostIp": "0.0.0.0", "HostPort": "32768"}], "443/tcp": null},
      "Networks": {"default": {"IPAddress": "172.18.0.2"}}
    }
  },
  {
    "Name": "/svc-db-1",
    "Image": "sha256:bbb",
    "Config": {"Image": "postgres:16", "Cmd": null},
    "State": {"Status": "exited", "Running": false, "ExitCode": 3},
    "NetworkSettings": {"Ports": {}, "Networks": {"default": {"IPAddress": ""}}}
  }
]"#;

fn driver(runner: &FakeRunner, work_dir: &std::path::Path, update_images: bool) -> ComposeDriver {
    ComposeDriver::new(
        ComposeSettings {
            work_dir: work_dir.to_path_buf(),
            binary: "docker".to_string(),
            update_images,
            delete_timeout: Duration::from_secs(20),
        },
        Arc::new(runner.clone()),
    )
}

fn params(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn project_names_are_sanitized() {
    assert_eq!(project_name("instance-01"), "instance-01");
    assert_eq!(project_name("inst_01"), "inst_01");

    let name = project_name("My.Instance-01");
    assert!(name.starts_with("my-instance-01-"), "{name}");
    assert!(name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'));
    assert!(project_name("_abc").starts_with("abc-"));
}

#[test]
fn rewritten_ids_do_not_share_a_project() {
    assert_ne!(project_name("Web"), project_name("web"));
    assert_ne!(project_name("a.b"), project_name("a-b"));
    assert_ne!(project_name("_abc"), project_name("abc"));
}

#[test]
fn environment_is_merged_with_caller_winning() {
    let out = inject_environment(MANIFEST, &params(&[("MODE", "prod"), ("TOKEN", "t")])).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();

    let web = &doc["services"]["web"]["environment"];
    assert_eq!(web["MODE"].as_str(), Some("prod"));
    assert_eq!(web["LEVEL"].as_str(), Some("1"));
    assert_eq!(web["TOKEN"].as_str(), Some("t"));

    let db = &doc["services"]["db"]["environment"];
    assert_eq!(db["TOKEN"].as_str(), Some("t"));
}

#[test]
fn no_parameters_leaves_manifest_untouched() {
    assert_eq!(inject_environment(MANIFEST, &Parameters::new()).unwrap(), MANIFEST);
}

#[test]
fn manifest_without_services_is_rejected() {
    let err = inject_environment("version: '3'\n", &params(&[("A", "1")])).unwrap_err();
    assert!(err.to_string().contains("no services"));
}

#[test]
fn inspect_output_is_flattened() {
    let containers: Vec<ContainerInspect> = serde_json::from_str(INSPECT).unwrap();
    let attrs = attributes_from_inspect(&containers);

    assert_eq!(attrs["svc-web-1_image_name"], "nginx:latest");
    assert_eq!(attrs["svc-web-1_image_id"], "sha256:aaa");
    assert_eq!(attrs["svc-web-1_cmd"], "nginx -g daemon off;");
    assert_eq!(attrs["svc-web-1_state"], "Up");
    assert_eq!(attrs["svc-web-1_80/tcp/HostIp"], "0.0.0.0");
    assert_eq!(attrs["svc-web-1_80/tcp/HostPort"], "32768");
    assert_eq!(attrs["svc-web-1_443/tcp"], "");
    assert_eq!(attrs["svc-web-1_Ip"], "172.18.0.2");
    assert_eq!(attrs["svc-web-1_environment_MODE"], "prod");
    assert_eq!(attrs["svc-web-1_environment_EMPTY"], "");

    assert_eq!(attrs["svc-db-1_state"], "Exit 3");
    assert_eq!(attrs["svc-db-1_cmd"], "");
    assert!(!attrs.contains_key("svc-db-1_Ip"));
}

#[test]
fn human_readable_states() {
    let mut s = ContainerState::default();
    s.status = "created".to_string();
    assert_eq!(s.human_readable(), "Created");
    s.running = true;
    assert_eq!(s.human_readable(), "Up");
    s.restarting = true;
    assert_eq!(s.human_readable(), "Restarting");
    s.paused = true;
    assert_eq!(s.human_readable(), "Paused");
}

#[tokio::test]
async fn create_writes_manifest_and_runs_compose() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let d = driver(&runner, tmp.path(), true);

    d.create("inst-1", "services:</br>  web:</br>    image: nginx", "docker", &params(&[("A", "1")]))
        .await
        .unwrap();

    let written = std::fs::read_to_string(tmp.path().join("inst-1").join(MANIFEST_FILE)).unwrap();
    assert!(written.contains("nginx"));
    assert!(written.contains("A"));

    let lines = runner.command_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("docker compose -p inst-1 -f"));
    assert!(lines[0].ends_with("pull"));
    assert!(lines[1].ends_with("up -d"));
}

#[tokio::test]
async fn create_surfaces_stderr_on_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    runner.fail("up -d", 1, "no such image: nope");
    let d = driver(&runner, tmp.path(), false);

    let err = d
        .create("inst-1", "services:\n  web:\n    image: nope\n", "docker", &Parameters::new())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("no such image"));
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn info_inspects_project_containers() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("inst-1")).unwrap();
    let runner = FakeRunner::new();
    runner.respond("ps -a -q", "abc123\ndef456\n");
    runner.respond("inspect", INSPECT);
    let d = driver(&runner, tmp.path(), false);

    let attrs = d.info("inst-1", "docker").await.unwrap();
    assert_eq!(attrs["svc-web-1_state"], "Up");
    assert_eq!(runner.command_lines()[1], "docker inspect abc123 def456");
}

#[tokio::test]
async fn info_for_missing_instance_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let d = driver(&runner, tmp.path(), false);

    assert!(d.info("ghost", "docker").await.unwrap().is_empty());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn delete_runs_down_and_removes_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("inst-1");
    std::fs::create_dir_all(&dir).unwrap();
    let runner = FakeRunner::new();
    let d = driver(&runner, tmp.path(), false);

    d.delete("inst-1", "docker").await.unwrap();

    assert!(runner.command_lines()[0].ends_with("down -v --timeout 20"));
    assert!(!dir.exists());
}

#[tokio::test]
async fn delete_of_unknown_instance_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let d = driver(&runner, tmp.path(), false);
    d.delete("ghost", "docker").await.unwrap();
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn is_ok_follows_docker_version() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let d = driver(&runner, tmp.path(), false);
    assert!(d.is_ok().await);

    let runner = FakeRunner::new();
    runner.spawn_error("version", "docker: not found");
    let d = driver(&runner, tmp.path(), false);
    assert!(!d.is_ok().await);
}
