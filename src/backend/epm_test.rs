use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use super::driver::BackendDriver;
use super::epm::*;
use crate::http::client::create_client;
use crate::model::Parameters;
use crate::support::epm::FakeEpm;

fn unpack(archive: &[u8]) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    for entry in tar.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        files.insert(name, content);
    }
    files
}

fn driver(api: String, work_dir: &std::path::Path) -> EpmDriver {
    EpmDriver::new(
        EpmSettings {
            work_dir: work_dir.to_path_buf(),
            api,
            timeout: Duration::from_secs(5),
        },
        create_client().unwrap(),
    )
}

#[test]
fn package_holds_metadata_and_manifest() {
    let params: Parameters = [("MODE".to_string(), "prod".to_string())].into_iter().collect();
    let archive = build_package("inst-1", "services: {}\n", "epm", &params).unwrap();
    let files = unpack(&archive);

    assert_eq!(files["docker-compose.yml"], "services: {}\n");
    let meta: serde_yaml::Value = serde_yaml::from_str(&files[METADATA_FILE]).unwrap();
    assert_eq!(meta["name"].as_str(), Some("inst-1"));
    assert_eq!(meta["type"].as_str(), Some("epm"));
    assert_eq!(meta["parameters"]["MODE"].as_str(), Some("prod"));
}

#[test]
fn kubernetes_manifests_are_packaged_as_manifest_yml() {
    let archive = build_package("inst-1", "kind: List\n", "kubernetes", &Parameters::new()).unwrap();
    assert!(unpack(&archive).contains_key("manifest.yml"));
}

#[test]
fn resource_group_is_flattened() {
    let group: ResourceGroup = serde_json::from_str(
        r#"{"id": "rg", "vdus": [{"name": "web", "imageName": "nginx", "computeId": "c1", "ip": "", "status": "Running"}]}"#,
    )
    .unwrap();
    let attrs = attributes_from_resource_group(&group);
    assert_eq!(attrs["web_image_name"], "nginx");
    assert_eq!(attrs["web_image_id"], "c1");
    assert_eq!(attrs["web_state"], "Running");
    assert!(!attrs.contains_key("web_Ip"));
}

#[tokio::test]
async fn full_lifecycle_against_package_manager() {
    let epm = FakeEpm::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let d = driver(epm.api(), tmp.path());

    assert!(d.is_ok().await);

    d.create("inst-1", "services:</br>  web: {}", "epm", &Parameters::new())
        .await
        .unwrap();
    let uploads = epm.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].0.starts_with("multipart/form-data; boundary="));
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("inst-1").join(RESOURCE_GROUP_FILE)).unwrap(),
        "rg-42"
    );

    let attrs = d.info("inst-1", "epm").await.unwrap();
    assert_eq!(attrs["web_Ip"], "192.168.1.20");
    assert_eq!(attrs["web_state"], "Running");

    d.delete("inst-1", "epm").await.unwrap();
    assert_eq!(epm.deleted(), vec!["rg-42".to_string()]);
    assert!(!tmp.path().join("inst-1").exists());

    epm.close().await;
}

#[tokio::test]
async fn info_without_resource_group_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let d = driver("http://127.0.0.1:9/v1".to_string(), tmp.path());
    assert!(d.info("ghost", "epm").await.unwrap().is_empty());
    d.delete("ghost", "epm").await.unwrap();
}

#[tokio::test]
async fn unreachable_manager_is_not_ok() {
    let tmp = tempfile::tempdir().unwrap();
    let d = driver("http://127.0.0.1:9/v1".to_string(), tmp.path());
    assert!(!d.is_ok().await);
}
