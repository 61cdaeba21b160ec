//! Helpers shared by drivers that materialize manifests on disk.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use xxhash_rust::xxh3::xxh3_64;

/// Manifests submitted through HTML forms carry `</br>` for line breaks.
pub fn normalize_newlines(content: &str) -> String {
    content.replace("</br>", "\n")
}

/// Resolves `<work_dir>/<instance_id>`, refusing ids that would escape the root.
pub fn instance_dir(work_dir: &Path, instance_id: &str) -> Result<PathBuf> {
    if instance_id.is_empty()
        || instance_id == "."
        || instance_id == ".."
        || instance_id.contains('/')
        || instance_id.contains('\\')
    {
        bail!("instance id {instance_id:?} cannot be used as a directory name");
    }
    Ok(work_dir.join(instance_id))
}

/// Creates the instance directory. An existing one is reused with a warning.
pub async fn prepare_instance_dir(driver: &str, dir: &Path) -> Result<()> {
    if fs::try_exists(dir).await.unwrap_or(false) {
        warn!(
            component = "backend",
            driver = driver,
            event = "dir_exists",
            dir = ?dir,
            "instance directory already exists, its contents will be overwritten"
        );
        return Ok(());
    }
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create instance directory {:?}", dir))
}

/// Removes the instance directory, logging rather than failing.
pub async fn remove_instance_dir(driver: &str, dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir).await {
        warn!(
            component = "backend",
            driver = driver,
            event = "dir_remove_failed",
            dir = ?dir,
            error = %e,
            "could not remove instance directory"
        );
    }
}

const ID_HASH_LEN: usize = 8;

/// Suffixes `name` with a hash of `raw` unless it already equals `raw` and fits in `max`.
///
/// Sanitizing is lossy, so two ids may collapse onto one name; the hash keeps
/// them apart. The result never exceeds `max` characters.
pub fn with_id_hash(raw: &str, name: &str, max: usize) -> String {
    if name == raw && name.len() <= max {
        return name.to_string();
    }
    let suffix = format!("{:08x}", xxh3_64(raw.as_bytes()) as u32);
    let keep = max.saturating_sub(ID_HASH_LEN + 1);
    let head: String = name.chars().take(keep).collect();
    let head = head.trim_end_matches(['-', '_']);
    if head.is_empty() {
        suffix
    } else {
        format!("{head}-{suffix}")
    }
}

/// Lowercases and maps anything outside `[a-z0-9-]` to `-`, fitting in `max` chars.
///
/// Ids that do not survive unchanged get a hash suffix. An empty id stays empty.
pub fn dns_label(raw: &str, max: usize) -> String {
    let label: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            }
        })
        .collect();
    if raw.is_empty() {
        return label;
    }
    with_id_hash(raw, label.trim_matches('-'), max)
}
