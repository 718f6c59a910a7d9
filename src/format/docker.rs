//! Docker v1.2 layout: reading (C3), and the shape always written on
//! output regardless of the input layout (C6's manifest/repositories).

use super::{digest_hex, ImageFormat, ImageMetadata};
use crate::error::{Result, SquashError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// `manifest.json` entry, as found in (and always written to) a
/// Docker v1.2 image export.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DockerManifest {
    #[serde(rename = "Config")]
    pub config: String,
    #[serde(rename = "RepoTags")]
    pub repo_tags: Option<Vec<String>>,
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// Image config document (`<id>.json`), shared by both input layouts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DockerConfig {
    pub architecture: String,
    pub config: ConfigDetails,
    pub rootfs: RootFs,
    pub history: Vec<HistoryEntry>,
    /// Fields this tool does not interpret but must round-trip
    /// byte-for-byte (e.g. `os`, `created`, `container_config`).
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigDetails {
    #[serde(rename = "Env")]
    pub env: Option<Vec<String>>,
    #[serde(rename = "Cmd")]
    pub cmd: Option<Vec<String>>,
    #[serde(rename = "WorkingDir")]
    pub working_dir: Option<String>,
    #[serde(rename = "ExposedPorts")]
    pub exposed_ports: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    pub diff_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryEntry {
    pub created: String,
    pub created_by: String,
    pub empty_layer: Option<bool>,
}

/// Interleave `diff_ids` with `<missing-K>` placeholders at the
/// positions dictated by `history`'s `empty_layer` entries (§4.3).
pub fn layer_ids_from_history(config: &DockerConfig) -> Vec<String> {
    let mut ids = Vec::with_capacity(config.history.len());
    let mut diff_iter = config.rootfs.diff_ids.iter();
    let mut missing_counter = 0usize;
    for entry in &config.history {
        if entry.empty_layer == Some(true) {
            ids.push(format!("<missing-{missing_counter}>"));
            missing_counter += 1;
        } else if let Some(diff_id) = diff_iter.next() {
            ids.push(diff_id.clone());
        }
    }
    ids
}

pub fn read_docker_metadata(root: &Path) -> Result<ImageMetadata> {
    let manifest_path = root.join("manifest.json");
    let manifest_content = fs::read_to_string(&manifest_path)
        .map_err(|_| SquashError::FormatError(format!("cannot read {}", manifest_path.display())))?;
    let manifests: Vec<DockerManifest> = serde_json::from_str(&manifest_content)?;
    let manifest = manifests
        .into_iter()
        .next()
        .ok_or_else(|| SquashError::FormatError("manifest.json contains no entries".to_string()))?;

    let config_path = root.join(&manifest.config);
    let config_content = fs::read_to_string(&config_path).map_err(|_| {
        SquashError::FormatError(format!("cannot read config file {}", config_path.display()))
    })?;
    let config: DockerConfig = serde_json::from_str(&config_content)?;

    let layer_ids = layer_ids_from_history(&config);

    Ok(ImageMetadata {
        layer_ids,
        config,
        format: ImageFormat::Docker,
    })
}

/// Write the output `manifest.json`. `kept_layers` is bottom-to-top;
/// a trailing `squashed/layer.tar` entry is appended when
/// `add_squashed_layer` is true (§4.6).
pub fn write_docker_manifest(
    new_root: &Path,
    config_name: &str,
    kept_layers: &[String],
    oci: bool,
    add_squashed_layer: bool,
    repo_tags: Option<Vec<String>>,
) -> Result<()> {
    let mut layers: Vec<String> = kept_layers
        .iter()
        .filter(|id| !id.starts_with("<missing-"))
        .map(|id| {
            let path = super::layer_tar_path(Path::new(""), oci, id);
            path.to_string_lossy().into_owned()
        })
        .collect();
    if add_squashed_layer {
        layers.push(Path::new("squashed").join("layer.tar").to_string_lossy().into_owned());
    }

    let manifest = vec![DockerManifest {
        config: config_name.to_string(),
        repo_tags,
        layers,
    }];
    let manifest_json = serde_json::to_string_pretty(&manifest)?;
    fs::write(new_root.join("manifest.json"), manifest_json)?;
    Ok(())
}

/// Write the classic Docker `repositories` file: `repo -> {tag: image_id}`.
pub fn write_repositories(new_root: &Path, image_id: &str, repo_tags: &[String]) -> Result<()> {
    let mut repositories: HashMap<String, HashMap<String, String>> = HashMap::new();
    for repo_tag in repo_tags {
        let (repo, tag) = repo_tag.split_once(':').unwrap_or((repo_tag.as_str(), "latest"));
        repositories
            .entry(repo.to_string())
            .or_default()
            .insert(tag.to_string(), digest_hex(image_id).to_string());
    }
    let json = serde_json::to_string_pretty(&repositories)?;
    fs::write(new_root.join("repositories"), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config(history: Vec<HistoryEntry>, diff_ids: Vec<&str>) -> DockerConfig {
        DockerConfig {
            architecture: "amd64".to_string(),
            config: ConfigDetails {
                env: None,
                cmd: None,
                working_dir: None,
                exposed_ports: None,
            },
            rootfs: RootFs {
                fs_type: "layers".to_string(),
                diff_ids: diff_ids.into_iter().map(String::from).collect(),
            },
            history,
            extra: HashMap::new(),
        }
    }

    fn entry(created_by: &str, empty: Option<bool>) -> HistoryEntry {
        HistoryEntry {
            created: "2024-01-01T00:00:00Z".to_string(),
            created_by: created_by.to_string(),
            empty_layer: empty,
        }
    }

    #[test]
    fn interleaves_missing_placeholders_at_empty_history_entries() {
        let config = sample_config(
            vec![
                entry("FROM scratch", Some(true)),
                entry("COPY a", None),
                entry("ENV X=1", Some(true)),
                entry("COPY b", None),
            ],
            vec!["sha256:aaa", "sha256:bbb"],
        );
        let ids = layer_ids_from_history(&config);
        assert_eq!(
            ids,
            vec![
                "<missing-0>".to_string(),
                "sha256:aaa".to_string(),
                "<missing-1>".to_string(),
                "sha256:bbb".to_string(),
            ]
        );
    }

    #[test]
    fn all_real_history_matches_diff_ids_one_to_one() {
        let config = sample_config(
            vec![entry("COPY a", None), entry("COPY b", None)],
            vec!["sha256:aaa", "sha256:bbb"],
        );
        assert_eq!(
            layer_ids_from_history(&config),
            vec!["sha256:aaa".to_string(), "sha256:bbb".to_string()]
        );
    }

    #[test]
    fn repositories_file_maps_repo_to_tag_to_image_id() {
        let dir = tempfile::tempdir().unwrap();
        write_repositories(dir.path(), "sha256:deadbeef", &["myrepo:latest".to_string()]).unwrap();
        let content = fs::read_to_string(dir.path().join("repositories")).unwrap();
        let parsed: HashMap<String, HashMap<String, String>> =
            serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["myrepo"]["latest"], "deadbeef");
    }
}
