//! Recomputing diff_ids/chain_ids and rewriting config + history (C6).

use crate::error::Result;
use crate::format::docker::{DockerConfig, HistoryEntry};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// SHA-256 of a layer's uncompressed tar bytes (§3 "diff_id").
pub fn diff_id_of(tar_path: &Path) -> Result<String> {
    let mut file = File::open(tar_path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// `diff_id` for every kept real layer, in order, followed by the
/// squashed layer's `diff_id` if one was produced.
pub fn compute_diff_ids(kept_layer_tars: &[PathBuf], squashed_tar: Option<&Path>) -> Result<Vec<String>> {
    let mut diff_ids = Vec::with_capacity(kept_layer_tars.len() + 1);
    for path in kept_layer_tars {
        diff_ids.push(diff_id_of(path)?);
    }
    if let Some(squashed) = squashed_tar {
        diff_ids.push(diff_id_of(squashed)?);
    }
    Ok(diff_ids)
}

/// `chain(0) = diff(0); chain(i) = sha256(chain(i-1) + " " + diff(i))` (§4.6).
pub fn compute_chain_ids(diff_ids: &[String]) -> Vec<String> {
    let mut chain_ids = Vec::with_capacity(diff_ids.len());
    let mut prev: Option<String> = None;
    for diff_id in diff_ids {
        let chain_id = match &prev {
            None => diff_id.clone(),
            Some(prev_chain) => {
                let mut hasher = Sha256::new();
                hasher.update(prev_chain.as_bytes());
                hasher.update(b" ");
                hasher.update(diff_id.as_bytes());
                format!("sha256:{:x}", hasher.finalize())
            }
        };
        chain_ids.push(chain_id.clone());
        prev = Some(chain_id);
    }
    chain_ids
}

/// Rewrite `config`'s history/rootfs to describe the post-squash layer
/// set: kept real history entries survive verbatim, the squashed range
/// collapses to one new entry (§4.6).
pub fn update_config_and_history(
    mut config: DockerConfig,
    kept_history_count: usize,
    diff_ids: Vec<String>,
    message: &str,
    squashed_tar_present: bool,
    created_at: &str,
) -> DockerConfig {
    config.history.truncate(kept_history_count);
    config.history.push(HistoryEntry {
        created: created_at.to_string(),
        created_by: if message.is_empty() {
            "squash".to_string()
        } else {
            message.to_string()
        },
        empty_layer: if squashed_tar_present { None } else { Some(true) },
    });
    config.rootfs.diff_ids = diff_ids;
    config
}

/// Number of history entries to keep verbatim: the entries belonging
/// to `to_keep`'s layers are exactly those preceding the first entry
/// of the squashed range. Since `layer_ids_from_history` walks history
/// in lockstep with `diff_ids`, this is just `to_keep.len()`.
pub fn kept_history_count(to_keep: &[String]) -> usize {
    to_keep.len()
}

/// Serialize `config` with Docker's canonical key ordering and return
/// `(image_id, config_file_name)` — the image id is `sha256:` + the
/// SHA-256 of the serialized bytes, and the file is named after the
/// hex digest, matching Docker's own convention (§4.6).
pub fn write_config_and_get_image_id(new_root: &Path, config: &DockerConfig) -> Result<(String, String)> {
    let config_json = serde_json::to_vec_pretty(config)?;
    let mut hasher = Sha256::new();
    hasher.update(&config_json);
    let hex = format!("{:x}", hasher.finalize());
    let image_id = format!("sha256:{hex}");
    let file_name = format!("{hex}.json");
    fs::write(new_root.join(&file_name), &config_json)?;
    Ok((image_id, file_name))
}

/// RFC 3339 timestamp suitable for a new history entry. Accepts the
/// current time as an argument rather than calling out to a clock
/// itself, so callers (and tests) control it explicitly.
pub fn format_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.to_rfc3339()
}

pub fn read_uncompressed_tar_size(tar_path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(tar_path)?.len())
}
