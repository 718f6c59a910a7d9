//! OCI image-layout: reading (C3). Output is always Docker-shaped
//! (§6), so this module has no writer counterpart.

use super::docker::{layer_ids_from_history, DockerConfig};
use super::{ImageFormat, ImageMetadata};
use crate::error::{Result, SquashError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct Index {
    manifests: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    config: Descriptor,
    layers: Vec<Descriptor>,
}

fn blob_path(root: &Path, digest: &str) -> std::path::PathBuf {
    root.join("blobs").join("sha256").join(super::digest_hex(digest))
}

fn read_blob_json<T: for<'de> Deserialize<'de>>(root: &Path, digest: &str) -> Result<T> {
    let path = blob_path(root, digest);
    let content = fs::read_to_string(&path)
        .map_err(|_| SquashError::FormatError(format!("cannot read blob {}", path.display())))?;
    Ok(serde_json::from_str(&content)?)
}

pub fn read_oci_metadata(root: &Path) -> Result<ImageMetadata> {
    if !root.join("oci-layout").is_file() {
        return Err(SquashError::FormatError(
            "oci-layout marker file is missing".to_string(),
        ));
    }
    let index_content = fs::read_to_string(root.join("index.json"))
        .map_err(|_| SquashError::FormatError("cannot read index.json".to_string()))?;
    let index: Index = serde_json::from_str(&index_content)?;
    let top_manifest_desc = index
        .manifests
        .first()
        .ok_or_else(|| SquashError::FormatError("index.json lists no manifests".to_string()))?;

    let manifest: Manifest = read_blob_json(root, &top_manifest_desc.digest)?;
    let config: DockerConfig = read_blob_json(root, &manifest.config.digest)?;

    // OCI manifests enumerate layer blobs directly; `diff_ids` in the
    // config is the authoritative ordering once <missing-K> is
    // accounted for (§4.3), so we still derive layer_ids from history
    // rather than from `manifest.layers` — the layer *bytes* are found
    // via C2's `layer_tar_path`, keyed by diff_id, not by this list.
    let _ = manifest.layers;
    let layer_ids = layer_ids_from_history(&config);

    Ok(ImageMetadata {
        layer_ids,
        config,
        format: ImageFormat::Oci,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn rejects_tree_without_oci_layout_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.json"), b"{}").unwrap();
        assert!(read_oci_metadata(dir.path()).is_err());
    }

    #[test]
    fn blob_path_is_content_addressed_under_blobs_sha256() {
        let p = blob_path(Path::new("/root"), "sha256:abcd");
        assert_eq!(p, Path::new("/root/blobs/sha256/abcd"));
    }
}
