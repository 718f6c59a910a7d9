//! Format detection and the on-disk layout adapter (C2, C3, C5).
//!
//! This crate accepts two on-disk layer tree shapes — a Docker v1.2
//! export and an OCI image-layout — and always *emits* the Docker
//! v1.2 shape (§6 "Output"). [`detect_format`]/[`layer_tar_path`] hide
//! the shape of the *input* tree from the squash engine (C4), which
//! only ever asks "where is this layer's tar content."

pub mod docker;
pub mod oci;

use crate::error::{Result, SquashError};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk layer-tree shape of an extracted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Docker,
    Oci,
}

impl ImageFormat {
    pub fn is_oci(self) -> bool {
        matches!(self, ImageFormat::Oci)
    }
}

/// Metadata produced by the C3 reader, shared by both layouts.
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    /// Ordered bottom-to-top layer ids, `<missing-K>` placeholders included.
    pub layer_ids: Vec<String>,
    pub config: docker::DockerConfig,
    pub format: ImageFormat,
}

impl ImageMetadata {
    pub fn is_oci(&self) -> bool {
        self.format.is_oci()
    }
}

/// Inspect `root` (an extracted image tar) and decide which layout it uses.
pub fn detect_format(root: &Path) -> Result<ImageFormat> {
    if root.join("oci-layout").is_file() && root.join("index.json").is_file() {
        return Ok(ImageFormat::Oci);
    }
    if root.join("manifest.json").is_file() {
        return Ok(ImageFormat::Docker);
    }
    Err(SquashError::FormatError(format!(
        "neither a Docker manifest.json nor an OCI index.json/oci-layout pair was found under {}",
        root.display()
    )))
}

/// Strip the `sha256:` prefix a layer/config id may carry.
pub fn digest_hex(id: &str) -> &str {
    id.strip_prefix("sha256:").unwrap_or(id)
}

/// Resolve the filesystem path to a layer's tar content (C2).
///
/// `<missing-K>` placeholders have no path; callers must filter them
/// out before calling this (§4.2).
pub fn layer_tar_path(root: &Path, oci: bool, layer_id: &str) -> PathBuf {
    let digest = digest_hex(layer_id);
    if oci {
        root.join("blobs").join("sha256").join(digest)
    } else {
        root.join(digest).join("layer.tar")
    }
}

pub fn read_metadata(root: &Path, format: ImageFormat) -> Result<ImageMetadata> {
    match format {
        ImageFormat::Docker => docker::read_docker_metadata(root),
        ImageFormat::Oci => oci::read_oci_metadata(root),
    }
}

/// Copy the tar content of every kept real layer (C5) from `old_root`
/// into `new_root`, preserving the *input* layout's addressing scheme
/// for the copy — the orchestrator later rewrites `manifest.json` to
/// describe the output layout regardless.
pub fn copy_preserved_layers(
    old_root: &Path,
    new_root: &Path,
    oci: bool,
    layer_ids: &[String],
) -> Result<()> {
    for layer_id in layer_ids {
        if layer_id.starts_with("<missing-") {
            continue;
        }
        let src = layer_tar_path(old_root, oci, layer_id);
        if !src.exists() {
            return Err(SquashError::MissingLayerTar(src));
        }
        let dst = layer_tar_path(new_root, oci, layer_id);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src, &dst)?;
        if !oci {
            // Docker's per-layer directory also carries a VERSION marker
            // and a minimal json sidecar; write them if missing so the
            // output tree is a well-formed Docker v1.2 export on its own.
            let layer_dir = dst.parent().expect("layer.tar always has a parent");
            let version_path = layer_dir.join("VERSION");
            if !version_path.exists() {
                fs::write(&version_path, b"1.0")?;
            }
            let json_path = layer_dir.join("json");
            if !json_path.exists() {
                fs::write(&json_path, format!("{{\"id\":\"{}\"}}", digest_hex(layer_id)))?;
            }
        }
    }
    Ok(())
}
