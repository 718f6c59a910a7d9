//! Orchestration: work-directory lifecycle, layer-range resolution,
//! and the end-to-end sequencing of C2–C7 (C8).

use crate::error::{Result, SquashError};
use crate::format::{self, docker};
use crate::metadata;
use crate::squash;
use crate::{archive, path};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default work-directory root used when the caller does not supply
/// `--tmp-dir` (§6 "Work directory layout").
const DEFAULT_WORK_ROOT: &str = "./.oci-squash-work";

/// Owns the `old/`/`new/` work-directory tree and removes it on drop
/// unless the caller supplied an explicit path (§3 "Lifecycle").
pub struct WorkDir {
    root: PathBuf,
    cleanup_on_drop: bool,
}

impl WorkDir {
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let (root, cleanup_on_drop) = match explicit {
            Some(p) => (p.to_path_buf(), false),
            None => {
                let root = PathBuf::from(DEFAULT_WORK_ROOT);
                if root.exists() {
                    fs::remove_dir_all(&root)?;
                }
                (root, true)
            }
        };
        fs::create_dir_all(root.join("old"))?;
        fs::create_dir_all(root.join("new"))?;
        Ok(WorkDir {
            root,
            cleanup_on_drop,
        })
    }

    pub fn old_dir(&self) -> PathBuf {
        self.root.join("old")
    }

    pub fn new_dir(&self) -> PathBuf {
        self.root.join("new")
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.cleanup_on_drop {
            let _ = fs::remove_dir_all(&self.root);
        }
    }
}

/// Split `all_layers` (bottom→top) into `(to_keep, to_squash)` per the
/// `-f/--from-layer` rules in §6, raising the error kinds in §7.
pub fn compute_layers_to_squash(
    all_layers: &[String],
    from_layer: Option<&str>,
) -> Result<(Vec<String>, Vec<String>)> {
    let total = all_layers.len();
    let number = match from_layer {
        None => total as i64,
        Some(spec) => match spec.parse::<i64>() {
            Ok(n) => n,
            Err(_) => match all_layers.iter().position(|id| id == spec) {
                Some(idx) => (total - idx - 1) as i64,
                None => return Err(SquashError::LayerResolution(format!("layer not found: {spec}"))),
            },
        },
    };

    if number <= 0 || number as usize > total {
        return Err(SquashError::InvalidRange(format!(
            "invalid number of layers to squash: {number}"
        )));
    }
    let number = number as usize;
    let marker = total - number;
    let to_keep = all_layers[..marker].to_vec();
    let to_squash = all_layers[marker..].to_vec();

    if to_squash.len() == 1 {
        return Err(SquashError::UnnecessarySquash(
            "single layer marked to squash, no squashing is required".to_string(),
        ));
    }
    Ok((to_keep, to_squash))
}

/// Flags the orchestrator needs beyond the input tar path itself.
pub struct RunOptions {
    pub from_layer: Option<String>,
    pub tag: Option<String>,
    pub message: String,
    pub tmp_dir: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
}

pub struct RunOutcome {
    pub output_path: PathBuf,
    pub image_id: String,
}

/// Run the full squash pipeline end to end (§4.7, C8).
pub fn run(image_tar: &Path, opts: RunOptions) -> Result<RunOutcome> {
    if !image_tar.exists() {
        return Err(SquashError::InputMissing(image_tar.to_path_buf()));
    }

    let work_dir = WorkDir::resolve(opts.tmp_dir.as_deref())?;
    let old_dir = work_dir.old_dir();
    let new_dir = work_dir.new_dir();

    info!(tar = %image_tar.display(), "extracting input image");
    archive::extract(image_tar, &old_dir)?;

    let fmt = format::detect_format(&old_dir)?;
    info!(?fmt, "detected image format");
    let meta = format::read_metadata(&old_dir, fmt)?;

    let (to_keep, to_squash) = compute_layers_to_squash(&meta.layer_ids, opts.from_layer.as_deref())?;
    info!(count = to_squash.len(), "squashing trailing layers");

    let squash_output = squash::squash_layers(&to_squash, &to_keep, &old_dir, &new_dir, meta.is_oci())?;

    format::copy_preserved_layers(&old_dir, &new_dir, meta.is_oci(), &to_keep)?;

    let moved_paths: Vec<PathBuf> = to_keep
        .iter()
        .filter(|id| !id.starts_with("<missing-"))
        .map(|id| format::layer_tar_path(&new_dir, meta.is_oci(), id))
        .filter(|p| p.exists())
        .collect();

    let diff_ids = metadata::compute_diff_ids(&moved_paths, squash_output.squashed_tar_path.as_deref())?;

    let kept_history_count = metadata::kept_history_count(&to_keep);
    let created_at = metadata::format_timestamp(now());
    let new_config = metadata::update_config_and_history(
        meta.config,
        kept_history_count,
        diff_ids,
        &opts.message,
        squash_output.squashed_tar_path.is_some(),
        &created_at,
    );
    let (image_id, config_name) = metadata::write_config_and_get_image_id(&new_dir, &new_config)?;

    let repo_tags = opts.tag.clone().map(|t| vec![t]);
    docker::write_docker_manifest(
        &new_dir,
        &config_name,
        &to_keep,
        meta.is_oci(),
        squash_output.squashed_tar_path.is_some(),
        repo_tags.clone(),
    )?;
    if let Some(tags) = &repo_tags {
        docker::write_repositories(&new_dir, &image_id, tags)?;
    }

    let output_path = opts.output_path.clone().unwrap_or_else(|| {
        let parent = image_tar.parent().unwrap_or_else(|| Path::new("."));
        let short_id = &format::digest_hex(&image_id)[..12.min(format::digest_hex(&image_id).len())];
        parent.join(format!("squashed-{short_id}.tar"))
    });
    info!(output = %output_path.display(), "packing output image");
    archive::pack(&new_dir, &output_path)?;

    info!(image_id = %image_id, "squash complete");
    Ok(RunOutcome {
        output_path,
        image_id,
    })
}

/// Wall-clock time is an external input, not something the pipeline's
/// pure logic should call directly — kept as a single seam so tests
/// can avoid it.
fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("sha256:layer{i}")).collect()
    }

    #[test]
    fn default_from_layer_squashes_everything() {
        let all = ids(4);
        let (keep, squash) = compute_layers_to_squash(&all, None).unwrap();
        assert!(keep.is_empty());
        assert_eq!(squash, all);
    }

    #[test]
    fn numeric_from_layer_counts_from_the_top() {
        let all = ids(4);
        let (keep, squash) = compute_layers_to_squash(&all, Some("2")).unwrap();
        assert_eq!(keep, vec!["sha256:layer0".to_string(), "sha256:layer1".to_string()]);
        assert_eq!(squash, vec!["sha256:layer2".to_string(), "sha256:layer3".to_string()]);
    }

    #[test]
    fn id_from_layer_counts_layers_above_it() {
        let all = ids(4);
        let (keep, squash) = compute_layers_to_squash(&all, Some("sha256:layer1")).unwrap();
        assert_eq!(keep, vec!["sha256:layer0".to_string(), "sha256:layer1".to_string()]);
        assert_eq!(squash, vec!["sha256:layer2".to_string(), "sha256:layer3".to_string()]);
    }

    #[test]
    fn unknown_layer_id_is_a_resolution_error() {
        let all = ids(2);
        let err = compute_layers_to_squash(&all, Some("sha256:nope")).unwrap_err();
        assert!(matches!(err, SquashError::LayerResolution(_)));
    }

    #[test]
    fn zero_layers_is_an_invalid_range() {
        let all = ids(2);
        let err = compute_layers_to_squash(&all, Some("0")).unwrap_err();
        assert!(matches!(err, SquashError::InvalidRange(_)));
    }

    #[test]
    fn too_many_layers_is_an_invalid_range() {
        let all = ids(2);
        let err = compute_layers_to_squash(&all, Some("5")).unwrap_err();
        assert!(matches!(err, SquashError::InvalidRange(_)));
    }

    #[test]
    fn exactly_one_layer_is_unnecessary() {
        let all = ids(3);
        let err = compute_layers_to_squash(&all, Some("1")).unwrap_err();
        assert!(matches!(err, SquashError::UnnecessarySquash(_)));
        assert_eq!(err.exit_code(), crate::error::EXIT_UNNECESSARY_SQUASH);
    }

    #[test]
    fn work_dir_with_explicit_path_is_not_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let explicit = parent.path().join("kept");
        {
            let work = WorkDir::resolve(Some(&explicit)).unwrap();
            assert!(work.old_dir().exists());
        }
        assert!(explicit.exists());
    }

    #[test]
    fn path_normalise_is_reexported_for_callers() {
        assert_eq!(path::normalise("./a/"), "a");
    }
}
