//! The multi-pass layer merge (C4) — the core of this crate.
//!
//! Ported from the reference `squash_layers`/`_add_hardlinks`/
//! `_add_symlinks`/`_add_file` routines, restructured into four
//! explicit, name-keyed passes instead of identity-keyed maps over
//! mutable module state (see SPEC_FULL.md §9).

use crate::error::{Result, SquashError};
use crate::format::layer_tar_path;
use crate::path::normalise;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, trace};

/// Result of squashing a run of layers (C4's output).
pub struct SquashOutput {
    /// Path to the produced tar, or `None` when every layer in the
    /// requested range was a `<missing-K>` placeholder.
    pub squashed_tar_path: Option<PathBuf>,
    /// The real (non-placeholder) layer ids that were *not* squashed.
    pub kept_real_layers: Vec<String>,
}

/// A tar member decoded into the name/kind/metadata record described
/// in SPEC_FULL.md §3, independent of how the source tar encoded long
/// names (GNU longname extensions live outside the 512-byte header the
/// `tar` crate's `Header` type models, so we resolve them once, up
/// front, via `Entry::path()`/`Entry::link_name()`).
#[derive(Clone)]
struct Member {
    name: String,
    normalized: String,
    link_target: Option<String>,
    entry_type: EntryType,
    mode: u32,
    uid: u64,
    gid: u64,
    mtime: u64,
    size: u64,
}

impl Member {
    fn from_entry<R: Read>(entry: &tar::Entry<'_, R>) -> Result<Self> {
        let header = entry.header();
        let name = entry.path()?.to_string_lossy().into_owned();
        let link_target = entry
            .link_name()?
            .map(|p| p.to_string_lossy().into_owned());
        Ok(Member {
            normalized: normalise(&name),
            name,
            link_target,
            entry_type: header.entry_type(),
            mode: header.mode().unwrap_or(0o644),
            uid: header.uid().unwrap_or(0),
            gid: header.gid().unwrap_or(0),
            mtime: header.mtime().unwrap_or(0),
            size: header.size().unwrap_or(0),
        })
    }

    fn is_whiteout(&self) -> bool {
        basename(&self.normalized).starts_with(".wh.")
    }

    fn is_opaque_marker(&self) -> bool {
        basename(&self.normalized) == ".wh..wh..opq"
    }

    /// The name a regular whiteout (`.wh.<x>`) deletes.
    fn whiteout_target(&self) -> String {
        let base = basename(&self.normalized);
        let deleted = base.strip_prefix(".wh.").unwrap_or(base);
        let dir = crate::path::dirname(&self.normalized);
        if dir.is_empty() {
            deleted.to_string()
        } else {
            format!("{dir}/{deleted}")
        }
    }

    /// A header carrying entry kind and metadata only — no path/link
    /// name. The name and link target must go through
    /// `Builder::append_data`/`append_link` instead of being baked in
    /// here with `Header::set_path`/`set_link_name`: those setters
    /// error out past 100 bytes rather than emitting the GNU long-name
    /// extension entry, while `append_data`/`append_link` insert it
    /// automatically.
    fn build_header(&self) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(self.entry_type);
        header.set_mode(self.mode);
        header.set_uid(self.uid);
        header.set_gid(self.gid);
        header.set_mtime(self.mtime);
        header.set_size(if matches!(self.entry_type, EntryType::Regular) {
            self.size
        } else {
            0
        });
        header
    }
}

/// `name` must already be normalised.
fn basename(name: &str) -> &str {
    name.rsplit_once('/').map(|(_, b)| b).unwrap_or(name)
}

/// A deferred regular file: kept aside in pass 1 because a later pass
/// (3) may still decide a symlink owns its name. Content is re-read
/// from its source layer tar when finally emitted (pass 4), never
/// buffered up front (§5 "Memory discipline").
struct DeferredFile {
    member: Member,
    source_tar: PathBuf,
}

/// Ordered list of per-layer skip-prefix sets, newest layer first
/// (`to_skip`/`skipped_sym_links`/`added_symlinks` all share this shape).
#[derive(Default)]
struct SkipTable(Vec<Vec<String>>);

impl SkipTable {
    fn push_layer(&mut self, prefixes: Vec<String>) {
        self.0.push(prefixes);
    }

    /// 1-based index of the first layer whose skip-set matches `name`,
    /// or 0 if none do (§4.4.1).
    fn first_match(&self, name: &str) -> usize {
        for (i, prefixes) in self.0.iter().enumerate() {
            for p in prefixes {
                if name == p || name.starts_with(&format!("{p}/")) {
                    return i + 1;
                }
            }
        }
        0
    }
}

/// Tracks which normalised names have already been written to the
/// squashed tar, preserving emission order.
#[derive(Default)]
struct EmittedNames {
    order: Vec<String>,
    set: HashSet<String>,
}

impl EmittedNames {
    fn contains(&self, name: &str) -> bool {
        self.set.contains(name)
    }

    fn record(&mut self, name: &str) {
        if self.set.insert(name.to_string()) {
            self.order.push(name.to_string());
        }
    }
}

/// Squash `layers_to_squash` (bottom→top) into a single tar under
/// `work_root/new/squashed/layer.tar`. `layer_ids_to_keep` is only
/// used to report which real ids remain un-squashed (§4.4).
pub fn squash_layers(
    layers_to_squash: &[String],
    layer_ids_to_keep: &[String],
    old_root: &Path,
    new_root: &Path,
    oci: bool,
) -> Result<SquashOutput> {
    let kept_real_layers: Vec<String> = layer_ids_to_keep
        .iter()
        .filter(|id| !id.starts_with("<missing-"))
        .cloned()
        .collect();
    let real_layers_to_squash: Vec<String> = layers_to_squash
        .iter()
        .filter(|id| !id.starts_with("<missing-"))
        .cloned()
        .collect();

    if real_layers_to_squash.is_empty() {
        return Ok(SquashOutput {
            squashed_tar_path: None,
            kept_real_layers,
        });
    }

    let squashed_dir = new_root.join("squashed");
    std::fs::create_dir_all(&squashed_dir)?;
    let squashed_tar_path = squashed_dir.join("layer.tar");
    let mut builder = Builder::new(File::create(&squashed_tar_path)?);

    let mut to_skip = SkipTable::default();
    let mut sym_skip = SkipTable::default();
    let mut opaque_dirs: Vec<String> = Vec::new();
    let mut squashed_files = EmittedNames::default();

    // Deferred collections, one slot per layer (newest first, 0-indexed
    // here; §4.4.1's "layer k" is 1-indexed and equal to `index + 1`).
    let mut hardlinks_by_layer: Vec<Vec<Member>> = Vec::new();
    let mut symlinks_by_layer: Vec<Vec<Member>> = Vec::new();
    let mut deferred_by_layer: Vec<Vec<DeferredFile>> = Vec::new();

    // ---- Pass 1: stream merge, newest to oldest ------------------------
    for (layer_index, layer_id) in real_layers_to_squash.iter().rev().enumerate() {
        let current_layer = layer_index + 1;
        let layer_tar = layer_tar_path(old_root, oci, layer_id);
        if !layer_tar.exists() {
            return Err(SquashError::MissingLayerTar(layer_tar));
        }
        debug!(layer = current_layer, id = %layer_id, "pass 1: processing layer");

        let file = File::open(&layer_tar)?;
        let mut archive = Archive::new(file);

        let mut members = Vec::new();
        for entry_result in archive.entries()? {
            let entry = entry_result?;
            members.push(Member::from_entry(&entry)?);
        }

        let mut files_to_skip = Vec::new();
        let mut layer_opaque_dirs = Vec::new();
        for m in &members {
            if m.is_whiteout() {
                if m.is_opaque_marker() {
                    layer_opaque_dirs.push(crate::path::dirname(&m.normalized));
                } else {
                    files_to_skip.push(m.whiteout_target());
                }
            }
        }
        to_skip.push_layer(files_to_skip);
        sym_skip.push_layer(Vec::new());

        let mut layer_hardlinks = Vec::new();
        let mut layer_symlinks = Vec::new();
        let mut layer_deferred = Vec::new();

        for m in &members {
            if m.is_whiteout() {
                continue;
            }
            if crate::path::is_under_any(&m.normalized, &opaque_dirs) {
                continue;
            }
            if m.entry_type == EntryType::Symlink {
                layer_symlinks.push(m.clone());
                sym_skip.0.last_mut().unwrap().push(m.normalized.clone());
                continue;
            }
            if sym_skip.first_match(&m.normalized) > 0 {
                layer_deferred.push(DeferredFile {
                    member: m.clone(),
                    source_tar: layer_tar.clone(),
                });
                continue;
            }
            if to_skip.first_match(&m.normalized) > 0 {
                continue;
            }
            if squashed_files.contains(&m.normalized) {
                continue;
            }
            if m.entry_type == EntryType::Link {
                layer_hardlinks.push(m.clone());
                continue;
            }

            trace!(name = %m.name, "pass 1: emitting");
            let mut header = m.build_header();
            let content = if m.entry_type == EntryType::Regular {
                read_member_content(&layer_tar, &m.normalized)?
            } else {
                Vec::new()
            };
            builder.append_data(&mut header, &m.name, content.as_slice())?;
            squashed_files.record(&m.normalized);
        }

        hardlinks_by_layer.push(layer_hardlinks);
        symlinks_by_layer.push(layer_symlinks);
        deferred_by_layer.push(layer_deferred);
        opaque_dirs.extend(layer_opaque_dirs);
    }

    // ---- Pass 2: hard links, ascending layer index ---------------------
    for (layer_index, hardlinks) in hardlinks_by_layer.iter().enumerate() {
        let current_layer = layer_index + 1;
        for m in hardlinks {
            let target = m.link_target.as_deref().map(normalise).unwrap_or_default();
            let name_skip = to_skip.first_match(&m.normalized);
            let target_skip = to_skip.first_match(&target);
            let masked = (name_skip > 0 && current_layer > name_skip)
                || (target_skip > 0 && current_layer > target_skip);
            if masked || squashed_files.contains(&m.normalized) || !squashed_files.contains(&target)
            {
                continue;
            }
            let mut header = m.build_header();
            let link_target = m.link_target.as_deref().unwrap_or("");
            builder.append_link(&mut header, m.name.as_str(), link_target)?;
            squashed_files.record(&m.normalized);
        }
    }

    // ---- Pass 3: symlinks, ascending layer index ------------------------
    let mut added_symlinks = SkipTable::default();
    for (layer_index, symlinks) in symlinks_by_layer.iter().enumerate() {
        let current_layer = layer_index + 1;
        for m in symlinks {
            if squashed_files.contains(&m.normalized) {
                continue;
            }
            if added_symlinks.first_match(&m.normalized) > 0 {
                continue;
            }
            let target = m.link_target.as_deref().map(normalise).unwrap_or_default();
            let name_skip = to_skip.first_match(&m.normalized);
            let target_skip = to_skip.first_match(&target);
            let masked = (name_skip > 0 && current_layer > name_skip)
                || (target_skip > 0 && current_layer > target_skip);
            if masked {
                continue;
            }
            let mut header = m.build_header();
            let link_target = m.link_target.as_deref().unwrap_or("");
            builder.append_link(&mut header, m.name.as_str(), link_target)?;
            added_symlinks.push_layer(vec![m.normalized.clone()]);
            squashed_files.record(&m.normalized);
        }
    }

    // ---- Pass 4: deferred files, using added_symlinks as skip authority --
    for layer in &deferred_by_layer {
        for deferred in layer {
            let m = &deferred.member;
            if squashed_files.contains(&m.normalized) {
                continue;
            }
            if added_symlinks.first_match(&m.normalized) > 0 {
                continue;
            }
            let mut header = m.build_header();
            let content = if m.entry_type == EntryType::Regular {
                read_member_content(&deferred.source_tar, &m.normalized)?
            } else {
                Vec::new()
            };
            builder.append_data(&mut header, &m.name, content.as_slice())?;
            squashed_files.record(&m.normalized);
        }
    }

    builder.finish()?;

    debug!(count = squashed_files.order.len(), "squash engine: emitted entries");

    Ok(SquashOutput {
        squashed_tar_path: Some(squashed_tar_path),
        kept_real_layers,
    })
}

/// Re-open `tar_path` and stream out the bytes of the regular-file
/// member whose normalised name is `target_name`. Used both for
/// immediate (pass 1) and deferred (pass 4) regular-file emission, so
/// content is always read from a fresh linear scan rather than held
/// across passes.
fn read_member_content(tar_path: &Path, target_name: &str) -> Result<Vec<u8>> {
    let file = File::open(tar_path)?;
    let mut archive = Archive::new(file);
    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let name = normalise(&entry.path()?.to_string_lossy());
        if name == target_name {
            let mut buf = Vec::with_capacity(entry.header().size().unwrap_or(0) as usize);
            entry.read_to_end(&mut buf)?;
            return Ok(buf);
        }
    }
    Err(SquashError::MissingLayerTar(tar_path.to_path_buf()))
}
