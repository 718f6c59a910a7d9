//! Extracting the input image tar and packing the output image tar (C7).
//!
//! This is distinct from the per-layer tar streaming the squash engine
//! does (C4): here we only ever deal with the single top-level image
//! tar, unpacking it wholesale into a work directory and, at the end,
//! packing a work directory back into a single tar.

use crate::error::Result;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tar::Archive;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Extract `tar_path` into `dest_dir` (must already exist). Transparently
/// decompresses if the file starts with the gzip magic bytes, since
/// `docker save`/`skopeo copy` output is sometimes gzipped.
pub fn extract(tar_path: &Path, dest_dir: &Path) -> Result<()> {
    let mut file = File::open(tar_path)?;
    let mut magic = [0u8; 2];
    let is_gzip = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    file.seek(SeekFrom::Start(0))?;

    if is_gzip {
        let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
        archive.unpack(dest_dir)?;
    } else {
        let mut archive = Archive::new(BufReader::new(file));
        archive.unpack(dest_dir)?;
    }
    Ok(())
}

/// Pack `src_dir`'s contents (recursively) into a new tar at `output_path`.
pub fn pack(src_dir: &Path, output_path: &Path) -> Result<()> {
    let output_file = File::create(output_path)?;
    let mut builder = tar::Builder::new(output_file);
    builder.append_dir_all(".", src_dir)?;
    builder.finish()?;
    Ok(())
}
