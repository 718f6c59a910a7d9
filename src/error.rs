use std::fmt;
use std::path::PathBuf;

/// Exit code returned for [`SquashError::UnnecessarySquash`] — a
/// distinct, non-failure outcome, not a bug (§7).
pub const EXIT_UNNECESSARY_SQUASH: i32 = 2;

#[derive(Debug)]
pub enum SquashError {
    IoError(std::io::Error),
    JsonError(serde_json::Error),
    /// Tar path does not exist, or is not a readable tar archive.
    InputMissing(PathBuf),
    /// `--from-layer` is neither a positive count in range nor a known layer id.
    LayerResolution(String),
    /// The resolved layer count is zero, negative, or exceeds the layer count.
    InvalidRange(String),
    /// Exactly one real layer would be squashed; squashing is a no-op.
    UnnecessarySquash(String),
    /// A layer referenced by the image metadata has no tar file on disk.
    MissingLayerTar(PathBuf),
    /// Required metadata files are absent or malformed for both known layouts.
    FormatError(String),
}

impl fmt::Display for SquashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SquashError::IoError(err) => write!(f, "IO error: {}", err),
            SquashError::JsonError(err) => write!(f, "JSON error: {}", err),
            SquashError::InputMissing(path) => {
                write!(f, "input tar not found: {}", path.display())
            }
            SquashError::LayerResolution(msg) => write!(f, "layer resolution error: {}", msg),
            SquashError::InvalidRange(msg) => write!(f, "invalid layer range: {}", msg),
            SquashError::UnnecessarySquash(msg) => write!(f, "unnecessary squash: {}", msg),
            SquashError::MissingLayerTar(path) => {
                write!(f, "layer tar not found: {}", path.display())
            }
            SquashError::FormatError(msg) => write!(f, "format error: {}", msg),
        }
    }
}

impl std::error::Error for SquashError {}

impl From<std::io::Error> for SquashError {
    fn from(err: std::io::Error) -> Self {
        SquashError::IoError(err)
    }
}

impl From<serde_json::Error> for SquashError {
    fn from(err: serde_json::Error) -> Self {
        SquashError::JsonError(err)
    }
}

impl SquashError {
    /// Process exit code this error should produce, per §7.
    pub fn exit_code(&self) -> i32 {
        match self {
            SquashError::UnnecessarySquash(_) => EXIT_UNNECESSARY_SQUASH,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, SquashError>;
