use clap::Parser;
use std::path::PathBuf;

/// Squash the trailing layers of a Docker/OCI image tar into one.
#[derive(Parser)]
#[command(name = "squash")]
#[command(about = "Squash Docker/OCI image layers into a single layer")]
#[command(version)]
pub struct Cli {
    /// Path to the exported image tar (`docker save`/`skopeo copy` output)
    pub image_tar: PathBuf,

    /// Number of layers to squash counting from the top, or a layer id
    /// to squash from. Defaults to every layer in the image.
    #[arg(short = 'f', long = "from-layer")]
    pub from_layer: Option<String>,

    /// Repository:tag to record for the squashed image
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Message recorded as the squashed layer's history entry
    #[arg(short, long, default_value = "")]
    pub message: String,

    /// Work directory to extract into instead of the default, kept
    /// on disk afterwards instead of being removed
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Where to write the squashed image tar (default: alongside the input)
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// Emit debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
