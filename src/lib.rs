//! # squash
//!
//! Collapses the trailing layers of a Docker v1.2 or OCI image export
//! into a single layer, rewriting `manifest.json`/config/history so the
//! result is itself a loadable image.
//!
//! ## Pipeline
//!
//! 1. Extract the input tar into a work directory ([`archive`]).
//! 2. Detect the layout and read its metadata ([`format`]).
//! 3. Resolve which layers to squash ([`pipeline::compute_layers_to_squash`]).
//! 4. Merge them with the four-pass overlay algorithm ([`squash`]).
//! 5. Copy the layers that were kept untouched ([`format::copy_preserved_layers`]).
//! 6. Recompute `diff_id`/`chain_id` and rewrite history ([`metadata`]).
//! 7. Write `manifest.json` and, if tagged, `repositories` ([`format::docker`]).
//! 8. Pack the work directory back into a tar ([`archive::pack`]).
//!
//! [`pipeline::run`] drives all of the above.

pub mod archive;
pub mod cli;
pub mod error;
pub mod format;
pub mod metadata;
pub mod path;
pub mod pipeline;
pub mod squash;

pub use cli::Cli;
pub use error::{Result, SquashError};

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_round_trips_through_parse_args_path() {
        let cli = Cli::try_parse_from(["squash", "image.tar", "-v"]).unwrap();
        assert_eq!(cli.image_tar.to_str().unwrap(), "image.tar");
        assert!(cli.verbose);
    }

    #[test]
    fn io_error_converts_into_squash_error() {
        use std::io;

        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let squash_error: SquashError = io_error.into();

        match squash_error {
            SquashError::IoError(_) => {}
            other => panic!("expected IoError, got {other:?}"),
        }
    }
}
