use squash::cli::Cli;
use squash::pipeline::{self, RunOptions};
use std::process;
use tracing::error;

fn main() {
    let cli = Cli::parse_args();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_target(false)
        .init();

    let opts = RunOptions {
        from_layer: cli.from_layer,
        tag: cli.tag,
        message: cli.message,
        tmp_dir: cli.tmp_dir,
        output_path: cli.output_path,
    };

    match pipeline::run(&cli.image_tar, opts) {
        Ok(outcome) => {
            println!(
                "squashed image written to {} ({})",
                outcome.output_path.display(),
                outcome.image_id
            );
        }
        Err(err) => {
            error!(%err, "squash failed");
            process::exit(err.exit_code());
        }
    }
}
