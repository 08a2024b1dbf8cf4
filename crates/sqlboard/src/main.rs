use clap::Parser;

use sqlboard::{adapters, cli::Args, error::AppResult, logging};

fn main() -> AppResult<()> {
    let args = Args::parse();
    logging::init(&args.log_level, args.log_format);
    tracing::info!(data_dir = %args.data_dir.display(), "starting sqlboard bridge");
    adapters::bridge::run(args)
}
