use anyhow::Result;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{error, info};
use std::time::Instant;

use route_tiles::formatting;
use route_tiles::snapshot;
use route_tiles::store::LocalBackend;

mod cli_args;

fn main() -> Result<()> {
    let args = cli_args::Args::parse();

    let logger = env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .build();
    let progress_bars = MultiProgress::new();
    LogWrapper::new(progress_bars.clone(), logger).try_init()?;
    if args.verbose.log_level_filter() < log::Level::Info {
        progress_bars.set_draw_target(ProgressDrawTarget::hidden());
    }

    let global_start = Instant::now();
    info!(
        "Starting generate-points-snapshot v{}",
        std::env!("CARGO_PKG_VERSION"),
    );

    let credentials = match route_tiles::load_credentials(&args.service_account_key) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    let store = LocalBackend::for_credentials(&args.data_dir, &credentials)?;

    // the total isn't known up front
    let progress = progress_bars.add(
        ProgressBar::no_length()
            .with_style(ProgressStyle::with_template(
                "[{elapsed_precise}] {human_pos} points fetched, {per_sec:>12} {msg}",
            )?)
            .with_message("Fetching points"),
    );

    if let Err(e) = snapshot::run_snapshot_job(
        &store,
        &store,
        &args.output_path,
        args.batch_size,
        &progress,
    ) {
        error!("Snapshot failed: {:#}", e);
        return Err(e);
    }

    info!(
        "Finished all in {}",
        formatting::format_duration(global_start.elapsed())
    );
    Ok(())
}
