use anyhow::Result;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{error, info};
use num_format::{Locale, ToFormattedString};
use std::time::Instant;

use route_tiles::formatting;
use route_tiles::store::LocalBackend;
use route_tiles::tiles::{self, TileJobConfig, TileRunOutcome, Tippecanoe};

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
        "Starting generate-route-tiles v{}",
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
    info!(
        "Using project {}, bucket {}",
        credentials.project_id,
        store.bucket()
    );

    let config = TileJobConfig {
        gpx_prefix: args.gpx_prefix,
        publish_path: args.output_path,
        scratch_parent: args.scratch_dir,
    };
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] {percent:>3}% done. eta {eta:>4} {bar:10.cyan/blue} {pos:>7}/{len:7} {msg}",
    )?;
    let progress = progress_bars.add(ProgressBar::new(0).with_style(style));

    let outcome = tiles::run_tile_job(
        &store,
        &store,
        &Tippecanoe::new(args.tippecanoe),
        &config,
        &progress,
    );
    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            error!("Tile generation failed: {:#}", e);
            return Err(e);
        }
    };

    match outcome {
        TileRunOutcome::Published {
            path,
            num_features,
            num_sources,
            num_cached,
            num_missing,
            bytes,
        } => info!(
            "Published {} ({} bytes) with {} feature(s) from {} GPX source(s), {} from cached GPX, {} route(s) missing.",
            path,
            bytes.to_formatted_string(&Locale::en),
            num_features.to_formatted_string(&Locale::en),
            num_sources.to_formatted_string(&Locale::en),
            num_cached.to_formatted_string(&Locale::en),
            num_missing.to_formatted_string(&Locale::en),
        ),
        TileRunOutcome::NoGpxFound | TileRunOutcome::NoFeatures => {
            info!("Nothing published.")
        }
    }

    info!(
        "Finished all in {}",
        formatting::format_duration(global_start.elapsed())
    );
    Ok(())
}
