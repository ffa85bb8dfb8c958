//! Compile every route into one vector tile file with tippecanoe, and publish it.
use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use log::{info, warn};
use num_format::{Locale, ToFormattedString};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::collate::{self, Collation};
use crate::features::{self, GeoFeature};
use crate::fileio;
use crate::store::{ObjectMeta, ObjectStore, RouteStore};

pub const DEFAULT_GPX_PREFIX: &str = "gpx/";
pub const DEFAULT_TILES_PATH: &str = "tiles/routes.pmtiles";
pub const TILES_CONTENT_TYPE: &str = "application/vnd.pmtiles";
pub const TILES_CACHE_CONTROL: &str = "public, max-age=3600";

/// The layer name the map style refers to
pub const ROUTES_LAYER: &str = "routes";
pub const MIN_ZOOM: u8 = 2;

/// One tippecanoe run. Always the same flags, only the files change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TippecanoeArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub layer: String,
    pub min_zoom: u8,
}

impl TippecanoeArgs {
    pub fn for_routes(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        TippecanoeArgs {
            input: input.into(),
            output: output.into(),
            layer: ROUTES_LAYER.to_string(),
            min_zoom: MIN_ZOOM,
        }
    }

    /// Command line arguments, one element per argument. Nothing goes through a shell.
    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            // guess the max zoom from the data
            "-zg".into(),
            format!("-Z{}", self.min_zoom).into(),
            // thin out the densest areas at low zooms, and add zooms until nothing is dropped
            "--drop-densest-as-needed".into(),
            "--extend-zooms-if-still-dropping".into(),
            "-l".into(),
            self.layer.clone().into(),
            "-o".into(),
            self.output.clone().into_os_string(),
            "--force".into(),
            self.input.clone().into_os_string(),
        ]
    }
}

/// Something which turns a GeoJSON file into a tile file.
pub trait TileCompiler {
    /// Ok only if the tile file has been written
    fn compile(&self, args: &TippecanoeArgs) -> Result<()>;
}

/// Runs the `tippecanoe` program
#[derive(Debug, Clone)]
pub struct Tippecanoe {
    program: PathBuf,
}

impl Tippecanoe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Tippecanoe {
            program: program.into(),
        }
    }
}

impl Default for Tippecanoe {
    fn default() -> Self {
        Tippecanoe::new("tippecanoe")
    }
}

impl TileCompiler for Tippecanoe {
    fn compile(&self, args: &TippecanoeArgs) -> Result<()> {
        let argv = args.to_args();
        info!("Running {} {:?}", self.program.display(), argv);
        // tippecanoe's progress goes straight to our stdout/stderr
        let status = Command::new(&self.program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Could not run {}", self.program.display()))?;
        if !status.success() {
            bail!("{} failed ({})", self.program.display(), status);
        }
        if !args.output.is_file() {
            bail!(
                "{} exited successfully, but didn't create {}",
                self.program.display(),
                args.output.display()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TileJobConfig {
    /// Object prefix holding the uploaded GPX files
    pub gpx_prefix: String,
    /// Where the tile file is published
    pub publish_path: String,
    /// Make the scratch directory in here, rather than the system temp dir
    pub scratch_parent: Option<PathBuf>,
}

impl Default for TileJobConfig {
    fn default() -> Self {
        TileJobConfig {
            gpx_prefix: DEFAULT_GPX_PREFIX.to_string(),
            publish_path: DEFAULT_TILES_PATH.to_string(),
            scratch_parent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileRunOutcome {
    /// No storage files and no cached GPX. Nothing published
    NoGpxFound,
    /// There was GPX, but not one line came out of it. Nothing published
    NoFeatures,
    Published {
        path: String,
        num_features: usize,
        num_sources: usize,
        /// Routes tiled from the GPX cached on their record (each one was warned about)
        num_cached: usize,
        /// Routes left out because they have no GPX at all (each one was warned about)
        num_missing: usize,
        bytes: u64,
    },
}

/// Features from every source. A source which can't be read or parsed is logged & skipped.
pub fn collect_features(
    collation: &Collation,
    objects: &dyn ObjectStore,
    progress: &ProgressBar,
) -> Vec<GeoFeature> {
    progress.set_length(collation.sources.len() as u64);
    progress.set_message("GPX sources converted");

    let mut all_features = Vec::new();
    for source in &collation.sources {
        info!("Processing {}", source.describe());
        let result = source.read(objects).and_then(|xml| {
            Ok(features::flatten_route(
                &xml,
                source.storage_path(),
                source.fallback_file_name(),
                &collation.resolver,
            )?)
        });
        match result {
            Ok(features) => all_features.extend(features),
            Err(e) => warn!("Failed to process {}: {:#}", source.describe(), e),
        }
        progress.inc(1);
    }
    progress.finish();

    info!(
        "Converted {} GeoJSON feature(s) from {} source(s).",
        all_features.len().to_formatted_string(&Locale::en),
        collation.sources.len().to_formatted_string(&Locale::en),
    );
    all_features
}

/// The whole tile job: collate routes, convert to features, run the compiler, publish.
///
/// The scratch directory is removed before returning, whether or not the run worked. If there
/// is nothing to tile, the compiler isn't run and the published file is left alone.
pub fn run_tile_job(
    routes: &dyn RouteStore,
    objects: &dyn ObjectStore,
    compiler: &dyn TileCompiler,
    config: &TileJobConfig,
    progress: &ProgressBar,
) -> Result<TileRunOutcome> {
    let collation = collate::collate(routes, objects, &config.gpx_prefix)?;

    if collation.sources.is_empty() {
        warn!("No GPX files found anywhere. Exiting without generating tiles.");
        return Ok(TileRunOutcome::NoGpxFound);
    }

    let features = collect_features(&collation, objects, progress);
    if features.is_empty() {
        warn!("No valid GeoJSON features produced. Exiting without generating tiles.");
        return Ok(TileRunOutcome::NoFeatures);
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix("pmtiles-");
    let scratch = match &config.scratch_parent {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    }
    .context("Creating scratch directory")?;
    info!("Working directory: {}", scratch.path().display());

    let result = compile_and_publish(scratch.path(), &features, objects, compiler, config);

    let scratch_path = scratch.path().to_path_buf();
    match scratch.close() {
        Ok(()) => info!("Cleaned up temp directory."),
        Err(e) => warn!(
            "Could not remove temp directory {}: {}",
            scratch_path.display(),
            e
        ),
    }

    let bytes = result?;
    Ok(TileRunOutcome::Published {
        path: config.publish_path.clone(),
        num_features: features.len(),
        num_sources: collation.sources.len(),
        num_cached: collation.num_cached,
        num_missing: collation.missing.len(),
        bytes,
    })
}

/// Returns the size of the published file
fn compile_and_publish(
    scratch: &Path,
    features: &[GeoFeature],
    objects: &dyn ObjectStore,
    compiler: &dyn TileCompiler,
    config: &TileJobConfig,
) -> Result<u64> {
    let geojson_path = scratch.join("routes.geojson");
    let mut f = BufWriter::new(
        File::create(&geojson_path)
            .with_context(|| format!("Creating {}", geojson_path.display()))?,
    );
    fileio::write_geojson_features_directly(features, &mut f)?;
    f.flush()?;
    drop(f);
    info!("Wrote combined GeoJSON to: {}", geojson_path.display());

    let args = TippecanoeArgs::for_routes(&geojson_path, scratch.join("routes.pmtiles"));
    compiler
        .compile(&args)
        .context("Tile compilation failed, nothing published")?;
    let bytes = std::fs::metadata(&args.output)
        .with_context(|| format!("Reading {}", args.output.display()))?
        .len();
    info!("Generated {} ({} bytes)", args.output.display(), bytes);

    info!("Uploading to {}...", config.publish_path);
    objects
        .upload_file(
            &args.output,
            &config.publish_path,
            &ObjectMeta::new(TILES_CONTENT_TYPE, TILES_CACHE_CONTROL),
        )
        .with_context(|| format!("Publishing {}", config.publish_path))?;
    info!("Successfully uploaded {}.", config.publish_path);
    Ok(bytes)
}
