use clap::Parser;
use clap_verbosity_flag::Verbosity;
use std::path::PathBuf;

use route_tiles::tiles::{DEFAULT_GPX_PREFIX, DEFAULT_TILES_PATH};

/// Compile every uploaded route into one PMTiles file
///
/// Reads the route records and the GPX files, gives each route its map colour, runs tippecanoe
/// over the lot, and publishes the tile file to the bucket.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Args {
    /// Directory holding the project's stores
    #[arg(long, value_name = "DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Service account key file. Not read if ROUTES_SERVICE_ACCOUNT is set
    #[arg(long, value_name = "FILENAME.json", default_value = "serviceAccountKey.json")]
    pub service_account_key: PathBuf,

    /// The tippecanoe program to run
    #[arg(long, value_name = "PROGRAM", default_value = "tippecanoe")]
    pub tippecanoe: PathBuf,

    /// Create the temporary working directory in here, rather than the system temp directory
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Object prefix of the uploaded GPX files
    #[arg(long, value_name = "PREFIX", default_value = DEFAULT_GPX_PREFIX)]
    pub gpx_prefix: String,

    /// Object path to publish the tile file to
    #[arg(long, value_name = "PATH", default_value = DEFAULT_TILES_PATH)]
    pub output_path: String,

    #[command(flatten)]
    pub verbose: Verbosity<clap_verbosity_flag::InfoLevel>,
}
