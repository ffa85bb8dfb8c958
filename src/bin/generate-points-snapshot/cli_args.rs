use clap::Parser;
use clap_verbosity_flag::Verbosity;
use std::path::PathBuf;

use route_tiles::snapshot::{DEFAULT_SNAPSHOT_PATH, SNAPSHOT_BATCH_SIZE};

/// Write every point to one public JSON file
///
/// Pages through all the point documents, newest first, keeps only the fields the map needs,
/// and publishes the result to the bucket.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Args {
    /// Directory holding the project's stores
    #[arg(long, value_name = "DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Service account key file. Not read if ROUTES_SERVICE_ACCOUNT is set
    #[arg(long, value_name = "FILENAME.json", default_value = "serviceAccountKey.json")]
    pub service_account_key: PathBuf,

    /// How many points to fetch per page
    #[arg(long, value_name = "NUMBER", default_value_t = SNAPSHOT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Object path to publish the snapshot to
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SNAPSHOT_PATH)]
    pub output_path: String,

    #[command(flatten)]
    pub verbose: Verbosity<clap_verbosity_flag::InfoLevel>,
}
