pub mod haversine;

pub mod gpx;
pub mod stats;
pub mod worker;

pub mod collate;
pub mod features;
pub mod palette;

pub mod credentials;
pub mod store;

pub mod snapshot;
pub mod tiles;

pub mod fileio;
pub mod formatting;

pub use collate::{RouteRecord, RouteResolver};
pub use credentials::{Credentials, load_credentials};
pub use gpx::{ParsedGpx, Trackpoint, parse_gpx};
pub use stats::{RouteStats, compute_stats};
pub use store::LocalBackend;
