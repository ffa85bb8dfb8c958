//! Working out which GPX text to tile for each route, and what colour & name it gets.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use crate::palette::{self, ColoredRouteMeta};
use crate::store::{ObjectStore, RouteStore};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A route document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Object path of the uploaded file, e.g. `gpx/1700000000-ride.gpx`
    #[serde(default)]
    pub storage_path: Option<String>,
    /// The GPX text, saved on the document when it was uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpx_content: Option<String>,
    #[serde(default)]
    pub metadata: Option<RouteMetadata>,
    pub uploaded_at: DateTime<Utc>,
}

impl RouteRecord {
    /// `metadata.name`, else the file name. Empty strings don't count.
    pub fn display_name(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| non_empty(m.name.as_deref()))
            .or_else(|| non_empty(self.file_name.as_deref()))
    }

    fn cached_gpx(&self) -> Option<&str> {
        non_empty(self.gpx_content.as_deref())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Last part of a `/` separated path
pub fn file_basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RouteKey {
    StoragePath(String),
    FileName(String),
}

/// Look up a route's colour & name from where its GPX came from.
///
/// Built once per run from [`palette::assign_colors`], so it always agrees with the map page.
#[derive(Debug, Clone, Default)]
pub struct RouteResolver {
    routes: Vec<ColoredRouteMeta>,
    index: HashMap<RouteKey, usize>,
}

impl RouteResolver {
    pub fn new(records: &[RouteRecord]) -> Self {
        let mut resolver = RouteResolver::default();
        for (record, meta) in palette::assign_colors(records) {
            let idx = resolver.routes.len();
            resolver.routes.push(meta);
            // When 2 records share a key, the older one (later in display order) ends up owning it
            if let Some(storage_path) = non_empty(record.storage_path.as_deref()) {
                resolver
                    .index
                    .insert(RouteKey::StoragePath(storage_path.to_string()), idx);
            }
            if let Some(file_name) = non_empty(record.file_name.as_deref()) {
                resolver
                    .index
                    .insert(RouteKey::FileName(file_name.to_string()), idx);
            }
        }
        resolver
    }

    /// The route stored at `storage_path`, else the route whose file name is the basename of
    /// `storage_path` (or of `fallback_file_name` when there's no storage path).
    pub fn resolve(
        &self,
        storage_path: Option<&str>,
        fallback_file_name: Option<&str>,
    ) -> Option<&ColoredRouteMeta> {
        let storage_path = non_empty(storage_path);
        let by_path = storage_path
            .and_then(|p| self.index.get(&RouteKey::StoragePath(p.to_string())));
        let by_name = || {
            storage_path
                .or(non_empty(fallback_file_name))
                .and_then(|p| {
                    self.index
                        .get(&RouteKey::FileName(file_basename(p).to_string()))
                })
        };
        by_path.or_else(by_name).map(|&idx| &self.routes[idx])
    }

    /// How many routes have a colour
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Where one route's GPX text comes from
#[derive(Debug, Clone, PartialEq)]
pub enum GpxSource {
    /// A file in the object store
    Storage { path: String },
    /// The storage file is gone, use the copy saved on the route record
    Cached {
        storage_path: Option<String>,
        file_name: Option<String>,
        content: String,
    },
}

impl GpxSource {
    pub fn storage_path(&self) -> Option<&str> {
        match self {
            GpxSource::Storage { path } => Some(path),
            GpxSource::Cached { storage_path, .. } => storage_path.as_deref(),
        }
    }

    pub fn fallback_file_name(&self) -> Option<&str> {
        match self {
            GpxSource::Storage { .. } => None,
            GpxSource::Cached { file_name, .. } => file_name.as_deref(),
        }
    }

    /// Human description for log lines
    pub fn describe(&self) -> String {
        match self {
            GpxSource::Storage { path } => format!("storage file {}", path),
            GpxSource::Cached { file_name, .. } => format!(
                "cached GPX of {}",
                file_name.as_deref().unwrap_or("(unknown)")
            ),
        }
    }

    /// The GPX text
    pub fn read<'a>(&'a self, objects: &dyn ObjectStore) -> Result<Cow<'a, str>> {
        match self {
            GpxSource::Storage { path } => {
                let bytes = objects
                    .download(path)
                    .with_context(|| format!("Downloading {}", path))?;
                Ok(Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()))
            }
            GpxSource::Cached { content, .. } => Ok(Cow::Borrowed(content)),
        }
    }
}

/// A route which can't be tiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRoute {
    pub id: String,
    pub file_name: Option<String>,
    pub storage_path: Option<String>,
}

#[derive(Debug, Default)]
pub struct Collation {
    pub resolver: RouteResolver,
    /// In tiling order: routes newest first, then GPX files no route refers to
    pub sources: Vec<GpxSource>,
    pub num_storage_files: usize,
    pub num_cached: usize,
    pub missing: Vec<MissingRoute>,
}

fn is_gpx_file(path: &str) -> bool {
    path.len() >= 4
        && path
            .get(path.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".gpx"))
}

/// Load all the routes, give them colours, and decide where each one's GPX comes from.
///
/// For each route: the object at its storage path if that exists, else the GPX cached on the
/// record (with a warning), else nothing (with a warning). Any `.gpx` under `gpx_prefix` which no
/// route points to is tiled too, with the fallback colour.
pub fn collate(
    routes: &dyn RouteStore,
    objects: &dyn ObjectStore,
    gpx_prefix: &str,
) -> Result<Collation> {
    info!("Fetching route order from the route store...");
    let mut records = routes
        .routes_by_upload_desc()
        .context("Fetching route records")?;
    records.sort_by(palette::display_order);
    let resolver = RouteResolver::new(&records);
    info!(
        "Loaded {} route(s).",
        records.len().to_formatted_string(&Locale::en)
    );

    info!("Listing GPX files under {}...", gpx_prefix);
    let listed = objects
        .list(gpx_prefix)
        .with_context(|| format!("Listing {}", gpx_prefix))?
        .into_iter()
        .filter(|p| is_gpx_file(p))
        .collect::<Vec<_>>();
    let listed_set = listed.iter().map(String::as_str).collect::<HashSet<_>>();
    info!(
        "Found {} GPX file(s) in storage.",
        listed.len().to_formatted_string(&Locale::en)
    );

    let mut sources = Vec::new();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut cached = Vec::new();
    let mut missing = Vec::new();

    for record in records {
        let storage_path = non_empty(record.storage_path.as_deref());
        let in_storage = storage_path.is_some_and(|p| {
            listed_set.contains(p)
                || objects.exists(p).unwrap_or_else(|e| {
                    warn!("Could not check for {} in storage: {:#}", p, e);
                    false
                })
        });

        if let (true, Some(path)) = (in_storage, storage_path) {
            if claimed.insert(path.to_string()) {
                sources.push(GpxSource::Storage {
                    path: path.to_string(),
                });
            } else {
                debug!("{} is used by more than one route, tiling it once", path);
            }
        } else if let Some(content) = record.cached_gpx() {
            let source = GpxSource::Cached {
                storage_path: record.storage_path.clone(),
                file_name: record.file_name.clone(),
                content: content.to_string(),
            };
            cached.push(source.clone());
            sources.push(source);
        } else {
            missing.push(MissingRoute {
                id: record.id,
                file_name: record.file_name,
                storage_path: record.storage_path,
            });
        }
    }

    for path in &listed {
        if !claimed.contains(path) {
            debug!("{} has no route record, using the fallback colour", path);
            sources.push(GpxSource::Storage { path: path.clone() });
        }
    }

    if !cached.is_empty() {
        warn!(
            "{} route(s) have no storage file, using the GPX cached on the route record:",
            cached.len()
        );
        for source in &cached {
            warn!(
                "    {} (storagePath: {})",
                source.fallback_file_name().unwrap_or("(unknown)"),
                source.storage_path().unwrap_or("null")
            );
        }
    }
    if !missing.is_empty() {
        warn!(
            "{} route(s) have no storage file AND no cached GPX, they will be MISSING from the tiles:",
            missing.len()
        );
        for route in &missing {
            warn!(
                "    {} (storagePath: {})",
                route.file_name.as_deref().unwrap_or("(unknown)"),
                route.storage_path.as_deref().unwrap_or("null")
            );
        }
    }

    Ok(Collation {
        resolver,
        sources,
        num_storage_files: listed.len(),
        num_cached: cached.len(),
        missing,
    })
}
