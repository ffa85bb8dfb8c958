//! Where routes, points and files live.
//!
//! The jobs only talk to these traits. [`LocalBackend`] implements all of them on a directory.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::collate::RouteRecord;

pub mod local;
pub use local::LocalBackend;

/// Headers stored with an uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub content_type: String,
    pub cache_control: String,
}

impl ObjectMeta {
    pub fn new(content_type: impl Into<String>, cache_control: impl Into<String>) -> Self {
        ObjectMeta {
            content_type: content_type.into(),
            cache_control: cache_control.into(),
        }
    }
}

/// A bucket of files addressed by `/` separated paths (e.g. `gpx/ride.gpx`).
pub trait ObjectStore {
    /// All object paths starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn exists(&self, path: &str) -> Result<bool>;

    fn download(&self, path: &str) -> Result<Vec<u8>>;

    /// Replace (or create) the object. Readers see either the old or the new object, never part
    /// of one.
    fn upload(&self, path: &str, body: &[u8], meta: &ObjectMeta) -> Result<()>;

    fn upload_file(&self, local_path: &Path, path: &str, meta: &ObjectMeta) -> Result<()> {
        let body = std::fs::read(local_path)
            .with_context(|| format!("Reading {} for upload", local_path.display()))?;
        self.upload(path, &body, meta)
    }

    /// Allow anyone to read this object. Can fail when the bucket's access is controlled
    /// elsewhere.
    fn make_public(&self, path: &str) -> Result<()>;
}

/// The route documents
pub trait RouteStore {
    /// All route records, newest `uploadedAt` first.
    fn routes_by_upload_desc(&self) -> Result<Vec<RouteRecord>>;
}

/// A raw point document, as stored
#[derive(Debug, Clone, PartialEq)]
pub struct PointDocument {
    pub id: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Opaque marker of where the previous page ended. Only the store that made it understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        ContinuationToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointPage {
    pub points: Vec<PointDocument>,
    /// `None` when there is nothing after this page
    pub next: Option<ContinuationToken>,
}

/// The point documents, paged newest `uploadedAt` first.
pub trait PointStore {
    fn fetch_points(&self, limit: usize, after: Option<&ContinuationToken>) -> Result<PointPage>;
}
