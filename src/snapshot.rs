//! Export every point into one JSON file, so the map can load them in a single request.
use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use log::{info, warn};
use num_format::{Locale, ToFormattedString};
use serde::Serialize;
use serde_json::Value;

use crate::formatting::format_kib;
use crate::store::{ObjectMeta, ObjectStore, PointDocument, PointStore};

pub const SNAPSHOT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_SNAPSHOT_PATH: &str = "points/points.json";
pub const SNAPSHOT_CONTENT_TYPE: &str = "application/json";
pub const SNAPSHOT_CACHE_CONTROL: &str = "public, max-age=300";

/// One point in the snapshot. Field order here is the field order in the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointEntry {
    pub id: String,
    pub name: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<Value>,
    pub url: Value,
    pub metadata: Value,
    #[serde(rename = "fileName")]
    pub file_name: Value,
}

/// JavaScript-ish truthiness, which is how the map page treats these fields
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0. && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy_or(doc: &PointDocument, key: &str, default: Value) -> Value {
    doc.fields
        .get(key)
        .filter(|v| truthy(v))
        .cloned()
        .unwrap_or(default)
}

/// Keep only the fields the map uses. Anything else on the document is dropped.
pub fn project_point(doc: &PointDocument) -> PointEntry {
    PointEntry {
        id: doc.id.clone(),
        name: truthy_or(doc, "name", Value::String(String::new())),
        lat: doc.fields.get("lat").cloned(),
        lon: doc.fields.get("lon").cloned(),
        url: truthy_or(doc, "url", Value::Null),
        metadata: truthy_or(doc, "metadata", Value::Object(Default::default())),
        file_name: truthy_or(doc, "fileName", Value::Null),
    }
}

/// Every point, newest first, fetched `batch_size` at a time.
///
/// Stops at the first page shorter than `batch_size`.
pub fn collect_points(
    store: &dyn PointStore,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<Vec<PointEntry>> {
    if batch_size == 0 {
        bail!("Batch size must be at least 1");
    }
    info!("Fetching all points...");
    let mut points = Vec::new();
    let mut after = None;
    loop {
        let page = store
            .fetch_points(batch_size, after.as_ref())
            .with_context(|| format!("Fetching points after {} so far", points.len()))?;
        let page_len = page.points.len();
        points.extend(page.points.iter().map(project_point));
        progress.inc(page_len as u64);
        info!(
            "  Fetched {} point(s) so far...",
            points.len().to_formatted_string(&Locale::en)
        );

        if page_len < batch_size {
            break;
        }
        match page.next {
            Some(token) => after = Some(token),
            None => break,
        }
    }
    progress.finish();
    info!(
        "Total: {} point(s).",
        points.len().to_formatted_string(&Locale::en)
    );
    Ok(points)
}

pub fn serialize_snapshot(points: &[PointEntry]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(points)?)
}

/// Upload the snapshot, then try to make it public. Failing to make it public is only a warning,
/// the bucket may already allow public reads.
pub fn publish_snapshot(objects: &dyn ObjectStore, path: &str, body: &[u8]) -> Result<()> {
    info!("Uploading {}...", path);
    objects
        .upload(
            path,
            body,
            &ObjectMeta::new(SNAPSHOT_CONTENT_TYPE, SNAPSHOT_CACHE_CONTROL),
        )
        .with_context(|| format!("Publishing {}", path))?;

    match objects.make_public(path) {
        Ok(()) => info!("File made publicly readable."),
        Err(e) => warn!(
            "Could not set a public ACL on {} (this is fine if the bucket grants public read access another way): {:#}",
            path, e
        ),
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub path: String,
    pub num_points: usize,
    pub bytes: usize,
}

/// The whole snapshot job
pub fn run_snapshot_job(
    points: &dyn PointStore,
    objects: &dyn ObjectStore,
    path: &str,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<SnapshotOutcome> {
    let entries = collect_points(points, batch_size, progress)?;
    let body = serialize_snapshot(&entries)?;
    info!("Snapshot size: {}", format_kib(body.len() as u64));
    publish_snapshot(objects, path, &body)?;
    info!(
        "Done. {} point(s) written to {}.",
        entries.len().to_formatted_string(&Locale::en),
        path
    );
    Ok(SnapshotOutcome {
        path: path.to_string(),
        num_points: entries.len(),
        bytes: body.len(),
    })
}
