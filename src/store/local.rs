//! All the stores, kept in a plain directory.
//!
//! ```text
//! <root>/storage/<bucket>/<object path>          object bytes
//! <root>/storage/<bucket>.meta/<object path>.json  ObjectMeta + public flag
//! <root>/storage/<bucket>.json                    bucket settings
//! <root>/documents/routes/<id>.json               one RouteRecord each
//! <root>/documents/points/<id>.json               one point document each
//! ```
use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{
    ContinuationToken, ObjectMeta, ObjectStore, PointDocument, PointPage, PointStore, RouteStore,
};
use crate::collate::RouteRecord;
use crate::credentials::Credentials;
use crate::palette::display_order;

/// Everything stored alongside an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObjectMeta {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSettings {
    /// Access is only controlled for the whole bucket, so per-object ACLs are refused.
    #[serde(default)]
    pub uniform_bucket_level_access: bool,
}

#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    bucket: String,
}

impl LocalBackend {
    pub fn open(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Result<Self> {
        let backend = LocalBackend {
            root: root.into(),
            bucket: bucket.into(),
        };
        if backend.bucket.is_empty() || backend.bucket.contains(['/', '\\']) {
            bail!("Invalid bucket name {:?}", backend.bucket);
        }
        for dir in [
            backend.objects_dir(),
            backend.meta_dir(),
            backend.routes_dir(),
            backend.points_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Creating store directory {}", dir.display()))?;
        }
        Ok(backend)
    }

    /// The project's data under `data_dir`
    pub fn for_credentials(data_dir: &Path, credentials: &Credentials) -> Result<Self> {
        if credentials.project_id.is_empty() || credentials.project_id.contains(['/', '\\']) {
            bail!("Invalid project_id {:?}", credentials.project_id);
        }
        Self::open(data_dir.join(&credentials.project_id), credentials.bucket())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("storage").join(&self.bucket)
    }
    fn meta_dir(&self) -> PathBuf {
        self.root.join("storage").join(format!("{}.meta", self.bucket))
    }
    fn bucket_settings_file(&self) -> PathBuf {
        self.root.join("storage").join(format!("{}.json", self.bucket))
    }
    fn routes_dir(&self) -> PathBuf {
        self.root.join("documents").join("routes")
    }
    fn points_dir(&self) -> PathBuf {
        self.root.join("documents").join("points")
    }

    fn object_file(&self, path: &str) -> Result<PathBuf> {
        check_object_path(path)?;
        Ok(self.objects_dir().join(path))
    }
    fn meta_file(&self, path: &str) -> Result<PathBuf> {
        check_object_path(path)?;
        Ok(self.meta_dir().join(format!("{}.json", path)))
    }

    pub fn bucket_settings(&self) -> Result<BucketSettings> {
        let path = self.bucket_settings_file();
        if !path.exists() {
            return Ok(BucketSettings::default());
        }
        let bytes = fs::read(&path).with_context(|| format!("Reading {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("Parsing {}", path.display()))
    }

    pub fn set_bucket_settings(&self, settings: &BucketSettings) -> Result<()> {
        write_atomically(&self.bucket_settings_file(), &serde_json::to_vec_pretty(settings)?)
    }

    /// Headers & ACL of an object, `None` if it was never uploaded through this store
    pub fn object_meta(&self, path: &str) -> Result<Option<StoredObjectMeta>> {
        let meta_file = self.meta_file(path)?;
        if !meta_file.exists() {
            return Ok(None);
        }
        let bytes =
            fs::read(&meta_file).with_context(|| format!("Reading {}", meta_file.display()))?;
        Ok(Some(serde_json::from_slice(&bytes).with_context(|| {
            format!("Parsing {}", meta_file.display())
        })?))
    }

    fn write_object_meta(&self, path: &str, meta: &StoredObjectMeta) -> Result<()> {
        write_atomically(&self.meta_file(path)?, &serde_json::to_vec_pretty(meta)?)
    }

    /// Save (or replace) a route document
    pub fn insert_route(&self, record: &RouteRecord) -> Result<()> {
        check_document_id(&record.id)?;
        let path = self.routes_dir().join(format!("{}.json", record.id));
        write_atomically(&path, &serde_json::to_vec_pretty(record)?)
    }

    /// Save (or replace) a point document
    pub fn insert_point(&self, point: &PointDocument) -> Result<()> {
        check_document_id(&point.id)?;
        let path = self.points_dir().join(format!("{}.json", point.id));
        write_atomically(&path, &serde_json::to_vec(&point.fields)?)
    }

    /// (id, document) for every `.json` file in this directory, in file name order
    fn read_documents(dir: &Path) -> Result<Vec<(String, serde_json::Value)>> {
        let mut files = fs::read_dir(dir)
            .with_context(|| format!("Listing {}", dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        files.retain(|p| p.extension().is_some_and(|ext| ext == "json"));
        files.sort();

        let mut docs = Vec::with_capacity(files.len());
        for file in files {
            let Some(id) = file.file_stem().and_then(|s| s.to_str()) else {
                warn!("Skipping document with a non UTF-8 name: {}", file.display());
                continue;
            };
            let parsed = fs::read(&file)
                .map_err(anyhow::Error::from)
                .and_then(|bytes| Ok(serde_json::from_slice(&bytes)?));
            match parsed {
                Ok(doc) => docs.push((id.to_string(), doc)),
                Err(e) => warn!("Skipping unreadable document {}: {:#}", file.display(), e),
            }
        }
        Ok(docs)
    }

    /// Every point with an `uploadedAt`, newest first, ties by id
    fn sorted_points(&self) -> Result<Vec<(DateTime<Utc>, PointDocument)>> {
        let mut points = Vec::new();
        for (id, doc) in Self::read_documents(&self.points_dir())? {
            let serde_json::Value::Object(fields) = doc else {
                warn!("Point document {} is not a JSON object, skipping", id);
                continue;
            };
            let uploaded_at = fields
                .get("uploadedAt")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
            match uploaded_at {
                Some(ts) => points.push((ts.with_timezone(&Utc), PointDocument { id, fields })),
                None => debug!("Point {} has no uploadedAt, so it isn't in the ordering", id),
            }
        }
        points.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(points)
    }
}

fn check_object_path(path: &str) -> Result<()> {
    if path.is_empty()
        || path.contains('\\')
        || path
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..")
    {
        bail!("Invalid object path {:?}", path);
    }
    Ok(())
}

fn check_document_id(id: &str) -> Result<()> {
    if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
        bail!("Invalid document id {:?}", id);
    }
    Ok(())
}

/// Write to a temporary file next to `dest`, then rename it over `dest`.
fn write_atomically(dest: &Path, body: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .with_context(|| format!("{} has no parent directory", dest.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Creating temporary file in {}", parent.display()))?;
    tmp.write_all(body)
        .with_context(|| format!("Writing {}", dest.display()))?;
    tmp.persist(dest)
        .with_context(|| format!("Replacing {}", dest.display()))?;
    Ok(())
}

fn encode_token(uploaded_at: &DateTime<Utc>, id: &str) -> ContinuationToken {
    ContinuationToken::new(format!(
        "{}|{}",
        uploaded_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        id
    ))
}

fn decode_token(token: &ContinuationToken) -> Result<(DateTime<Utc>, &str)> {
    let (ts, id) = token
        .as_str()
        .split_once('|')
        .with_context(|| format!("Malformed continuation token {:?}", token.as_str()))?;
    let ts = DateTime::parse_from_rfc3339(ts)
        .with_context(|| format!("Malformed continuation token {:?}", token.as_str()))?;
    Ok((ts.with_timezone(&Utc), id))
}

impl ObjectStore for LocalBackend {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects_dir = self.objects_dir();
        let mut paths = Vec::new();
        for entry in WalkDir::new(&objects_dir) {
            let entry = entry.with_context(|| format!("Listing {}", objects_dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&objects_dir) else {
                continue;
            };
            let Some(parts) = rel
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<Vec<_>>>()
            else {
                warn!("Ignoring object with a non UTF-8 name: {}", rel.display());
                continue;
            };
            let name = parts.join("/");
            if name.starts_with(prefix) {
                paths.push(name);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.object_file(path)?.is_file())
    }

    fn download(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.object_file(path)?;
        fs::read(&file).with_context(|| format!("Downloading {}", path))
    }

    fn upload(&self, path: &str, body: &[u8], meta: &ObjectMeta) -> Result<()> {
        let file = self.object_file(path)?;
        write_atomically(&file, body).with_context(|| format!("Uploading {}", path))?;
        self.write_object_meta(
            path,
            &StoredObjectMeta {
                meta: meta.clone(),
                public: false,
            },
        )
        .with_context(|| format!("Saving metadata for {}", path))
    }

    fn make_public(&self, path: &str) -> Result<()> {
        if self.bucket_settings()?.uniform_bucket_level_access {
            bail!(
                "Bucket {} has uniform bucket-level access, object ACLs can't be changed",
                self.bucket
            );
        }
        if !self.exists(path)? {
            bail!("No such object {}", path);
        }
        let mut meta = self.object_meta(path)?.unwrap_or_else(|| StoredObjectMeta {
            meta: ObjectMeta::new("application/octet-stream", ""),
            public: false,
        });
        meta.public = true;
        self.write_object_meta(path, &meta)
    }
}

impl RouteStore for LocalBackend {
    fn routes_by_upload_desc(&self) -> Result<Vec<RouteRecord>> {
        let mut routes = Vec::new();
        for (id, doc) in Self::read_documents(&self.routes_dir())? {
            match serde_json::from_value::<RouteRecord>(doc) {
                Ok(mut record) => {
                    if record.id.is_empty() {
                        record.id = id;
                    }
                    routes.push(record);
                }
                Err(e) => warn!("Route document {} is not a valid route, skipping: {}", id, e),
            }
        }
        routes.sort_by(display_order);
        Ok(routes)
    }
}

impl PointStore for LocalBackend {
    fn fetch_points(&self, limit: usize, after: Option<&ContinuationToken>) -> Result<PointPage> {
        let all = self.sorted_points()?;
        let start = match after {
            None => 0,
            Some(token) => {
                let (after_ts, after_id) = decode_token(token)?;
                all.partition_point(|(ts, doc)| {
                    *ts > after_ts || (*ts == after_ts && doc.id.as_str() <= after_id)
                })
            }
        };
        let page = all
            .into_iter()
            .skip(start)
            .take(limit)
            .collect::<Vec<_>>();
        let next = if page.len() == limit {
            page.last().map(|(ts, doc)| encode_token(ts, &doc.id))
        } else {
            None
        };
        Ok(PointPage {
            points: page.into_iter().map(|(_, doc)| doc).collect(),
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::open(dir.path(), "test-bucket").unwrap();
        (dir, backend)
    }

    fn point(id: &str, uploaded_at: &str) -> PointDocument {
        let fields = json!({"name": id, "lat": 1.0, "lon": 2.0, "uploadedAt": uploaded_at});
        PointDocument {
            id: id.to_string(),
            fields: fields.as_object().unwrap().clone(),
        }
    }

    #[test]
    fn upload_list_download() {
        let (_dir, store) = backend();
        let meta = ObjectMeta::new("application/gpx+xml", "no-cache");
        store.upload("gpx/b.gpx", b"<gpx/>", &meta).unwrap();
        store.upload("gpx/a.gpx", b"<gpx></gpx>", &meta).unwrap();
        store.upload("tiles/routes.pmtiles", b"x", &meta).unwrap();

        assert_eq!(store.list("gpx/").unwrap(), vec!["gpx/a.gpx", "gpx/b.gpx"]);
        assert_eq!(store.list("").unwrap().len(), 3);
        assert!(store.exists("gpx/a.gpx").unwrap());
        assert!(!store.exists("gpx/c.gpx").unwrap());
        assert_eq!(store.download("gpx/b.gpx").unwrap(), b"<gpx/>");
        assert!(store.download("gpx/c.gpx").is_err());

        let stored = store.object_meta("gpx/a.gpx").unwrap().unwrap();
        assert_eq!(stored.meta, meta);
        assert!(!stored.public);
    }

    #[test]
    fn upload_replaces() {
        let (_dir, store) = backend();
        let meta = ObjectMeta::new("text/plain", "no-cache");
        store.upload("a/b", b"one", &meta).unwrap();
        store.upload("a/b", b"two", &meta).unwrap();
        assert_eq!(store.download("a/b").unwrap(), b"two");
        assert_eq!(store.list("a/").unwrap(), vec!["a/b"]);
    }

    #[test]
    fn object_paths_stay_in_the_bucket() {
        let (_dir, store) = backend();
        for bad in ["", "/etc/passwd", "../x", "gpx//a.gpx", "gpx/./a.gpx"] {
            assert!(store.exists(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn make_public_respects_uniform_access() {
        let (_dir, store) = backend();
        store
            .upload("p.json", b"[]", &ObjectMeta::new("application/json", "x"))
            .unwrap();
        store.make_public("p.json").unwrap();
        assert!(store.object_meta("p.json").unwrap().unwrap().public);

        store
            .set_bucket_settings(&BucketSettings {
                uniform_bucket_level_access: true,
            })
            .unwrap();
        assert!(store.make_public("p.json").is_err());
        assert!(store.make_public("missing.json").is_err());
    }

    #[test]
    fn routes_sorted_newest_first() {
        let (dir, store) = backend();
        for (id, secs) in [("a", 10), ("b", 30), ("c", 20)] {
            store
                .insert_route(&crate::collate::tests::record(id, secs, None, None))
                .unwrap();
        }
        fs::write(
            dir.path().join("documents/routes/broken.json"),
            "{not json",
        )
        .unwrap();
        let ids = store
            .routes_by_upload_desc()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn points_paged_with_tokens() {
        let (_dir, store) = backend();
        store.insert_point(&point("p1", "2024-01-01T00:00:00Z")).unwrap();
        store.insert_point(&point("p2", "2024-01-03T00:00:00Z")).unwrap();
        store.insert_point(&point("p3", "2024-01-02T00:00:00Z")).unwrap();
        store.insert_point(&point("p4", "2024-01-02T00:00:00Z")).unwrap();
        let mut undated = point("p5", "x");
        undated.fields.remove("uploadedAt");
        store.insert_point(&undated).unwrap();

        let first = store.fetch_points(2, None).unwrap();
        assert_eq!(
            first.points.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["p2", "p3"]
        );
        let next = first.next.unwrap();
        let second = store.fetch_points(2, Some(&next)).unwrap();
        assert_eq!(
            second.points.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["p4", "p1"]
        );
        let last = store.fetch_points(2, second.next.as_ref()).unwrap();
        assert!(last.points.is_empty());
        assert!(last.next.is_none());

        assert!(
            store
                .fetch_points(2, Some(&ContinuationToken::new("garbage")))
                .is_err()
        );
    }
}
