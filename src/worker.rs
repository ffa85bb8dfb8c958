//! Parse uploaded GPX files off the caller's thread.
//!
//! Each upload is submitted with a caller-chosen job id. Every job produces exactly one
//! [`WorkerReply`] carrying that id, either the parsed route or an error message. Replies arrive
//! in completion order, which need not be submission order.
use anyhow::Result;
use geo::{BoundingRect, MultiPoint};
use log::{debug, warn};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::gpx::{self, Trackpoint};
use crate::stats::{self, RouteStats};

pub type JobId = u64;

/// What the upload form gets back for a successfully parsed file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRoute {
    /// `[lat, lon]` pairs, in route order
    pub latlngs: Vec<[f64; 2]>,
    pub stats: RouteStats,
    pub name: Option<String>,
    /// `[[south, west], [north, east]]`, absent when there are no points
    pub bounds: Option<[[f64; 2]; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkerReply {
    Parsed {
        id: JobId,
        #[serde(flatten)]
        route: ParsedRoute,
    },
    Failed {
        id: JobId,
        error: String,
    },
}

impl WorkerReply {
    pub fn id(&self) -> JobId {
        match self {
            WorkerReply::Parsed { id, .. } | WorkerReply::Failed { id, .. } => *id,
        }
    }
}

/// Parse & summarise one GPX text. Never panics into the caller, errors become a
/// [`WorkerReply::Failed`].
pub fn process_job(id: JobId, gpx_text: &str) -> WorkerReply {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| gpx::parse_gpx(gpx_text)));
    match outcome {
        Ok(Ok(parsed)) => WorkerReply::Parsed {
            id,
            route: ParsedRoute {
                latlngs: parsed
                    .points
                    .iter()
                    .map(|p| [p.latitude, p.longitude])
                    .collect(),
                stats: stats::compute_stats(&parsed.points),
                bounds: bounds(&parsed.points),
                name: parsed.name,
            },
        },
        Ok(Err(e)) => WorkerReply::Failed {
            id,
            error: e.to_string(),
        },
        Err(panic_payload) => WorkerReply::Failed {
            id,
            error: panic_message(panic_payload.as_ref()),
        },
    }
}

fn bounds(points: &[Trackpoint]) -> Option<[[f64; 2]; 2]> {
    let mp: MultiPoint<f64> = points
        .iter()
        .map(|p| (p.longitude, p.latitude))
        .collect::<Vec<_>>()
        .into();
    mp.bounding_rect()
        .map(|r| [[r.min().y, r.min().x], [r.max().y, r.max().x]])
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "GPX worker panicked".to_string()
    }
}

/// A pool of threads parsing GPX uploads.
///
/// Submit with [`GpxWorker::submit`], collect with [`GpxWorker::recv`] and friends. There is no
/// cancellation.
pub struct GpxWorker {
    pool: rayon::ThreadPool,
    replies_tx: Sender<WorkerReply>,
    replies_rx: Receiver<WorkerReply>,
}

impl GpxWorker {
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("gpx-worker-{}", i))
            .build()?;
        let (replies_tx, replies_rx) = mpsc::channel();
        Ok(GpxWorker {
            pool,
            replies_tx,
            replies_rx,
        })
    }

    pub fn submit(&self, id: JobId, gpx_text: String) {
        debug!("Submitting GPX job {} ({} bytes)", id, gpx_text.len());
        let tx = self.replies_tx.clone();
        self.pool.spawn(move || {
            let reply = process_job(id, &gpx_text);
            if tx.send(reply).is_err() {
                warn!("GPX job {} finished after its worker was dropped", id);
            }
        });
    }

    /// Block until the next job finishes. Blocks forever if nothing is outstanding.
    pub fn recv(&self) -> Option<WorkerReply> {
        self.replies_rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerReply> {
        match self.replies_rx.recv_timeout(timeout) {
            Ok(reply) => Some(reply),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<WorkerReply> {
        self.replies_rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const GPX: &str = r#"<gpx><trk><name>Hill</name><trkseg>
        <trkpt lat="45.0" lon="10.0"><ele>100</ele></trkpt>
        <trkpt lat="45.001" lon="10.0"><ele>120</ele></trkpt>
        <trkpt lat="45.001" lon="10.001"><ele>110</ele></trkpt>
    </trkseg></trk></gpx>"#;

    #[test]
    fn parsed_reply() {
        let reply = process_job(7, GPX);
        assert_eq!(reply.id(), 7);
        let route = match reply {
            WorkerReply::Parsed { route, .. } => route,
            other => panic!("expected a parsed route, got {:?}", other),
        };
        assert_eq!(route.name.as_deref(), Some("Hill"));
        assert_eq!(route.latlngs[0], [45.0, 10.0]);
        assert_eq!(route.stats.elev_gain, 20);
        assert_eq!(route.bounds, Some([[45.0, 10.0], [45.001, 10.001]]));
    }

    #[test]
    fn error_reply_keyed_by_id() {
        let reply = process_job(3, "<gpx><trk>");
        assert_eq!(reply.id(), 3);
        assert!(matches!(reply, WorkerReply::Failed { .. }));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["id"], 3);
        assert!(json["error"].is_string());
    }

    #[test]
    fn reply_json_shape() {
        let json = serde_json::to_value(process_job(1, "<gpx/>")).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["latlngs"], serde_json::json!([]));
        assert_eq!(json["stats"]["distanceKm"], "0.0");
        assert_eq!(json["name"], serde_json::Value::Null);
        assert_eq!(json["bounds"], serde_json::Value::Null);
    }

    #[test]
    fn many_jobs_in_flight() {
        let worker = GpxWorker::new(4).unwrap();
        for id in 0..20 {
            let text = if id % 5 == 0 { "not xml".to_string() } else { GPX.to_string() };
            worker.submit(id, text);
        }
        let mut replies = HashMap::new();
        for _ in 0..20 {
            let reply = worker.recv_timeout(Duration::from_secs(10)).unwrap();
            assert!(replies.insert(reply.id(), reply).is_none());
        }
        assert_eq!(replies.len(), 20);
        for (id, reply) in replies {
            assert_eq!(id % 5 == 0, matches!(reply, WorkerReply::Failed { .. }), "job {}", id);
        }
        assert!(worker.try_recv().is_none());
    }
}
