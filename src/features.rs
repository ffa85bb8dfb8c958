//! GPX → GeoJSON features for the tiles
use geo::{Coord, LineString, MultiLineString};
use log::warn;
use serde_json::{Map, Value};

use crate::collate::{RouteResolver, file_basename};
use crate::gpx::{self, GpxError};
use crate::palette::FALLBACK_COLOR;

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    LineString(LineString<f64>),
    MultiLineString(MultiLineString<f64>),
}

impl FeatureGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureGeometry::LineString(_) => "LineString",
            FeatureGeometry::MultiLineString(_) => "MultiLineString",
        }
    }

    pub fn num_lines(&self) -> usize {
        match self {
            FeatureGeometry::LineString(_) => 1,
            FeatureGeometry::MultiLineString(mls) => mls.0.len(),
        }
    }
}

/// One line (or set of lines) to put in the tiles. x is longitude, y is latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    pub geometry: FeatureGeometry,
    pub properties: Map<String, Value>,
}

impl GeoFeature {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }
}

/// Line features in a GPX document.
///
/// One feature per `<trk>` (a LineString if it has one usable segment, otherwise a
/// MultiLineString), then one LineString per `<rte>`. Lines need at least 2 points. Waypoints
/// are ignored, so a waypoint-only file gives nothing.
pub fn gpx_to_features(xml: &str) -> Result<Vec<GeoFeature>, GpxError> {
    let doc = gpx::parse_document(xml)?;
    let mut features = Vec::new();

    for trk in doc.descendants().filter(|n| gpx::is_element(n, "trk")) {
        let mut lines: Vec<LineString<f64>> = trk
            .children()
            .filter(|c| gpx::is_element(c, "trkseg"))
            .filter_map(|seg| line_of(&seg, "trkpt"))
            .collect();
        let geometry = match lines.len() {
            0 => continue,
            1 => FeatureGeometry::LineString(lines.remove(0)),
            _ => FeatureGeometry::MultiLineString(MultiLineString::new(lines)),
        };
        features.push(GeoFeature {
            geometry,
            properties: element_properties(&trk, "trk"),
        });
    }

    for rte in doc.descendants().filter(|n| gpx::is_element(n, "rte")) {
        if let Some(line) = line_of(&rte, "rtept") {
            features.push(GeoFeature {
                geometry: FeatureGeometry::LineString(line),
                properties: element_properties(&rte, "rte"),
            });
        }
    }

    Ok(features)
}

fn line_of(parent: &roxmltree::Node, point_tag: &str) -> Option<LineString<f64>> {
    let coords = parent
        .children()
        .filter(|c| gpx::is_element(c, point_tag))
        .filter_map(|c| gpx::trackpoint(&c))
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect::<Vec<_>>();
    (coords.len() >= 2).then(|| LineString::new(coords))
}

fn element_properties(node: &roxmltree::Node, gpx_type: &str) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("_gpxType".to_string(), gpx_type.into());
    if let Some(name) = gpx::element_name(node) {
        properties.insert("name".to_string(), name.into());
    }
    properties
}

/// `ride.GPX` → `ride`
pub fn strip_gpx_extension(file_name: &str) -> &str {
    match file_name.len().checked_sub(4) {
        Some(cut)
            if file_name
                .get(cut..)
                .is_some_and(|ext| ext.eq_ignore_ascii_case(".gpx")) =>
        {
            &file_name[..cut]
        }
        _ => file_name,
    }
}

/// The features of one route's GPX, each stamped with `filename`, `color` & `name`.
///
/// `storage_path` (or `fallback_file_name`) identifies the route to `resolver`. Without a match
/// the colour is [`FALLBACK_COLOR`] and the name is the file name without `.gpx`.
pub fn flatten_route(
    xml: &str,
    storage_path: Option<&str>,
    fallback_file_name: Option<&str>,
    resolver: &RouteResolver,
) -> Result<Vec<GeoFeature>, GpxError> {
    let source = storage_path
        .or(fallback_file_name)
        .unwrap_or("unknown.gpx");
    let filename = file_basename(source);
    let meta = resolver.resolve(storage_path, fallback_file_name);
    let color = meta.map_or(FALLBACK_COLOR, |m| m.color);
    let name = meta
        .and_then(|m| m.name.clone())
        .unwrap_or_else(|| strip_gpx_extension(filename).to_string());

    let mut features = gpx_to_features(xml)?;
    for feature in features.iter_mut() {
        feature
            .properties
            .insert("filename".to_string(), filename.into());
        feature.properties.insert("color".to_string(), color.into());
        feature
            .properties
            .insert("name".to_string(), name.clone().into());
    }
    if features.is_empty() {
        warn!(
            "Zero features produced from {}, the file may contain only waypoints (no <trk> or <rte> elements).",
            source
        );
    }
    Ok(features)
}
