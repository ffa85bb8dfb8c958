//! Reading GPX documents
//!
//! Track points (`trkpt`) and route points (`rtept`) are treated the same. Points with a missing
//! or unparsable `lat`/`lon` are dropped, they are not an error. Only XML which can't be parsed at
//! all is an error.
use serde::Serialize;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GpxError {
    #[error("{0}")]
    Xml(String),
}

impl From<roxmltree::Error> for GpxError {
    fn from(e: roxmltree::Error) -> Self {
        GpxError::Xml(e.to_string())
    }
}

/// One sample along a route, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trackpoint {
    pub latitude: f64,
    pub longitude: f64,
    /// `None` when there's no `<ele>`, or it isn't a number. Never defaulted to 0
    pub elevation: Option<f64>,
}

impl Trackpoint {
    pub fn new(latitude: f64, longitude: f64, elevation: impl Into<Option<f64>>) -> Self {
        Trackpoint {
            latitude,
            longitude,
            elevation: elevation.into(),
        }
    }

    pub fn lat_lon(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedGpx {
    pub points: Vec<Trackpoint>,
    pub name: Option<String>,
}

/// Parse GPX text into the ordered trackpoints, and the route name.
///
/// The name is the first of: track name, route name, `<metadata>` name.
pub fn parse_gpx(xml: &str) -> Result<ParsedGpx, GpxError> {
    let doc = parse_document(xml)?;

    let points = doc
        .descendants()
        .filter(|n| is_element(n, "trkpt") || is_element(n, "rtept"))
        .filter_map(|n| trackpoint(&n))
        .collect();

    let name = ["trk", "rte", "metadata"]
        .iter()
        .find_map(|parent| child_name(&doc, parent));

    Ok(ParsedGpx { points, name })
}

/// Parse XML, allowing a `<!DOCTYPE>`, which some GPS exporters write.
pub(crate) fn parse_document(xml: &str) -> Result<roxmltree::Document<'_>, GpxError> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    Ok(roxmltree::Document::parse_with_options(xml, options)?)
}

/// The trackpoint for this `trkpt`/`rtept` node, if it has a usable position.
pub(crate) fn trackpoint(node: &roxmltree::Node) -> Option<Trackpoint> {
    let latitude = parse_number(node.attribute("lat")?)?;
    let longitude = parse_number(node.attribute("lon")?)?;
    let elevation = node
        .children()
        .find(|c| is_element(c, "ele"))
        .and_then(|ele| parse_number(&text_content(&ele)));
    Some(Trackpoint::new(latitude, longitude, elevation))
}

/// Text of the first `<name>` directly under any `parent` element in the document
fn child_name(doc: &roxmltree::Document, parent: &str) -> Option<String> {
    doc.descendants()
        .filter(|n| is_element(n, parent))
        .find_map(|n| element_name(&n))
}

/// Text of the `<name>` child of this element
pub(crate) fn element_name(node: &roxmltree::Node) -> Option<String> {
    node.children()
        .find(|c| is_element(c, "name"))
        .map(|name| text_content(&name))
}

pub(crate) fn is_element(node: &roxmltree::Node, local_name: &str) -> bool {
    node.is_element() && node.tag_name().name() == local_name
}

fn text_content(node: &roxmltree::Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_points_in_order() {
        let gpx = r#"<?xml version="1.0"?>
<gpx version="1.1" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>Morning loop</name><trkseg>
    <trkpt lat="45.0" lon="10.0"><ele>100</ele></trkpt>
    <trkpt lat="45.001" lon="10.0"><ele>120.4</ele></trkpt>
    <trkpt lat="45.001" lon="10.001"></trkpt>
  </trkseg></trk>
</gpx>"#;
        let parsed = parse_gpx(gpx).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("Morning loop"));
        assert_eq!(
            parsed.points,
            vec![
                Trackpoint::new(45.0, 10.0, 100.),
                Trackpoint::new(45.001, 10.0, 120.4),
                Trackpoint::new(45.001, 10.001, None),
            ]
        );
    }

    #[test]
    fn route_points_count_too() {
        let gpx = r#"<gpx><rte><name>Commute</name>
            <rtept lat="1" lon="2"/><rtept lat="3" lon="4"><ele>5</ele></rtept>
        </rte></gpx>"#;
        let parsed = parse_gpx(gpx).unwrap();
        assert_eq!(parsed.points.len(), 2);
        assert_eq!(parsed.points[1].elevation, Some(5.));
        assert_eq!(parsed.name.as_deref(), Some("Commute"));
    }

    #[test]
    fn bad_positions_dropped() {
        let gpx = r#"<gpx><trk><trkseg>
            <trkpt lat="abc" lon="2"/>
            <trkpt lon="2"/>
            <trkpt lat="1" lon="inf"/>
            <trkpt lat="1" lon="2"><ele>high</ele></trkpt>
        </trkseg></trk></gpx>"#;
        let parsed = parse_gpx(gpx).unwrap();
        assert_eq!(parsed.points, vec![Trackpoint::new(1., 2., None)]);
    }

    #[test]
    fn name_priority() {
        let gpx = r#"<gpx><metadata><name>Doc</name></metadata>
            <rte><name>Route</name></rte>
            <trk><name>Track</name></trk></gpx>"#;
        assert_eq!(parse_gpx(gpx).unwrap().name.as_deref(), Some("Track"));

        let gpx = r#"<gpx><metadata><name>Doc</name></metadata><rte><name>Route</name></rte></gpx>"#;
        assert_eq!(parse_gpx(gpx).unwrap().name.as_deref(), Some("Route"));

        let gpx = r#"<gpx><metadata><name>Doc</name></metadata></gpx>"#;
        assert_eq!(parse_gpx(gpx).unwrap().name.as_deref(), Some("Doc"));

        assert_eq!(parse_gpx("<gpx/>").unwrap().name, None);
    }

    #[test]
    fn doctype_allowed() {
        let gpx = r#"<?xml version="1.0"?><!DOCTYPE gpx><gpx><trk><trkseg><trkpt lat="1" lon="2"/></trkseg></trk></gpx>"#;
        let parsed = parse_gpx(gpx).unwrap();
        assert_eq!(parsed.points, vec![Trackpoint::new(1., 2., None)]);
    }

    #[test]
    fn name_text_kept_as_is() {
        let gpx = "<gpx><trk><name>  Lake loop\n</name></trk></gpx>";
        assert_eq!(parse_gpx(gpx).unwrap().name.as_deref(), Some("  Lake loop\n"));
    }

    #[test]
    fn waypoints_are_not_trackpoints() {
        let gpx = r#"<gpx><wpt lat="1" lon="2"><name>Cafe</name></wpt></gpx>"#;
        let parsed = parse_gpx(gpx).unwrap();
        assert!(parsed.points.is_empty());
        assert_eq!(parsed.name, None);
    }

    #[test]
    fn malformed_xml() {
        let err = parse_gpx("<gpx><trk></gpx>").unwrap_err();
        let GpxError::Xml(msg) = err;
        assert!(!msg.is_empty());
    }
}
