//! Distance and elevation summaries of a route
use serde::{Serialize, Serializer};
use std::fmt;

use crate::gpx::Trackpoint;
use crate::haversine::haversine_m_fpair;

/// Shown in place of a min/max elevation when no point has one
pub const UNKNOWN_ELEVATION: &str = "—";

/// A whole number of metres, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    Metres(i64),
    Unknown,
}

impl Elevation {
    pub fn metres(&self) -> Option<i64> {
        match self {
            Elevation::Metres(m) => Some(*m),
            Elevation::Unknown => None,
        }
    }
}

impl fmt::Display for Elevation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Elevation::Metres(m) => write!(f, "{}", m),
            Elevation::Unknown => f.write_str(UNKNOWN_ELEVATION),
        }
    }
}

impl Serialize for Elevation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Elevation::Metres(m) => serializer.serialize_i64(*m),
            Elevation::Unknown => serializer.serialize_str(UNKNOWN_ELEVATION),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    /// Kilometres, always with exactly one decimal place
    pub distance_km: String,
    pub elev_gain: i64,
    pub elev_loss: i64,
    pub min_ele: Elevation,
    pub max_ele: Elevation,
}

/// Calculate the stats for these points (in route order).
///
/// Gain/loss only counts pairs of consecutive points which both have an elevation.
pub fn compute_stats(points: &[Trackpoint]) -> RouteStats {
    // fold from +0.0, an empty `sum()` of floats is -0.0 and would print as "-0.0"
    let distance_m = points
        .windows(2)
        .map(|pair| haversine_m_fpair(pair[0].lat_lon(), pair[1].lat_lon()))
        .fold(0., |total, d| total + d);

    let (mut gain, mut loss) = (0., 0.);
    for pair in points.windows(2) {
        if let (Some(prev), Some(this)) = (pair[0].elevation, pair[1].elevation) {
            let diff = this - prev;
            if diff > 0. {
                gain += diff;
            } else {
                loss += diff.abs();
            }
        }
    }

    let elevations = points.iter().filter_map(|p| p.elevation);
    let min_ele = elevations.clone().reduce(f64::min);
    let max_ele = elevations.reduce(f64::max);

    RouteStats {
        distance_km: format!("{:.1}", distance_m / 1000.),
        elev_gain: round_half_up(gain),
        elev_loss: round_half_up(loss),
        min_ele: min_ele.map_or(Elevation::Unknown, |e| Elevation::Metres(round_half_up(e))),
        max_ele: max_ele.map_or(Elevation::Unknown, |e| Elevation::Metres(round_half_up(e))),
    }
}

/// Nearest integer, with .5 going up (so -2.5 → -2)
fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64, ele: impl Into<Option<f64>>) -> Trackpoint {
        Trackpoint::new(lat, lon, ele)
    }

    #[test]
    fn climb_then_descent() {
        let stats = compute_stats(&[
            pt(45.0, 10.0, 100.),
            pt(45.001, 10.0, 120.),
            pt(45.001, 10.001, 110.),
        ]);
        assert_eq!(stats.elev_gain, 20);
        assert_eq!(stats.elev_loss, 10);
        assert_eq!(stats.min_ele, Elevation::Metres(100));
        assert_eq!(stats.max_ele, Elevation::Metres(120));
        assert_eq!(stats.distance_km, "0.2");
        assert!(stats.distance_km.parse::<f64>().unwrap() > 0.);
    }

    #[test]
    fn empty_and_single() {
        for points in [vec![], vec![pt(1., 2., 3.)]] {
            let stats = compute_stats(&points);
            assert_eq!(stats.distance_km, "0.0");
            assert_eq!(stats.elev_gain, 0);
            assert_eq!(stats.elev_loss, 0);
        }
        let stats = compute_stats(&[pt(1., 2., 3.4)]);
        assert_eq!(stats.min_ele, Elevation::Metres(3));
        assert_eq!(stats.max_ele, Elevation::Metres(3));
    }

    #[test]
    fn no_elevation_at_all() {
        let stats = compute_stats(&[pt(0., 0., None), pt(0., 1., None), pt(1., 1., None)]);
        assert_eq!(stats.elev_gain, 0);
        assert_eq!(stats.elev_loss, 0);
        assert_eq!(stats.min_ele, Elevation::Unknown);
        assert_eq!(stats.max_ele, Elevation::Unknown);
        assert_eq!(stats.distance_km, "222.4");
    }

    #[test]
    fn gaps_dont_make_phantom_climbs() {
        // 100 → (none) → 300: neither pair has elevation on both sides
        let stats = compute_stats(&[pt(0., 0., 100.), pt(0., 0.001, None), pt(0., 0.002, 300.)]);
        assert_eq!(stats.elev_gain, 0);
        assert_eq!(stats.elev_loss, 0);
        assert_eq!(stats.min_ele, Elevation::Metres(100));
        assert_eq!(stats.max_ele, Elevation::Metres(300));
    }

    #[test]
    fn fractional_deltas_are_summed_before_rounding() {
        let stats = compute_stats(&[
            pt(0., 0., 10.),
            pt(0., 0.001, 10.4),
            pt(0., 0.002, 10.8),
            pt(0., 0.003, 10.5),
        ]);
        assert_eq!(stats.elev_gain, 1);
        assert_eq!(stats.elev_loss, 0);
    }

    #[test]
    fn serialises_like_the_map_page_expects() {
        let stats = compute_stats(&[pt(0., 0., None)]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "distanceKm": "0.0", "elevGain": 0, "elevLoss": 0, "minEle": "—", "maxEle": "—"
            })
        );
    }

    #[test]
    fn round_half_up_negatives() {
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(-2.6), -3);
    }
}
