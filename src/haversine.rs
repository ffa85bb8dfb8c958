use geo::{Distance, HaversineMeasure, Point};

/// Earth radius used for all route distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.;

/// Great-circle distance, in metres, between 2 lat/lon positions (in degrees)
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    HaversineMeasure::new(EARTH_RADIUS_M).distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

pub fn haversine_m_fpair(lat_lon1: (f64, f64), lat_lon2: (f64, f64)) -> f64 {
    haversine_m(lat_lon1.0, lat_lon1.1, lat_lon2.0, lat_lon2.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point() {
        assert_eq!(haversine_m(51.5, -0.12, 51.5, -0.12), 0.);
    }

    #[test]
    fn one_degree_of_latitude() {
        // πR/180
        let d = haversine_m_fpair((0., 0.), (1., 0.));
        assert!((d - 111_194.93).abs() < 0.01, "{}", d);
    }

    #[test]
    fn symmetric() {
        let a = (45.0, 10.0);
        let b = (45.001, 10.001);
        assert!((haversine_m_fpair(a, b) - haversine_m_fpair(b, a)).abs() < 1e-9);
    }
}
