use anyhow::Result;
use geo::LineString;
use std::io::Write;

use crate::features::{FeatureGeometry, GeoFeature};

/// Write a geojson featurecollection, but manually construct it, so that every feature doesn't
/// have to be turned into a `serde_json::Value` first
pub fn write_geojson_features_directly<'a>(
    features: impl IntoIterator<Item = &'a GeoFeature>,
    mut f: &mut impl Write,
) -> Result<usize> {
    let mut num_written = 0;

    f.write_all(b"{\"type\":\"FeatureCollection\", \"features\": [\n")?;
    for (i, feature) in features.into_iter().enumerate() {
        if i != 0 {
            f.write_all(b",\n")?;
        }
        num_written += write_geojson_feature_directly(&mut f, feature)?;
    }
    f.write_all(b"\n]}")?;

    Ok(num_written)
}

fn write_geojson_feature_directly(mut f: &mut impl Write, feature: &GeoFeature) -> Result<usize> {
    f.write_all(b"{\"properties\":")?;
    serde_json::to_writer(&mut f, &feature.properties)?;
    f.write_all(b", \"geometry\": {\"type\":\"")?;
    f.write_all(feature.geometry.type_name().as_bytes())?;
    f.write_all(b"\", \"coordinates\": ")?;
    match &feature.geometry {
        FeatureGeometry::LineString(ls) => write_linestring_coords(f, ls)?,
        FeatureGeometry::MultiLineString(mls) => {
            f.write_all(b"[")?;
            for (i, ls) in mls.0.iter().enumerate() {
                if i != 0 {
                    f.write_all(b",")?;
                }
                write_linestring_coords(f, ls)?;
            }
            f.write_all(b"]")?;
        }
    }
    f.write_all(b"}, \"type\": \"Feature\"}")?;

    Ok(1)
}

fn write_linestring_coords(f: &mut impl Write, ls: &LineString<f64>) -> Result<()> {
    f.write_all(b"[")?;
    for (j, c) in ls.0.iter().enumerate() {
        if j != 0 {
            f.write_all(b",")?;
        }
        write!(f, "[{:.6}, {:.6}]", c.x, c.y)?;
    }
    f.write_all(b"]")?;
    Ok(())
}
