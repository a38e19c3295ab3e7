//! GeoJSON → in-memory layers and parcel polygons.

use std::path::Path;

use geo::{Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use geojson::{GeoJson, Value};

use crate::errors::{ZoniError, ZoniResult};
use crate::spatial::geometry::polygons_of;
use crate::spatial::provider::{Attributes, Feature, FeatureLayer};

fn coord(position: &[f64]) -> Option<Coord<f64>> {
    match position {
        [x, y, ..] if x.is_finite() && y.is_finite() => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

fn line_string(positions: &[Vec<f64>]) -> LineString<f64> {
    LineString::new(positions.iter().filter_map(|p| coord(p)).collect())
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        line_string(exterior),
        interiors.iter().map(|r| line_string(r)).collect(),
    ))
}

/// Convert a GeoJSON geometry value; unusable coordinates are dropped.
pub fn geometry_from_value(value: &Value) -> Option<Geometry<f64>> {
    let geometry = match value {
        Value::Point(p) => Geometry::Point(Point::from(coord(p)?)),
        Value::MultiPoint(points) => Geometry::MultiPoint(MultiPoint::new(
            points.iter().filter_map(|p| coord(p)).map(Point::from).collect(),
        )),
        Value::LineString(line) => Geometry::LineString(line_string(line)),
        Value::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines.iter().map(|l| line_string(l)).collect(),
        )),
        Value::Polygon(rings) => Geometry::Polygon(polygon(rings)?),
        Value::MultiPolygon(polys) => Geometry::MultiPolygon(MultiPolygon::new(
            polys.iter().filter_map(|p| polygon(p)).collect(),
        )),
        Value::GeometryCollection(items) => Geometry::GeometryCollection(GeometryCollection::new_from(
            items
                .iter()
                .filter_map(|g| geometry_from_value(&g.value))
                .collect(),
        )),
    };
    Some(geometry)
}

fn parse(text: &str) -> ZoniResult<GeoJson> {
    text.parse::<GeoJson>()
        .map_err(|e| ZoniError::GeoJson(e.to_string()))
}

fn attributes_of(properties: Option<geojson::JsonObject>) -> Attributes {
    properties
        .map(|props| props.into_iter().collect())
        .unwrap_or_default()
}

/// Polygons carried by a GeoJSON geometry, feature or feature collection.
pub fn polygons_from_json(value: &serde_json::Value) -> ZoniResult<Vec<Polygon<f64>>> {
    let geometries: Vec<Geometry<f64>> = match parse(&value.to_string())? {
        GeoJson::Geometry(g) => geometry_from_value(&g.value).into_iter().collect(),
        GeoJson::Feature(f) => f
            .geometry
            .and_then(|g| geometry_from_value(&g.value))
            .into_iter()
            .collect(),
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .filter_map(|g| geometry_from_value(&g.value))
            .collect(),
    };
    Ok(geometries.iter().flat_map(polygons_of).collect())
}

/// Build a vector layer from GeoJSON text (a feature collection or a single
/// feature). Features without geometry are skipped.
pub fn layer_from_geojson_str(name: &str, text: &str) -> ZoniResult<FeatureLayer> {
    let raw_features = match parse(text)? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => {
            return Err(ZoniError::GeoJson(format!(
                "layer '{name}' must be a Feature or FeatureCollection"
            )))
        }
    };

    let total = raw_features.len();
    let features: Vec<Feature> = raw_features
        .into_iter()
        .filter_map(|f| {
            let geometry = f.geometry.as_ref().and_then(|g| geometry_from_value(&g.value))?;
            Some(Feature::new(geometry, attributes_of(f.properties)))
        })
        .collect();

    if features.len() < total {
        tracing::debug!(
            layer = name,
            skipped = total - features.len(),
            "skipped features without usable geometry"
        );
    }
    Ok(FeatureLayer::new(name, features))
}

pub fn load_layer(name: &str, path: &Path) -> ZoniResult<FeatureLayer> {
    let text = std::fs::read_to_string(path)?;
    layer_from_geojson_str(name, &text)
}
