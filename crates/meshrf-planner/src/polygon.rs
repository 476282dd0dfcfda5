//! GeoJSON polygon input.

use crate::PlanError;
use geo::{Area, LineString, Polygon};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct PolygonGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<Vec<Vec<f64>>>,
}

/// Parse a GeoJSON `Polygon` geometry (or a `Feature` wrapping one).
///
/// Positions are `[lon, lat]`; the first ring is the exterior, the rest are
/// holes. Rings need at least three positions and the exterior must enclose a
/// non-zero area.
pub fn polygon_from_geojson(value: &Value) -> Result<Polygon<f64>, PlanError> {
    let geometry = match value.get("type").and_then(Value::as_str) {
        Some("Feature") => value
            .get("geometry")
            .ok_or_else(|| PlanError::InvalidGeometry("feature has no geometry".to_string()))?,
        _ => value,
    };

    let parsed: PolygonGeometry = serde_json::from_value(geometry.clone())
        .map_err(|e| PlanError::InvalidGeometry(format!("not a GeoJSON polygon: {}", e)))?;

    if parsed.kind != "Polygon" {
        return Err(PlanError::InvalidGeometry(format!(
            "expected Polygon geometry, got {}",
            parsed.kind
        )));
    }

    let mut rings = parsed
        .coordinates
        .iter()
        .enumerate()
        .map(|(i, ring)| ring_to_line_string(i, ring));

    let exterior = rings
        .next()
        .ok_or_else(|| PlanError::InvalidGeometry("polygon has no rings".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;

    let polygon = Polygon::new(exterior, interiors);
    if !(polygon.unsigned_area() > 0.0) {
        return Err(PlanError::InvalidGeometry("polygon has zero area".to_string()));
    }
    Ok(polygon)
}

fn ring_to_line_string(index: usize, ring: &[Vec<f64>]) -> Result<LineString<f64>, PlanError> {
    if ring.len() < 3 {
        return Err(PlanError::InvalidGeometry(format!(
            "ring {} has {} positions, need at least 3",
            index,
            ring.len()
        )));
    }

    let mut coords = Vec::with_capacity(ring.len());
    for position in ring {
        match position.as_slice() {
            [lon, lat, ..] if lon.is_finite() && lat.is_finite() => coords.push((*lon, *lat)),
            _ => {
                return Err(PlanError::InvalidGeometry(format!(
                    "ring {} has an invalid position {:?}",
                    index, position
                )))
            }
        }
    }
    Ok(LineString::from(coords))
}
