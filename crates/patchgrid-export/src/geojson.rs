//! GeoJSON serialization of summaries, grid cells and patches, and
//! parsing of polygon layers.
//!
//! Output follows RFC 7946 ring orientation (exterior rings
//! counter-clockwise). When a CRS name is known it is written in the
//! legacy `crs` member, which GDAL and QGIS still honor for projected
//! coordinates.
//!
//! Parsing accepts a `FeatureCollection`, a single `Feature` or a bare
//! `Polygon`/`MultiPolygon` geometry. Features with any other geometry
//! type are counted as skipped rather than rejected.

use std::collections::BTreeMap;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use patchgrid_pipeline::types::BACKGROUND;
use patchgrid_pipeline::{CellSummary, GridCell, Patch, PatchId};
use serde_json::{Map, Value, json};

use crate::ExportError;

/// A polygonal feature read from GeoJSON.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    /// Feature geometry; a `Polygon` is read as a one-element multi-polygon.
    pub geometry: MultiPolygon<f64>,
    /// Feature properties (empty when absent or `null`).
    pub properties: Map<String, Value>,
}

/// Features parsed from one GeoJSON document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLayer {
    /// Polygonal features, in document order.
    pub features: Vec<VectorFeature>,
    /// Features without geometry or with a non-polygonal geometry.
    pub skipped: usize,
}

// ───────────────────────────── Writing ─────────────────────────────

fn ring_coordinates(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_coordinates(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_coordinates));
    Value::Array(rings)
}

fn multipolygon_geometry(geometry: &MultiPolygon<f64>) -> Value {
    json!({
        "type": "MultiPolygon",
        "coordinates": geometry.0.iter().map(polygon_coordinates).collect::<Vec<_>>(),
    })
}

fn extent_geometry(cell: &patchgrid_pipeline::Extent) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [cell.left, cell.bottom],
            [cell.right, cell.bottom],
            [cell.right, cell.top],
            [cell.left, cell.top],
            [cell.left, cell.bottom],
        ]],
    })
}

fn collection(features: Vec<Value>, crs: Option<&str>) -> Result<String, ExportError> {
    let mut root = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    if let (Some(name), Some(map)) = (crs, root.as_object_mut()) {
        map.insert(
            "crs".to_owned(),
            json!({ "type": "name", "properties": { "name": name } }),
        );
    }
    Ok(serde_json::to_string_pretty(&root)?)
}

/// Serialize per-cell summaries as polygon features of the cell
/// rectangles, with the summary columns as properties.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn summaries_to_geojson(
    summaries: &[CellSummary],
    crs: Option<&str>,
) -> Result<String, ExportError> {
    let features = summaries
        .iter()
        .map(|s| {
            json!({
                "type": "Feature",
                "geometry": extent_geometry(&s.extent()),
                "properties": {
                    "id": s.id,
                    "left": s.left,
                    "top": s.top,
                    "right": s.right,
                    "bottom": s.bottom,
                    "first_patch_id": s.first_patch_id,
                    "last_patch_id": s.last_patch_id,
                    "surface": s.surface,
                    "perimeter": s.perimeter,
                    "patch_count": s.patch_count,
                },
            })
        })
        .collect();
    collection(features, crs)
}

/// Serialize grid cells with their `id`.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn grid_to_geojson(cells: &[GridCell], crs: Option<&str>) -> Result<String, ExportError> {
    let features = cells
        .iter()
        .map(|c| {
            json!({
                "type": "Feature",
                "geometry": extent_geometry(&c.extent),
                "properties": { "id": c.id },
            })
        })
        .collect();
    collection(features, crs)
}

/// Serialize patches as multi-polygon features with a `patch_id`
/// property.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn patches_to_geojson(patches: &[Patch], crs: Option<&str>) -> Result<String, ExportError> {
    let features = patches
        .iter()
        .map(|p| {
            json!({
                "type": "Feature",
                "geometry": multipolygon_geometry(&p.geometry),
                "properties": { "patch_id": p.id },
            })
        })
        .collect();
    collection(features, crs)
}

// ───────────────────────────── Reading ─────────────────────────────

fn invalid(reason: impl Into<String>) -> ExportError {
    ExportError::InvalidGeoJson(reason.into())
}

fn parse_position(value: &Value) -> Result<Coord<f64>, ExportError> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid("position is not an array"))?;
    match (
        items.first().and_then(Value::as_f64),
        items.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(invalid("position needs two numbers")),
    }
}

fn parse_ring(value: &Value) -> Result<LineString<f64>, ExportError> {
    let positions = value
        .as_array()
        .ok_or_else(|| invalid("ring is not an array"))?;
    let coords = positions
        .iter()
        .map(parse_position)
        .collect::<Result<Vec<_>, _>>()?;
    if coords.len() < 4 {
        return Err(invalid(format!(
            "ring has {} positions, at least 4 required",
            coords.len()
        )));
    }
    Ok(LineString::new(coords))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>, ExportError> {
    let rings = value
        .as_array()
        .ok_or_else(|| invalid("polygon is not an array of rings"))?;
    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| invalid("polygon has no exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Parse a geometry object. `Ok(None)` means a valid but non-polygonal
/// (or null) geometry.
fn parse_geometry(value: &Value) -> Result<Option<MultiPolygon<f64>>, ExportError> {
    if value.is_null() {
        return Ok(None);
    }
    let coordinates = value.get("coordinates");
    match value.get("type").and_then(Value::as_str) {
        Some("Polygon") => {
            let polygon = parse_polygon(
                coordinates.ok_or_else(|| invalid("Polygon without coordinates"))?,
            )?;
            Ok(Some(MultiPolygon::new(vec![polygon])))
        }
        Some("MultiPolygon") => {
            let polygons = coordinates
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("MultiPolygon without coordinates"))?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(MultiPolygon::new(polygons)))
        }
        Some(_) => Ok(None),
        None => Err(invalid("geometry without a type")),
    }
}

fn parse_feature(value: &Value) -> Result<Option<VectorFeature>, ExportError> {
    let geometry = match value.get("geometry") {
        Some(g) => parse_geometry(g)?,
        None => None,
    };
    let properties = match value.get("properties") {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(_) => return Err(invalid("feature properties must be an object")),
    };
    Ok(geometry.map(|geometry| VectorFeature {
        geometry,
        properties,
    }))
}

/// Parse the polygonal features of a GeoJSON document.
///
/// # Errors
///
/// Returns [`ExportError::Json`] for malformed JSON and
/// [`ExportError::InvalidGeoJson`] for structurally invalid GeoJSON.
pub fn parse_features(text: &str) -> Result<ParsedLayer, ExportError> {
    let root: Value = serde_json::from_str(text)?;
    let mut layer = ParsedLayer::default();
    let mut push = |feature: Option<VectorFeature>| match feature {
        Some(f) => layer.features.push(f),
        None => layer.skipped += 1,
    };

    match root.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let features = root
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("FeatureCollection without a features array"))?;
            for feature in features {
                push(parse_feature(feature)?);
            }
        }
        Some("Feature") => push(parse_feature(&root)?),
        Some(_) => push(parse_geometry(&root)?.map(|geometry| VectorFeature {
            geometry,
            properties: Map::new(),
        })),
        None => return Err(invalid("document without a type")),
    }
    Ok(layer)
}

fn property_id(properties: &Map<String, Value>) -> Option<PatchId> {
    ["patch_id", "id"]
        .iter()
        .find_map(|key| properties.get(*key).and_then(Value::as_u64))
        .and_then(|id| PatchId::try_from(id).ok())
}

/// Turn features into patches.
///
/// A patch takes its id from a non-negative integer `patch_id` or `id`
/// property. Features with id 0 are background and are dropped; features
/// sharing an id are parts of one patch and are combined. Features without
/// an id each become a patch of their own, numbered in document order
/// after the largest explicit id. Patches come out ordered by id.
#[must_use]
pub fn into_patches(features: Vec<VectorFeature>) -> Vec<Patch> {
    let mut by_id: BTreeMap<PatchId, Vec<Polygon<f64>>> = BTreeMap::new();
    let mut anonymous = Vec::new();
    let mut background = 0usize;
    for feature in features {
        match property_id(&feature.properties) {
            Some(BACKGROUND) => background += 1,
            Some(id) => by_id.entry(id).or_default().extend(feature.geometry),
            None => anonymous.push(feature.geometry),
        }
    }
    if background > 0 {
        tracing::debug!(features = background, "dropped background features");
    }

    let first_free = by_id.keys().next_back().map_or(1, |&max| max.saturating_add(1));
    for (id, geometry) in (first_free..).zip(anonymous) {
        by_id.entry(id).or_default().extend(geometry);
    }
    by_id
        .into_iter()
        .map(|(id, polygons)| Patch {
            id,
            geometry: MultiPolygon::new(polygons),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::polygon;
    use patchgrid_pipeline::{Extent, PipelineConfig};

    use super::*;

    fn square_patch(id: PatchId) -> Patch {
        Patch {
            id,
            geometry: MultiPolygon::new(vec![polygon![
                exterior: [
                    (x: 0.0, y: 0.0),
                    (x: 4.0, y: 0.0),
                    (x: 4.0, y: 4.0),
                    (x: 0.0, y: 4.0),
                ],
                interiors: [[
                    (x: 1.0, y: 1.0),
                    (x: 1.0, y: 2.0),
                    (x: 2.0, y: 2.0),
                    (x: 2.0, y: 1.0),
                ]],
            ]]),
        }
    }

    #[test]
    fn summaries_carry_all_columns() {
        let summary = CellSummary {
            id: 7,
            left: 0.0,
            top: 300.0,
            right: 300.0,
            bottom: 0.0,
            first_patch_id: 1,
            last_patch_id: 2,
            surface: 1500.0,
            perimeter: 240.0,
            patch_count: 2,
        };
        let text = summaries_to_geojson(&[summary], Some("EPSG:2154")).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["type"], "FeatureCollection");
        assert_eq!(doc["crs"]["properties"]["name"], "EPSG:2154");
        let props = &doc["features"][0]["properties"];
        assert_eq!(props["id"], 7);
        assert_eq!(props["patch_count"], 2);
        assert_eq!(props["surface"], 1500.0);
        let ring = &doc["features"][0]["geometry"]["coordinates"][0];
        assert_eq!(ring.as_array().unwrap().len(), 5);
        assert_eq!(ring[0], ring[4]);
    }

    #[test]
    fn crs_member_is_omitted_when_unknown() {
        let cell = GridCell {
            id: 1,
            extent: Extent::new(0.0, 1.0, 1.0, 0.0),
        };
        let doc: Value = serde_json::from_str(&grid_to_geojson(&[cell], None).unwrap()).unwrap();
        assert!(doc.get("crs").is_none());
        assert_eq!(doc["features"][0]["properties"]["id"], 1);
    }

    #[test]
    fn patches_survive_a_write_read_cycle() {
        let patches = vec![square_patch(3), square_patch(8)];
        let text = patches_to_geojson(&patches, None).unwrap();
        let layer = parse_features(&text).unwrap();
        assert_eq!(layer.skipped, 0);
        assert_eq!(into_patches(layer.features), patches);
    }

    #[test]
    fn non_polygonal_features_are_skipped() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}, "properties": {}},
                {"type": "Feature", "geometry": null, "properties": null},
                {"type": "Feature", "properties": {"id": 4},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}
            ]
        }"#;
        let layer = parse_features(text).unwrap();
        assert_eq!(layer.skipped, 2);
        assert_eq!(layer.features.len(), 1);
        assert_eq!(into_patches(layer.features)[0].id, 4);
    }

    #[test]
    fn bare_geometry_is_accepted() {
        let text = r#"{"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#;
        let layer = parse_features(text).unwrap();
        assert_eq!(layer.features.len(), 1);
        assert!(layer.features[0].properties.is_empty());
    }

    fn feature(geometry: MultiPolygon<f64>, properties: &Value) -> VectorFeature {
        VectorFeature {
            geometry,
            properties: properties.as_object().unwrap().clone(),
        }
    }

    fn unit_square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
        ]])
    }

    #[test]
    fn anonymous_ids_follow_the_largest_explicit_id() {
        let features = vec![
            feature(unit_square(0.0, 0.0), &json!({"patch_id": 2})),
            feature(unit_square(5.0, 0.0), &json!({})),
            feature(unit_square(9.0, 0.0), &json!({"name": "x"})),
        ];
        let ids: Vec<PatchId> = into_patches(features).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn background_features_are_dropped() {
        let features = vec![
            feature(unit_square(0.0, 0.0), &json!({"patch_id": 0})),
            feature(unit_square(0.0, 0.0), &json!({"patch_id": 7})),
        ];
        let patches = into_patches(features);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].id, 7);

        let result = patchgrid_pipeline::process_patches(patches, PipelineConfig::new("1", 10.0))
            .unwrap();
        assert_eq!(result.patch_count, 1);
        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.summaries[0].patch_count, 1);
        assert!((result.summaries[0].surface - 1.0).abs() < 1e-9);
    }

    #[test]
    fn features_sharing_an_id_form_one_patch() {
        let features = vec![
            feature(unit_square(0.0, 0.0), &json!({"patch_id": 3})),
            feature(unit_square(1.0, 1.0), &json!({"patch_id": 3})),
        ];
        let patches = into_patches(features);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].geometry.0.len(), 2);

        let result = patchgrid_pipeline::process_patches(patches, PipelineConfig::new("1", 10.0))
            .unwrap();
        assert_eq!(result.patch_count, 1);
        assert_eq!(result.fragment_count, 1);
        assert!((result.summaries[0].surface - 2.0).abs() < 1e-9);
    }

    #[test]
    fn structural_errors_are_reported() {
        assert!(matches!(
            parse_features("{\"type\": \"Polygon\", \"coordinates\": [[[0, 0], [1, 0]]]}"),
            Err(ExportError::InvalidGeoJson(_))
        ));
        assert!(matches!(
            parse_features("{\"features\": []}"),
            Err(ExportError::InvalidGeoJson(_))
        ));
        assert!(matches!(parse_features("not json"), Err(ExportError::Json(_))));
    }
}
