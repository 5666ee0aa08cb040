//! Integration test: run a synthetic landscape through the full pipeline
//! and export the summaries to CSV and GeoJSON.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use patchgrid_export::{TableFormat, into_patches, parse_features, patches_to_geojson};
use patchgrid_pipeline::{Dimensions, GeoTransform, PipelineConfig, Raster};

/// 12x8 landscape of 25 m cells with a few forest (class 3) blobs.
fn landscape() -> Raster<u16> {
    Raster::from_fn(
        Dimensions {
            width: 12,
            height: 8,
        },
        GeoTransform::new(500_000.0, 6_200_000.0, 25.0, 25.0),
        |row, col| {
            let blob_a = col < 4 && row < 3;
            let blob_b = (6..10).contains(&col) && (2..7).contains(&row) && !(col == 8 && row == 4);
            let blob_c = col == 11 && row == 7;
            if blob_a || blob_b || blob_c { 3 } else { 1 }
        },
    )
}

#[test]
fn landscape_pipeline_to_tables() {
    let config = PipelineConfig::new("3", 100.0);
    let result = patchgrid_pipeline::process(landscape().into(), config.clone())
        .expect("pipeline should succeed");
    eprintln!(
        "{} patches, {} grid cells, {} rows",
        result.patch_count,
        result.grid_cell_count,
        result.summaries.len()
    );
    assert_eq!(result.patch_count, 3);
    let total: f64 = result.summaries.iter().map(|s| s.surface).sum();
    assert!((total - 32.0 * 625.0).abs() < 1e-6);

    let csv = TableFormat::Csv.render(&result.summaries, None).unwrap();
    assert_eq!(csv.lines().count(), result.summaries.len() + 1);
    assert!(csv.lines().skip(1).all(|l| l.ends_with("))\"")));

    let json = TableFormat::GeoJson
        .render(&result.summaries, Some("EPSG:32631"))
        .unwrap();
    let layer = parse_features(&json).unwrap();
    assert_eq!(layer.features.len(), result.summaries.len());
    for (feature, summary) in layer.features.iter().zip(&result.summaries) {
        assert_eq!(feature.properties["id"], summary.id);
        assert_eq!(feature.properties["patch_count"], summary.patch_count);
    }
}

#[test]
fn patches_written_as_geojson_reproduce_the_table() {
    let config = PipelineConfig::new("3", 100.0);
    let patches = patchgrid_pipeline::Pipeline::new(landscape().into(), config.clone())
        .unwrap()
        .classify()
        .unwrap()
        .label()
        .unwrap()
        .vectorize()
        .sanitize()
        .patches()
        .to_vec();

    let text = patches_to_geojson(&patches, None).unwrap();
    let reread = into_patches(parse_features(&text).unwrap().features);
    let from_vectors = patchgrid_pipeline::process_patches(reread, config.clone()).unwrap();
    let from_raster = patchgrid_pipeline::process(landscape().into(), config).unwrap();
    assert_eq!(from_vectors.summaries, from_raster.summaries);
}
