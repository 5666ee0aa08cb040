//! patchgrid-export: pure table and vector serializers (sans-IO).
//!
//! Converts pipeline results into output formats (CSV with WKT cell
//! geometry, GeoJSON) and parses GeoJSON polygon layers back into
//! patches. Everything here works on strings; files are handled by
//! `patchgrid-io`.

pub mod csv;
pub mod geojson;
pub mod wkt;

pub use csv::to_csv;
pub use geojson::{
    ParsedLayer, VectorFeature, grid_to_geojson, into_patches, parse_features,
    patches_to_geojson, summaries_to_geojson,
};

use patchgrid_pipeline::CellSummary;

/// Errors from serializing or parsing.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// JSON could not be produced or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is JSON but not usable GeoJSON.
    #[error("invalid GeoJSON: {0}")]
    InvalidGeoJson(String),
}

/// Table format for per-cell summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma-separated values with a WKT `geometry` column.
    Csv,
    /// GeoJSON feature collection of cell polygons.
    GeoJson,
}

impl TableFormat {
    /// Pick a format from a file extension (case-insensitive).
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "geojson" | "json" => Some(Self::GeoJson),
            _ => None,
        }
    }

    /// Serialize `summaries` in this format.
    ///
    /// `crs` is only written by formats that can carry it.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if GeoJSON serialization fails.
    pub fn render(self, summaries: &[CellSummary], crs: Option<&str>) -> Result<String, ExportError> {
        match self {
            Self::Csv => Ok(to_csv(summaries)),
            Self::GeoJson => summaries_to_geojson(summaries, crs),
        }
    }
}
