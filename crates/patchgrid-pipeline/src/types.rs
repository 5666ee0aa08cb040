//! Shared types for the patchgrid landscape metrics pipeline.

use std::fmt;

use geo::{Coord, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Identifier of a connected patch. `0` is reserved for background.
pub type PatchId = u32;

/// Identifier of a grid cell, sequential from 1 in row-major order.
pub type CellId = u64;

/// Background label value in a labeled raster.
pub const BACKGROUND: PatchId = 0;

/// Raster dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl Dimensions {
    /// Total cell count (`width * height`).
    #[must_use]
    pub const fn cell_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Affine placement of a north-up raster in its coordinate reference system.
///
/// Row 0 is the northernmost row; rows grow southward. Rotated rasters are
/// not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the left edge of column 0.
    pub left: f64,
    /// Y coordinate of the top edge of row 0.
    pub top: f64,
    /// Cell size along X (positive).
    pub cell_width: f64,
    /// Cell size along Y (positive, measured southward).
    pub cell_height: f64,
}

impl GeoTransform {
    /// Create a transform from the top-left corner and cell sizes.
    #[must_use]
    pub const fn new(left: f64, top: f64, cell_width: f64, cell_height: f64) -> Self {
        Self {
            left,
            top,
            cell_width,
            cell_height,
        }
    }

    /// Unit cells with the top-left corner at the origin.
    ///
    /// Useful for rasters without georeferencing, where Y decreases as
    /// rows increase.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// World coordinate of the cell-grid vertex at column `col`, row `row`.
    ///
    /// Vertex `(0, 0)` is the top-left corner of the raster and vertex
    /// `(width, height)` its bottom-right corner.
    #[must_use]
    pub fn vertex(&self, col: u32, row: u32) -> Coord<f64> {
        Coord {
            x: f64::from(col).mul_add(self.cell_width, self.left),
            y: f64::from(row).mul_add(-self.cell_height, self.top),
        }
    }

    /// Area of a single raster cell.
    #[must_use]
    pub fn cell_area(&self) -> f64 {
        self.cell_width * self.cell_height
    }

    /// Full extent covered by a raster of the given dimensions.
    #[must_use]
    pub fn extent(&self, dimensions: Dimensions) -> Extent {
        let bottom_right = self.vertex(dimensions.width, dimensions.height);
        Extent::new(self.left, self.top, bottom_right.x, bottom_right.y)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Axis-aligned bounds in the working CRS, named the way the output table
/// names them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Minimum X.
    pub left: f64,
    /// Maximum Y.
    pub top: f64,
    /// Maximum X.
    pub right: f64,
    /// Minimum Y.
    pub bottom: f64,
}

impl Extent {
    /// Create an extent from its four edges.
    #[must_use]
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Horizontal size.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Vertical size.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Returns `true` when the extent encloses no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Convert to a `geo::Rect`.
    #[must_use]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.left,
                y: self.bottom,
            },
            Coord {
                x: self.right,
                y: self.top,
            },
        )
    }

    /// Convert to a closed `geo::Polygon`.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }
}

impl From<Rect<f64>> for Extent {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.max().y, rect.max().x, rect.min().y)
    }
}

/// A single-band raster with georeferencing.
///
/// Cells are stored row-major starting at the top-left cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    dimensions: Dimensions,
    transform: GeoTransform,
    crs: Option<String>,
    nodata: Option<T>,
    cells: Vec<T>,
}

impl<T: Copy> Raster<T> {
    /// Create a raster from row-major cell values.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RasterShape`] if `cells.len()` does not
    /// equal `width * height`.
    pub fn new(
        dimensions: Dimensions,
        transform: GeoTransform,
        cells: Vec<T>,
    ) -> Result<Self, PipelineError> {
        if cells.len() != dimensions.cell_count() {
            return Err(PipelineError::RasterShape {
                width: dimensions.width,
                height: dimensions.height,
                cells: cells.len(),
            });
        }
        Ok(Self {
            dimensions,
            transform,
            crs: None,
            nodata: None,
            cells,
        })
    }

    /// Create a raster by evaluating `f(row, col)` for every cell.
    #[must_use]
    pub fn from_fn(
        dimensions: Dimensions,
        transform: GeoTransform,
        mut f: impl FnMut(u32, u32) -> T,
    ) -> Self {
        let mut cells = Vec::with_capacity(dimensions.cell_count());
        for row in 0..dimensions.height {
            for col in 0..dimensions.width {
                cells.push(f(row, col));
            }
        }
        Self {
            dimensions,
            transform,
            crs: None,
            nodata: None,
            cells,
        }
    }

    /// Attach a NoData sentinel.
    #[must_use]
    pub fn with_nodata(mut self, nodata: Option<T>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Attach a coordinate reference system description (WKT, PROJ or
    /// `EPSG:` code; carried through untouched).
    #[must_use]
    pub fn with_crs(mut self, crs: Option<String>) -> Self {
        self.crs = crs;
        self
    }

    /// Raster dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Georeferencing.
    #[must_use]
    pub const fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Coordinate reference system, if known.
    #[must_use]
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    /// NoData sentinel, if any.
    #[must_use]
    pub const fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Row-major cell values.
    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Value at `(row, col)`, or `None` outside the raster.
    #[must_use]
    pub fn get(&self, row: u32, col: u32) -> Option<T> {
        if row >= self.dimensions.height || col >= self.dimensions.width {
            return None;
        }
        self.cells
            .get(row as usize * self.dimensions.width as usize + col as usize)
            .copied()
    }

    /// Build a raster with the same placement from new row-major cells.
    ///
    /// The NoData sentinel is not carried over.
    pub(crate) fn derive<U>(&self, cells: Vec<U>) -> Raster<U> {
        debug_assert_eq!(cells.len(), self.cells.len());
        Raster {
            dimensions: self.dimensions,
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
            cells,
        }
    }

    /// Full spatial extent of the raster.
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.transform.extent(self.dimensions)
    }
}

/// Binary classification raster: `1` for the target class, `0` otherwise.
pub type BinaryRaster = Raster<u8>;

/// Labeled raster: [`BACKGROUND`] or a positive [`PatchId`] per cell.
pub type LabelRaster = Raster<PatchId>;

/// Polygon footprint of one patch.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Patch identifier (label value).
    pub id: PatchId,
    /// All polygons of the patch. Diagonally touching parts are separate
    /// polygons of the same multi-polygon.
    pub geometry: MultiPolygon<f64>,
}

/// One rectangle of the analysis grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Sequential cell identifier.
    pub id: CellId,
    /// Cell bounds.
    pub extent: Extent,
}

/// Intersection of one patch with one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFragment {
    /// Owning grid cell.
    pub cell_id: CellId,
    /// Source patch.
    pub patch_id: PatchId,
    /// Clipped geometry (never empty).
    pub geometry: MultiPolygon<f64>,
}

/// Fragment with its measured area and perimeter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuredFragment {
    /// Owning grid cell.
    pub cell_id: CellId,
    /// Source patch.
    pub patch_id: PatchId,
    /// Planar area, holes subtracted.
    pub area: f64,
    /// Length of all rings, holes included.
    pub perimeter: f64,
}

/// One output record: the metrics of a single non-empty grid cell.
///
/// Field names match the output table columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellSummary {
    /// Grid cell identifier.
    pub id: CellId,
    /// Cell minimum X.
    pub left: f64,
    /// Cell maximum Y.
    pub top: f64,
    /// Cell maximum X.
    pub right: f64,
    /// Cell minimum Y.
    pub bottom: f64,
    /// Patch id of the first fragment produced for this cell.
    pub first_patch_id: PatchId,
    /// Patch id of the last fragment produced for this cell.
    pub last_patch_id: PatchId,
    /// Total patch area inside the cell.
    pub surface: f64,
    /// Total perimeter of the patch fragments inside the cell.
    pub perimeter: f64,
    /// Number of distinct patches intersecting the cell.
    pub patch_count: u32,
}

impl CellSummary {
    /// Bounds of the summarized cell.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        Extent::new(self.left, self.top, self.right, self.bottom)
    }
}

/// How connected-component labeling is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelingMode {
    /// Single pass over the whole raster.
    Sequential,
    /// Label horizontal bands of `rows` rows in parallel, then reconcile
    /// the seams between bands.
    Banded {
        /// Rows per band (at least 1).
        rows: u32,
    },
    /// Choose band height from the raster size and thread count.
    #[default]
    Auto,
}

/// Configuration for the landscape metrics pipeline.
///
/// Call [`validate`](Self::validate) (done by
/// [`Pipeline::new`](crate::Pipeline::new)) to reject invalid spacing
/// before any stage runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Class value to extract, as entered by the user. Parsed against the
    /// input raster's cell type by the classifier.
    pub class_value: String,

    /// Grid spacing in CRS units, used for both axes.
    pub spacing: f64,

    /// Labeling schedule.
    pub labeling: LabelingMode,

    /// Whether the overlay stage spreads grid cells across the thread pool.
    pub parallel_overlay: bool,
}

impl PipelineConfig {
    /// Default class value.
    pub const DEFAULT_CLASS_VALUE: &str = "1";

    /// Default grid spacing (meters in a projected CRS).
    pub const DEFAULT_SPACING: f64 = 300.0;

    /// Create a configuration for `class_value` and `spacing` with default
    /// scheduling.
    #[must_use]
    pub fn new(class_value: impl Into<String>, spacing: f64) -> Self {
        Self {
            class_value: class_value.into(),
            spacing,
            ..Self::default()
        }
    }

    /// Check the invariants that do not depend on the input raster.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSpacing`] if `spacing` is not a
    /// positive finite number, and [`PipelineError::InvalidConfig`] for a
    /// zero band height.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(PipelineError::InvalidSpacing(self.spacing));
        }
        if self.labeling == (LabelingMode::Banded { rows: 0 }) {
            return Err(PipelineError::InvalidConfig(
                "labeling band height must be at least 1 row".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            class_value: Self::DEFAULT_CLASS_VALUE.to_owned(),
            spacing: Self::DEFAULT_SPACING,
            labeling: LabelingMode::default(),
            parallel_overlay: true,
        }
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageName {
    /// Raster classification.
    Classify,
    /// Connected-component labeling.
    Label,
    /// Raster-to-polygon conversion.
    Vectorize,
    /// Geometry repair.
    Sanitize,
    /// Analysis grid generation.
    Grid,
    /// Patch/grid intersection.
    Overlay,
    /// Fragment area and perimeter.
    Measure,
    /// Per-cell reduction.
    Aggregate,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [Self; 8] = [
        Self::Classify,
        Self::Label,
        Self::Vectorize,
        Self::Sanitize,
        Self::Grid,
        Self::Overlay,
        Self::Measure,
        Self::Aggregate,
    ];

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Label => "label",
            Self::Vectorize => "vectorize",
            Self::Sanitize => "sanitize",
            Self::Grid => "grid",
            Self::Overlay => "overlay",
            Self::Measure => "measure",
            Self::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Number of patches found by the labeler (or supplied as polygons).
    pub patch_count: usize,
    /// Patches removed by the sanitizer because no area survived repair.
    pub dropped_patches: Vec<PatchId>,
    /// Number of generated grid cells, including cells with no patches.
    pub grid_cell_count: usize,
    /// Number of non-empty overlay fragments.
    pub fragment_count: usize,
    /// One record per grid cell that intersects at least one patch,
    /// ordered by cell id.
    pub summaries: Vec<CellSummary>,
}

impl PipelineResult {
    /// Returns `true` when no grid cell intersected any patch.
    ///
    /// This is a normal outcome (for example when the class value does not
    /// occur in the raster), not an error.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

/// Errors that can abort the pipeline.
///
/// Recoverable conditions (patches dropped by the sanitizer, empty
/// results) are reported through [`PipelineResult`] instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The class value cannot be compared with the raster's cells.
    #[error("invalid class value {value:?} for {cell_type} raster")]
    InvalidClassValue {
        /// Value as supplied by the caller.
        value: String,
        /// Raster cell type name (e.g. `u8`, `f32`).
        cell_type: String,
    },

    /// Grid spacing is not a positive finite number.
    #[error("invalid grid spacing {0}: must be a positive finite number")]
    InvalidSpacing(f64),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Cell buffer length does not match raster dimensions.
    #[error("raster of {width}x{height} cells cannot hold {cells} values")]
    RasterShape {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// Supplied cell count.
        cells: usize,
    },

    /// A stage could not produce well-formed output.
    #[error("{stage} stage failed: {reason}")]
    Stage {
        /// Failing stage.
        stage: StageName,
        /// Human-readable cause.
        reason: String,
    },
}

/// Serde-compatible proxy for `PipelineError`.
///
/// Keeps the wire format independent of the `Display` strings.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    InvalidClassValue { value: String, cell_type: String },
    InvalidSpacing(f64),
    InvalidConfig(String),
    RasterShape { width: u32, height: u32, cells: usize },
    Stage { stage: StageName, reason: String },
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self.clone() {
            Self::InvalidClassValue { value, cell_type } => {
                PipelineErrorProxy::InvalidClassValue { value, cell_type }
            }
            Self::InvalidSpacing(s) => PipelineErrorProxy::InvalidSpacing(s),
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s),
            Self::RasterShape {
                width,
                height,
                cells,
            } => PipelineErrorProxy::RasterShape {
                width,
                height,
                cells,
            },
            Self::Stage { stage, reason } => PipelineErrorProxy::Stage { stage, reason },
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PipelineErrorProxy::deserialize(deserializer)? {
            PipelineErrorProxy::InvalidClassValue { value, cell_type } => {
                Self::InvalidClassValue { value, cell_type }
            }
            PipelineErrorProxy::InvalidSpacing(s) => Self::InvalidSpacing(s),
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::RasterShape {
                width,
                height,
                cells,
            } => Self::RasterShape {
                width,
                height,
                cells,
            },
            PipelineErrorProxy::Stage { stage, reason } => Self::Stage { stage, reason },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn vertex_maps_rows_southward() {
        let t = GeoTransform::new(100.0, 500.0, 10.0, 5.0);
        let v = t.vertex(2, 3);
        assert!((v.x - 120.0).abs() < f64::EPSILON);
        assert!((v.y - 485.0).abs() < f64::EPSILON);
    }

    #[test]
    fn raster_extent_covers_all_cells() {
        let t = GeoTransform::new(0.0, 40.0, 10.0, 10.0);
        let raster = Raster::new(
            Dimensions {
                width: 3,
                height: 4,
            },
            t,
            vec![0u8; 12],
        )
        .unwrap();
        assert_eq!(raster.extent(), Extent::new(0.0, 40.0, 30.0, 0.0));
    }

    #[test]
    fn raster_new_rejects_wrong_cell_count() {
        let result = Raster::new(
            Dimensions {
                width: 3,
                height: 3,
            },
            GeoTransform::identity(),
            vec![0u8; 8],
        );
        assert!(matches!(
            result,
            Err(PipelineError::RasterShape { cells: 8, .. })
        ));
    }

    #[test]
    fn raster_get_is_row_major() {
        let raster = Raster::from_fn(
            Dimensions {
                width: 3,
                height: 2,
            },
            GeoTransform::identity(),
            |row, col| row * 10 + col,
        );
        assert_eq!(raster.get(1, 2), Some(12));
        assert_eq!(raster.get(2, 0), None);
        assert_eq!(raster.get(0, 3), None);
    }

    #[test]
    fn extent_rect_round_trip() {
        let e = Extent::new(1.0, 9.0, 4.0, 2.0);
        assert_eq!(Extent::from(e.to_rect()), e);
        assert!((e.width() - 3.0).abs() < f64::EPSILON);
        assert!((e.height() - 7.0).abs() < f64::EPSILON);
        assert!(!e.is_empty());
        assert!(Extent::new(1.0, 1.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.class_value, "1");
        assert!((config.spacing - 300.0).abs() < f64::EPSILON);
        assert_eq!(config.labeling, LabelingMode::Auto);
        assert!(config.parallel_overlay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_non_positive_spacing() {
        for spacing in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let config = PipelineConfig::new("1", spacing);
            assert!(matches!(
                config.validate(),
                Err(PipelineError::InvalidSpacing(_))
            ));
        }
    }

    #[test]
    fn config_rejects_zero_band_height() {
        let config = PipelineConfig {
            labeling: LabelingMode::Banded { rows: 0 },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        let config: PipelineConfig = serde_json::from_str(r#"{"spacing": 50.0}"#).unwrap();
        assert!((config.spacing - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.class_value, "1");
    }

    #[test]
    fn error_display_names_stage() {
        let err = PipelineError::Stage {
            stage: StageName::Label,
            reason: "too many patches".to_owned(),
        };
        assert_eq!(err.to_string(), "label stage failed: too many patches");
    }

    #[test]
    fn error_invalid_class_value_display() {
        let err = PipelineError::InvalidClassValue {
            value: "abc".to_owned(),
            cell_type: "u8".to_owned(),
        };
        assert_eq!(err.to_string(), "invalid class value \"abc\" for u8 raster");
    }

    #[test]
    fn pipeline_error_serde_round_trip() {
        let err = PipelineError::Stage {
            stage: StageName::Overlay,
            reason: "boom".to_owned(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
