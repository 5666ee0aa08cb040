//! Raster classification: reduce a categorical raster to a binary mask of
//! one class.
//!
//! The class value arrives as text (from a CLI flag or a config file) and
//! is parsed against the raster's own cell type, so `"3"` matches a `u8`
//! raster and `"0.5"` only ever matches a floating-point one. NoData cells
//! are never foreground.
//!
//! This is step 1 in the pipeline.

use crate::types::{BinaryRaster, Dimensions, GeoTransform, PipelineError, Raster};

/// A raster cell type that can be compared against a user-supplied class.
pub trait CellValue: Copy + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Type name used in error messages.
    const TYPE_NAME: &'static str;

    /// Parse a class value for this cell type.
    ///
    /// Returns `None` when the text does not denote a value of this type.
    fn parse_class(text: &str) -> Option<Self>;
}

macro_rules! impl_integer_cell {
    ($($t:ty),* $(,)?) => {$(
        impl CellValue for $t {
            const TYPE_NAME: &'static str = stringify!($t);

            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_precision_loss,
                clippy::cast_sign_loss,
                clippy::float_cmp
            )]
            fn parse_class(text: &str) -> Option<Self> {
                let text = text.trim();
                if let Ok(v) = text.parse::<$t>() {
                    return Some(v);
                }
                // Accept integral decimal spellings such as "3.0".
                let v = text.parse::<f64>().ok()?;
                if !v.is_finite() || v.fract() != 0.0 {
                    return None;
                }
                // Exclusive bound of 2^bits; `MAX as f64` already rounds
                // up to it for 64-bit types.
                let upper = <$t>::MAX as f64 + 1.0;
                if v < <$t>::MIN as f64 || v >= upper {
                    return None;
                }
                Some(v as $t)
            }
        }
    )*};
}

impl_integer_cell!(u8, u16, u32, u64, i8, i16, i32, i64);

macro_rules! impl_float_cell {
    ($($t:ty),* $(,)?) => {$(
        impl CellValue for $t {
            const TYPE_NAME: &'static str = stringify!($t);

            fn parse_class(text: &str) -> Option<Self> {
                text.trim().parse::<$t>().ok().filter(|v| !v.is_nan())
            }
        }
    )*};
}

impl_float_cell!(f32, f64);

/// A single-band categorical raster of any supported cell type.
///
/// Raster readers produce this; the classifier dispatches on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoricalRaster {
    /// Unsigned 8-bit cells.
    U8(Raster<u8>),
    /// Unsigned 16-bit cells.
    U16(Raster<u16>),
    /// Unsigned 32-bit cells.
    U32(Raster<u32>),
    /// Unsigned 64-bit cells.
    U64(Raster<u64>),
    /// Signed 8-bit cells.
    I8(Raster<i8>),
    /// Signed 16-bit cells.
    I16(Raster<i16>),
    /// Signed 32-bit cells.
    I32(Raster<i32>),
    /// Signed 64-bit cells.
    I64(Raster<i64>),
    /// 32-bit floating-point cells.
    F32(Raster<f32>),
    /// 64-bit floating-point cells.
    F64(Raster<f64>),
}

/// Apply `$body` to the typed raster inside any variant.
macro_rules! with_raster {
    ($value:expr, $r:ident => $body:expr) => {
        match $value {
            CategoricalRaster::U8($r) => $body,
            CategoricalRaster::U16($r) => $body,
            CategoricalRaster::U32($r) => $body,
            CategoricalRaster::U64($r) => $body,
            CategoricalRaster::I8($r) => $body,
            CategoricalRaster::I16($r) => $body,
            CategoricalRaster::I32($r) => $body,
            CategoricalRaster::I64($r) => $body,
            CategoricalRaster::F32($r) => $body,
            CategoricalRaster::F64($r) => $body,
        }
    };
}

/// Rebuild the same variant from `$body` applied to its typed raster.
macro_rules! map_raster {
    ($value:expr, $r:ident => $body:expr) => {
        match $value {
            CategoricalRaster::U8($r) => CategoricalRaster::U8($body),
            CategoricalRaster::U16($r) => CategoricalRaster::U16($body),
            CategoricalRaster::U32($r) => CategoricalRaster::U32($body),
            CategoricalRaster::U64($r) => CategoricalRaster::U64($body),
            CategoricalRaster::I8($r) => CategoricalRaster::I8($body),
            CategoricalRaster::I16($r) => CategoricalRaster::I16($body),
            CategoricalRaster::I32($r) => CategoricalRaster::I32($body),
            CategoricalRaster::I64($r) => CategoricalRaster::I64($body),
            CategoricalRaster::F32($r) => CategoricalRaster::F32($body),
            CategoricalRaster::F64($r) => CategoricalRaster::F64($body),
        }
    };
}

macro_rules! impl_from_raster {
    ($($variant:ident($t:ty)),* $(,)?) => {$(
        impl From<Raster<$t>> for CategoricalRaster {
            fn from(raster: Raster<$t>) -> Self {
                Self::$variant(raster)
            }
        }
    )*};
}

impl_from_raster!(
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
);

impl CategoricalRaster {
    /// Raster dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        with_raster!(self, r => r.dimensions())
    }

    /// Georeferencing.
    #[must_use]
    pub fn transform(&self) -> &GeoTransform {
        with_raster!(self, r => r.transform())
    }

    /// Coordinate reference system, if known.
    #[must_use]
    pub fn crs(&self) -> Option<&str> {
        with_raster!(self, r => r.crs())
    }

    /// Replace the coordinate reference system.
    #[must_use]
    pub fn with_crs(self, crs: Option<String>) -> Self {
        map_raster!(self, r => r.with_crs(crs))
    }

    /// Name of the cell type (`"u8"`, `"f32"`, ...).
    #[must_use]
    pub const fn cell_type(&self) -> &'static str {
        match self {
            Self::U8(_) => u8::TYPE_NAME,
            Self::U16(_) => u16::TYPE_NAME,
            Self::U32(_) => u32::TYPE_NAME,
            Self::U64(_) => u64::TYPE_NAME,
            Self::I8(_) => i8::TYPE_NAME,
            Self::I16(_) => i16::TYPE_NAME,
            Self::I32(_) => i32::TYPE_NAME,
            Self::I64(_) => i64::TYPE_NAME,
            Self::F32(_) => f32::TYPE_NAME,
            Self::F64(_) => f64::TYPE_NAME,
        }
    }

    /// Verify that `class_value` can be compared with this raster's cells.
    ///
    /// A value that parses but does not occur in the raster is accepted:
    /// it simply yields an empty mask.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidClassValue`] if the text does not
    /// denote a value of the raster's cell type.
    pub fn check_class_value(&self, class_value: &str) -> Result<(), PipelineError> {
        with_raster!(self, r => parse_for(r, class_value).map(|_| ()))
    }
}

/// Parse `text` as a class value for `raster`'s cell type.
fn parse_for<T: CellValue>(_raster: &Raster<T>, text: &str) -> Result<T, PipelineError> {
    T::parse_class(text).ok_or_else(|| PipelineError::InvalidClassValue {
        value: text.to_owned(),
        cell_type: T::TYPE_NAME.to_owned(),
    })
}

/// Classify a typed raster against an already-parsed class value.
///
/// Cells equal to the raster's NoData sentinel are background even when the
/// sentinel equals `class`.
#[must_use = "returns the binary raster"]
pub fn classify_typed<T: CellValue>(raster: &Raster<T>, class: T) -> BinaryRaster {
    let nodata = raster.nodata();
    let cells = raster
        .cells()
        .iter()
        .map(|&v| u8::from(v == class && nodata != Some(v)))
        .collect();
    raster.derive(cells)
}

/// Classify a categorical raster against a textual class value.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidClassValue`] if `class_value` cannot be
/// parsed as the raster's cell type.
pub fn classify(raster: &CategoricalRaster, class_value: &str) -> Result<BinaryRaster, PipelineError> {
    with_raster!(raster, r => {
        let class = parse_for(r, class_value)?;
        Ok(classify_typed(r, class))
    })
}

/// Number of foreground cells in a binary raster.
#[must_use]
pub fn foreground_count(mask: &BinaryRaster) -> usize {
    mask.cells().iter().filter(|&&v| v != 0).count()
}
