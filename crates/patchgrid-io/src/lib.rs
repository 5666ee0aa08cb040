//! patchgrid-io: filesystem I/O for the patchgrid pipeline.
//!
//! Reads categorical rasters (GeoTIFF, ESRI ASCII grid) and GeoJSON patch
//! layers, and writes rasters, vector layers and summary tables. Every
//! write goes through a temporary file so an interrupted run never
//! leaves a truncated output behind.

pub mod ascii_grid;
pub mod atomic;
pub mod geotiff;

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

use patchgrid_export::{ExportError, TableFormat, VectorFeature};
use patchgrid_pipeline::{CategoricalRaster, CellSummary, Patch, Raster};
use tiff::encoder::TiffValue;

pub use geotiff::{GeoTiffError, GeoTiffSample};

/// Errors from reading or writing files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The file could not be opened, read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not a usable GeoTIFF.
    #[error("{}: {source}", path.display())]
    Tiff {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: GeoTiffError,
    },

    /// The file format is unknown or its contents are malformed.
    #[error("{}: {reason}", path.display())]
    Format {
        /// File involved.
        path: PathBuf,
        /// What is wrong.
        reason: String,
    },

    /// Serialization to or from GeoJSON failed.
    #[error("{}: {source}", path.display())]
    Export {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: ExportError,
    },
}

impl IoError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        |source| Self::Io {
            path: path.to_owned(),
            source,
        }
    }

    fn tiff(path: &Path) -> impl FnOnce(GeoTiffError) -> Self + '_ {
        |source| Self::Tiff {
            path: path.to_owned(),
            source,
        }
    }

    fn export(path: &Path) -> impl FnOnce(ExportError) -> Self + '_ {
        |source| Self::Export {
            path: path.to_owned(),
            source,
        }
    }

    fn format(path: &Path, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Read a categorical raster, choosing the format by extension.
///
/// `.tif`/`.tiff` files are decoded as GeoTIFF. `.asc` files are read as
/// ESRI ASCII grids; a `.prj` file next to the grid, if present, becomes
/// the raster's CRS.
///
/// # Errors
///
/// Returns [`IoError::Format`] for other extensions or malformed grids,
/// [`IoError::Tiff`] for unreadable GeoTIFFs and [`IoError::Io`] when the
/// file cannot be read.
pub fn read_raster(path: &Path) -> Result<CategoricalRaster, IoError> {
    let raster = match extension(path).as_str() {
        "tif" | "tiff" => {
            let file = File::open(path).map_err(IoError::io(path))?;
            geotiff::decode(BufReader::new(file)).map_err(IoError::tiff(path))?
        }
        "asc" => {
            let text = std::fs::read_to_string(path).map_err(IoError::io(path))?;
            let raster = ascii_grid::parse(&text).map_err(|reason| IoError::format(path, reason))?;
            let prj = path.with_extension("prj");
            match std::fs::read_to_string(&prj) {
                Ok(wkt) if !wkt.trim().is_empty() => raster.with_crs(Some(wkt.trim().to_owned())),
                Ok(_) => raster,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => raster,
                Err(e) => return Err(IoError::io(&prj)(e)),
            }
        }
        other => {
            return Err(IoError::format(
                path,
                format!("unsupported raster extension {other:?} (expected tif, tiff or asc)"),
            ));
        }
    };
    tracing::debug!(
        path = %path.display(),
        cell_type = raster.cell_type(),
        width = raster.dimensions().width,
        height = raster.dimensions().height,
        "read raster",
    );
    Ok(raster)
}

/// Write a raster as a single-band GeoTIFF.
///
/// # Errors
///
/// Returns [`IoError::Tiff`] if encoding fails and [`IoError::Io`] if the
/// file cannot be written.
pub fn write_raster<T>(raster: &Raster<T>, path: &Path) -> Result<(), IoError>
where
    T: GeoTiffSample,
    [T]: TiffValue,
{
    let mut buf = Cursor::new(Vec::new());
    geotiff::encode(raster, &mut buf).map_err(IoError::tiff(path))?;
    atomic::write(path, &buf.into_inner()).map_err(IoError::io(path))
}

/// Read the polygonal features of a GeoJSON file.
///
/// Features without a polygonal geometry are skipped with a warning.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the file cannot be read and
/// [`IoError::Export`] if it is not a GeoJSON feature collection.
pub fn read_vectors(path: &Path) -> Result<Vec<VectorFeature>, IoError> {
    let text = std::fs::read_to_string(path).map_err(IoError::io(path))?;
    let layer = patchgrid_export::parse_features(&text).map_err(IoError::export(path))?;
    if layer.skipped > 0 {
        tracing::warn!(
            path = %path.display(),
            skipped = layer.skipped,
            "skipped features without polygon geometry",
        );
    }
    Ok(layer.features)
}

/// Read a GeoJSON polygon layer as patches.
///
/// # Errors
///
/// Same as [`read_vectors`].
pub fn read_patches(path: &Path) -> Result<Vec<Patch>, IoError> {
    read_vectors(path).map(patchgrid_export::into_patches)
}

/// Write a summary table, choosing the format by extension.
///
/// # Errors
///
/// Returns [`IoError::Format`] for extensions other than `csv`, `geojson`
/// and `json`, [`IoError::Export`] if serialization fails and
/// [`IoError::Io`] if the file cannot be written.
pub fn write_table(summaries: &[CellSummary], path: &Path, crs: Option<&str>) -> Result<(), IoError> {
    let ext = extension(path);
    let format = TableFormat::from_extension(&ext).ok_or_else(|| {
        IoError::format(
            path,
            format!("unsupported table extension {ext:?} (expected csv, geojson or json)"),
        )
    })?;
    let text = format.render(summaries, crs).map_err(IoError::export(path))?;
    atomic::write(path, text.as_bytes()).map_err(IoError::io(path))?;
    tracing::info!(path = %path.display(), rows = summaries.len(), "wrote table");
    Ok(())
}

/// Write text to a file.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the file cannot be written.
pub fn write_text(path: &Path, contents: &str) -> Result<(), IoError> {
    atomic::write(path, contents.as_bytes()).map_err(IoError::io(path))
}
