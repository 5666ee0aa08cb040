//! Single-band GeoTIFF codec.
//!
//! Georeferencing is read from and written to the GeoTIFF
//! `ModelPixelScale` and `ModelTiepoint` tags; rotated rasters
//! (`ModelTransformation`) are rejected. The CRS is taken from the EPSG
//! code in the `GeoKeyDirectory` and NoData from GDAL's ASCII tag.

use std::fmt::Display;
use std::io::{Read, Seek, Write};

use patchgrid_pipeline::{CategoricalRaster, CellValue, Dimensions, GeoTransform, Raster};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;

// GeoTIFF tags
const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const MODEL_TRANSFORMATION: Tag = Tag::ModelTransformationTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

// GeoKey ids and values
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u32 = 32767;

/// Errors from GeoTIFF decoding and encoding.
#[derive(Debug, thiserror::Error)]
pub enum GeoTiffError {
    /// The TIFF container could not be read or written.
    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),

    /// The file is a valid TIFF that this codec does not handle.
    #[error("{0}")]
    Unsupported(String),
}

/// Cell types that can be written as GeoTIFF samples.
pub trait GeoTiffSample: CellValue + Display {
    /// Matching single-band TIFF color type.
    type Color: ColorType<Inner = Self>;
}

impl GeoTiffSample for u8 {
    type Color = colortype::Gray8;
}

impl GeoTiffSample for u16 {
    type Color = colortype::Gray16;
}

impl GeoTiffSample for u32 {
    type Color = colortype::Gray32;
}

impl GeoTiffSample for f32 {
    type Color = colortype::Gray32Float;
}

impl GeoTiffSample for f64 {
    type Color = colortype::Gray64Float;
}

// ───────────────────────────── Decoding ─────────────────────────────

fn find_f64s<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<Vec<f64>>, GeoTiffError> {
    Ok(decoder
        .find_tag(tag)?
        .map(|value| value.into_f64_vec())
        .transpose()?)
}

/// What the `GeoKeyDirectory` says about the raster.
#[derive(Debug, Default)]
struct GeoKeys {
    crs: Option<String>,
    pixel_is_point: bool,
}

fn read_geo_keys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoKeys, GeoTiffError> {
    let Some(value) = decoder.find_tag(GEO_KEY_DIRECTORY)? else {
        return Ok(GeoKeys::default());
    };
    let keys = value.into_u32_vec()?;
    let mut geo_keys = GeoKeys::default();
    // Header of four shorts, then (key id, location, count, value) entries.
    for entry in keys.get(4..).unwrap_or_default().chunks_exact(4) {
        // Location 0 means the value is stored inline.
        if entry[1] != 0 {
            continue;
        }
        let key = entry[0];
        if key == u32::from(GT_RASTER_TYPE_GEO_KEY) {
            geo_keys.pixel_is_point = entry[3] == u32::from(RASTER_PIXEL_IS_POINT);
        } else if (key == u32::from(PROJECTED_CS_TYPE_GEO_KEY)
            || key == u32::from(GEOGRAPHIC_TYPE_GEO_KEY))
            && entry[3] != USER_DEFINED
            && geo_keys.crs.is_none()
        {
            geo_keys.crs = Some(format!("EPSG:{}", entry[3]));
        }
    }
    Ok(geo_keys)
}

fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    pixel_is_point: bool,
) -> Result<GeoTransform, GeoTiffError> {
    let scale = find_f64s(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64s(decoder, MODEL_TIEPOINT)?;
    match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            let (cell_width, cell_height) = (s[0].abs(), s[1].abs());
            // Tie point maps raster (i, j) to world (x, y). Point-registered
            // rasters tie the cell center, so the corner is half a cell out.
            let offset = if pixel_is_point { 0.5 } else { 0.0 };
            let left = (t[0] + offset).mul_add(-cell_width, t[3]);
            let top = (t[1] + offset).mul_add(cell_height, t[4]);
            Ok(GeoTransform::new(left, top, cell_width, cell_height))
        }
        _ => {
            if decoder.find_tag(MODEL_TRANSFORMATION)?.is_some() {
                return Err(GeoTiffError::Unsupported(
                    "rotated or sheared rasters are not supported".to_owned(),
                ));
            }
            tracing::warn!("GeoTIFF has no georeferencing, using unit cells");
            Ok(GeoTransform::identity())
        }
    }
}

fn typed<T: CellValue>(
    dimensions: Dimensions,
    transform: GeoTransform,
    cells: Vec<T>,
    nodata: Option<&str>,
    crs: Option<String>,
) -> Result<CategoricalRaster, GeoTiffError>
where
    CategoricalRaster: From<Raster<T>>,
{
    let raster = Raster::new(dimensions, transform, cells)
        .map_err(|e| GeoTiffError::Unsupported(e.to_string()))?;
    Ok(raster
        .with_nodata(nodata.and_then(T::parse_class))
        .with_crs(crs)
        .into())
}

/// Decode a single-band GeoTIFF.
///
/// Palette images are read as their index values.
///
/// # Errors
///
/// Returns [`GeoTiffError::Tiff`] for unreadable files and
/// [`GeoTiffError::Unsupported`] for multi-band or rotated rasters.
pub fn decode<R: Read + Seek>(reader: R) -> Result<CategoricalRaster, GeoTiffError> {
    let mut decoder = Decoder::new(reader)?;
    match decoder.colortype()? {
        tiff::ColorType::Gray(_) | tiff::ColorType::Palette(_) => {}
        other => {
            return Err(GeoTiffError::Unsupported(format!(
                "expected a single-band raster, found {other:?}"
            )));
        }
    }
    let (width, height) = decoder.dimensions()?;
    let dimensions = Dimensions { width, height };
    let GeoKeys {
        crs,
        pixel_is_point,
    } = read_geo_keys(&mut decoder)?;
    let transform = read_transform(&mut decoder, pixel_is_point)?;
    let nodata = decoder
        .find_tag(GDAL_NODATA)?
        .map(|value| value.into_string())
        .transpose()?;
    let nodata = nodata.as_deref().map(|s| s.trim_end_matches('\0'));

    tracing::debug!(width, height, crs = ?crs, nodata = ?nodata, "decoding GeoTIFF");

    #[allow(unreachable_patterns)]
    match decoder.read_image()? {
        DecodingResult::U8(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::U16(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::U32(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::U64(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::I8(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::I16(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::I32(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::I64(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::F32(v) => typed(dimensions, transform, v, nodata, crs),
        DecodingResult::F64(v) => typed(dimensions, transform, v, nodata, crs),
        _ => Err(GeoTiffError::Unsupported(
            "unsupported sample format".to_owned(),
        )),
    }
}

// ───────────────────────────── Encoding ─────────────────────────────

fn epsg_code(crs: &str) -> Option<u16> {
    let (authority, code) = crs.split_once(':')?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    code.trim().parse().ok()
}

fn geo_key_directory(crs: Option<&str>) -> Vec<u16> {
    let mut entries: Vec<[u16; 4]> = Vec::new();
    let code = crs.and_then(epsg_code);
    let geographic = code.is_some_and(|c| (4000..5000).contains(&c));
    if code.is_some() {
        let model = if geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        };
        entries.push([GT_MODEL_TYPE_GEO_KEY, 0, 1, model]);
    }
    entries.push([GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    if let Some(code) = code {
        let key = if geographic {
            GEOGRAPHIC_TYPE_GEO_KEY
        } else {
            PROJECTED_CS_TYPE_GEO_KEY
        };
        entries.push([key, 0, 1, code]);
    }

    let count = u16::try_from(entries.len()).unwrap_or(u16::MAX);
    let mut keys = vec![1, 1, 0, count];
    keys.extend(entries.into_iter().flatten());
    keys
}

fn write_geo_tags<T, W, K>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    raster: &Raster<T>,
) -> Result<(), GeoTiffError>
where
    T: GeoTiffSample,
    W: Write + Seek,
    K: TiffKind,
{
    let t = raster.transform();
    let pixel_scale = [t.cell_width, t.cell_height, 0.0];
    dir.write_tag(MODEL_PIXEL_SCALE, pixel_scale.as_slice())?;
    let tiepoint = [0.0, 0.0, 0.0, t.left, t.top, 0.0];
    dir.write_tag(MODEL_TIEPOINT, tiepoint.as_slice())?;
    let keys = geo_key_directory(raster.crs());
    dir.write_tag(GEO_KEY_DIRECTORY, keys.as_slice())?;
    if let Some(nodata) = raster.nodata() {
        dir.write_tag(GDAL_NODATA, nodata.to_string().as_str())?;
    }
    Ok(())
}

/// Encode a raster as an uncompressed single-band GeoTIFF.
///
/// # Errors
///
/// Returns [`GeoTiffError::Tiff`] if the encoder fails (including for
/// zero-sized rasters).
pub fn encode<T, W>(raster: &Raster<T>, writer: W) -> Result<(), GeoTiffError>
where
    T: GeoTiffSample,
    [T]: TiffValue,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<T::Color>(raster.width(), raster.height())?;
    write_geo_tags(image.encoder(), raster)?;
    image.write_data(raster.cells())?;
    Ok(())
}
