//! ESRI ASCII grid (`.asc`) parsing.
//!
//! The header holds `ncols`, `nrows`, `xllcorner`/`xllcenter`,
//! `yllcorner`/`yllcenter`, `cellsize` and an optional `NODATA_value`, in
//! any order and case. Grids whose values are all integers become `i32`
//! rasters; anything else becomes `f64`.

use patchgrid_pipeline::{CategoricalRaster, CellValue, Dimensions, GeoTransform, Raster};

#[derive(Debug, Default)]
struct Header {
    ncols: Option<u32>,
    nrows: Option<u32>,
    xll: Option<(f64, bool)>,
    yll: Option<(f64, bool)>,
    cellsize: Option<f64>,
    nodata: Option<String>,
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("header {key} has invalid value {value:?}"))
}

/// Parse the text of an ASCII grid.
///
/// # Errors
///
/// Returns a description of the first problem found: a missing or invalid
/// header entry, or a cell count that does not match the header.
pub fn parse(text: &str) -> Result<CategoricalRaster, String> {
    let mut header = Header::default();
    let mut lines = text.lines().peekable();

    while let Some(&line) = lines.peek() {
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else {
            lines.next();
            continue;
        };
        // The header ends at the first line that starts with a number.
        if key.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.') {
            break;
        }
        let value = parts
            .next()
            .ok_or_else(|| format!("header {key} has no value"))?;
        match key.to_ascii_lowercase().as_str() {
            "ncols" => header.ncols = Some(parse_number(key, value)?),
            "nrows" => header.nrows = Some(parse_number(key, value)?),
            "xllcorner" => header.xll = Some((parse_number(key, value)?, false)),
            "xllcenter" => header.xll = Some((parse_number(key, value)?, true)),
            "yllcorner" => header.yll = Some((parse_number(key, value)?, false)),
            "yllcenter" => header.yll = Some((parse_number(key, value)?, true)),
            "cellsize" => header.cellsize = Some(parse_number(key, value)?),
            "nodata_value" => header.nodata = Some(value.to_owned()),
            _ => return Err(format!("unknown header entry {key:?}")),
        }
        lines.next();
    }

    let width = header.ncols.ok_or("header lacks ncols")?;
    let height = header.nrows.ok_or("header lacks nrows")?;
    let (xll, x_center) = header.xll.ok_or("header lacks xllcorner")?;
    let (yll, y_center) = header.yll.ok_or("header lacks yllcorner")?;
    let cellsize = header.cellsize.ok_or("header lacks cellsize")?;
    if !(cellsize.is_finite() && cellsize > 0.0) {
        return Err(format!("cellsize {cellsize} must be positive"));
    }

    let left = if x_center { cellsize.mul_add(-0.5, xll) } else { xll };
    let bottom = if y_center { cellsize.mul_add(-0.5, yll) } else { yll };
    let top = f64::from(height).mul_add(cellsize, bottom);
    let dimensions = Dimensions { width, height };
    let transform = GeoTransform::new(left, top, cellsize, cellsize);

    let tokens: Vec<&str> = lines.flat_map(str::split_whitespace).collect();
    if tokens.len() != dimensions.cell_count() {
        return Err(format!(
            "expected {} values for {width}x{height} cells, found {}",
            dimensions.cell_count(),
            tokens.len()
        ));
    }

    if let Some(cells) = tokens
        .iter()
        .map(|t| t.parse::<i32>().ok())
        .collect::<Option<Vec<_>>>()
    {
        return build(dimensions, transform, cells, header.nodata.as_deref());
    }
    let cells = tokens
        .iter()
        .map(|t| t.parse::<f64>().map_err(|_| format!("invalid cell value {t:?}")))
        .collect::<Result<Vec<_>, _>>()?;
    build(dimensions, transform, cells, header.nodata.as_deref())
}

fn build<T: CellValue>(
    dimensions: Dimensions,
    transform: GeoTransform,
    cells: Vec<T>,
    nodata: Option<&str>,
) -> Result<CategoricalRaster, String>
where
    CategoricalRaster: From<Raster<T>>,
{
    let raster = Raster::new(dimensions, transform, cells).map_err(|e| e.to_string())?;
    Ok(raster.with_nodata(nodata.and_then(T::parse_class)).into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    const GRID: &str = "\
ncols 3
nrows 2
xllcorner 1000
yllcorner 2000
cellsize 25
NODATA_value -9999
1 2 -9999
3 3 1
";

    #[test]
    fn integer_grid() {
        match parse(GRID).unwrap() {
            CategoricalRaster::I32(r) => {
                assert_eq!(r.cells(), &[1, 2, -9999, 3, 3, 1]);
                assert_eq!(r.nodata(), Some(-9999));
                assert_eq!(r.transform(), &GeoTransform::new(1000.0, 2050.0, 25.0, 25.0));
            }
            other => panic!("unexpected cell type {}", other.cell_type()),
        }
    }

    #[test]
    fn float_grid_with_cell_centers() {
        let text = "NCOLS 2\nNROWS 1\nXLLCENTER 0.5\nYLLCENTER 0.5\nCELLSIZE 1\n0.5 1\n";
        let raster = parse(text).unwrap();
        assert_eq!(raster.cell_type(), "f64");
        assert_eq!(raster.transform(), &GeoTransform::new(0.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn values_may_wrap_across_lines() {
        let text = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1\n2 3\n4\n";
        assert_eq!(parse(text).unwrap().dimensions().cell_count(), 4);
    }

    #[test]
    fn wrong_cell_count_is_rejected() {
        let text = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";
        assert!(parse(text).unwrap_err().contains("expected 4 values"));
    }

    #[test]
    fn missing_header_is_rejected() {
        let text = "ncols 1\nnrows 1\nxllcorner 0\ncellsize 1\n1\n";
        assert_eq!(parse(text).unwrap_err(), "header lacks yllcorner");
    }
}
