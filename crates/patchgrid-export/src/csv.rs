//! CSV export of per-cell summaries.
//!
//! One header row followed by one row per summary, in the order given.
//! The cell rectangle is carried as a WKT `POLYGON` in the trailing
//! `geometry` column so that GIS tools can load the table as a layer.
//!
//! Numbers use Rust's shortest round-trip formatting, so reading the table
//! back yields the exact `f64` values that were written.
//!
//! This is a pure function with no I/O: it returns a `String`.

use std::fmt::Write;

use patchgrid_pipeline::CellSummary;

use crate::wkt;

/// Output columns, in order.
pub const COLUMNS: [&str; 11] = [
    "id",
    "left",
    "top",
    "right",
    "bottom",
    "first_patch_id",
    "last_patch_id",
    "surface",
    "perimeter",
    "patch_count",
    "geometry",
];

/// Serialize summaries as CSV with a header row.
///
/// Rows end with `\n`. The geometry column is always quoted because WKT
/// contains commas.
///
/// # Examples
///
/// ```
/// use patchgrid_pipeline::CellSummary;
/// use patchgrid_export::csv::to_csv;
///
/// let row = CellSummary {
///     id: 1,
///     left: 0.0,
///     top: 10.0,
///     right: 10.0,
///     bottom: 0.0,
///     first_patch_id: 3,
///     last_patch_id: 3,
///     surface: 25.0,
///     perimeter: 20.0,
///     patch_count: 1,
/// };
/// let csv = to_csv(&[row]);
/// assert!(csv.starts_with("id,left,top"));
/// assert!(csv.contains("1,0,10,10,0,3,3,25,20,1,"));
/// ```
#[must_use]
pub fn to_csv(summaries: &[CellSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", COLUMNS.join(","));
    for s in summaries {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},\"{}\"",
            s.id,
            s.left,
            s.top,
            s.right,
            s.bottom,
            s.first_patch_id,
            s.last_patch_id,
            s.surface,
            s.perimeter,
            s.patch_count,
            wkt::extent_polygon(&s.extent()),
        );
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(id: u64, surface: f64) -> CellSummary {
        CellSummary {
            id,
            left: 300.0,
            top: 600.0,
            right: 600.0,
            bottom: 300.0,
            first_patch_id: 2,
            last_patch_id: 5,
            surface,
            perimeter: 123.5,
            patch_count: 3,
        }
    }

    #[test]
    fn header_lists_all_columns() {
        let csv = to_csv(&[]);
        assert_eq!(
            csv,
            "id,left,top,right,bottom,first_patch_id,last_patch_id,surface,perimeter,patch_count,geometry\n"
        );
    }

    #[test]
    fn one_line_per_summary_in_order() {
        let csv = to_csv(&[row(4, 1.0), row(9, 2.0)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("4,"));
        assert!(lines[2].starts_with("9,"));
    }

    #[test]
    fn row_values_and_geometry() {
        let csv = to_csv(&[row(1, 0.1 + 0.2)]);
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "1,300,600,600,300,2,5,0.30000000000000004,123.5,3,\
             \"POLYGON ((300 300, 600 300, 600 600, 300 600, 300 300))\""
        );
    }

    #[test]
    fn values_round_trip_exactly() {
        let surface = 90_000.0 / 7.0;
        let csv = to_csv(&[row(1, surface)]);
        let field = csv.lines().nth(1).unwrap().split(',').nth(7).unwrap();
        assert_eq!(field.parse::<f64>().unwrap().to_bits(), surface.to_bits());
    }
}
