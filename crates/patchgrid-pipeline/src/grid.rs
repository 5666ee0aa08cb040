//! Analysis grid generation.
//!
//! The grid tiles an extent with square cells of side `spacing`, row-major
//! from the top-left corner, ids starting at 1. Cells in the last column
//! and row are clipped to the extent rather than padding the extent up to
//! a multiple of the spacing, so the grid never reaches past the data.
//!
//! This is step 5 in the pipeline.

use geo::BoundingRect;

use crate::types::{CellId, Extent, GridCell, Patch, PipelineError, StageName};

/// Relative slack when deciding whether an extent is an exact multiple of
/// the spacing. Avoids sliver cells from floating-point round-off.
const MULTIPLE_TOLERANCE: f64 = 1e-9;

/// Upper bound on generated cells.
const MAX_GRID_CELLS: u64 = 1 << 32;

/// Number of cells of size `spacing` needed to cover `length`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn cells_along(length: f64, spacing: f64) -> u64 {
    if length <= 0.0 {
        return 0;
    }
    let n = length / spacing;
    let nearest = n.round();
    if nearest >= 1.0 && (n - nearest).abs() <= MULTIPLE_TOLERANCE * nearest {
        nearest as u64
    } else {
        n.ceil() as u64
    }
}

/// Generate the grid covering `extent`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidSpacing`] if `spacing` is not a
/// positive finite number, and [`PipelineError::Stage`] if the grid would
/// exceed 2^32 cells.
#[allow(clippy::cast_precision_loss)]
pub fn generate_grid(extent: &Extent, spacing: f64) -> Result<Vec<GridCell>, PipelineError> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Err(PipelineError::InvalidSpacing(spacing));
    }
    if extent.is_empty() {
        return Ok(Vec::new());
    }

    let cols = cells_along(extent.width(), spacing);
    let rows = cells_along(extent.height(), spacing);
    let total = cols.saturating_mul(rows);
    if total > MAX_GRID_CELLS {
        return Err(PipelineError::Stage {
            stage: StageName::Grid,
            reason: format!("{cols}x{rows} cells at spacing {spacing} is too many"),
        });
    }

    let mut cells = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
    for row in 0..rows {
        let top = (row as f64).mul_add(-spacing, extent.top);
        let bottom = if row + 1 == rows {
            extent.bottom
        } else {
            (top - spacing).max(extent.bottom)
        };
        for col in 0..cols {
            let left = (col as f64).mul_add(spacing, extent.left);
            let right = if col + 1 == cols {
                extent.right
            } else {
                (left + spacing).min(extent.right)
            };
            let id: CellId = row * cols + col + 1;
            cells.push(GridCell {
                id,
                extent: Extent::new(left, top, right, bottom),
            });
        }
    }

    tracing::debug!(cols, rows, spacing, "generated grid");
    Ok(cells)
}

/// Bounding extent of all patch geometry, or `None` without patches.
#[must_use]
pub fn patches_extent(patches: &[Patch]) -> Option<Extent> {
    patches
        .iter()
        .filter_map(|p| p.geometry.bounding_rect())
        .map(Extent::from)
        .reduce(|a, b| {
            Extent::new(
                a.left.min(b.left),
                a.top.max(b.top),
                a.right.max(b.right),
                a.bottom.min(b.bottom),
            )
        })
}
