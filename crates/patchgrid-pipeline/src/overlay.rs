//! Patch/grid overlay: split patches at grid-cell boundaries.
//!
//! Patch and cell bounding boxes go into two R*-trees whose pairwise
//! envelope intersections give the candidate (cell, patch) pairs. Each
//! candidate is then clipped with a polygon boolean intersection; a patch
//! whose bounding box lies inside the cell is taken whole without clipping.
//!
//! Fragments come out in cell order and, within a cell, in ascending patch
//! id order. Fragments with zero area (patches that only touch a cell
//! edge) are discarded.
//!
//! This is step 6 in the pipeline.

use geo::{BooleanOps, BoundingRect, MultiPolygon, Rect};
use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::{GeomWithData, Rectangle};

use crate::metrics::measure;
use crate::types::{GridCell, OverlayFragment, Patch};

/// Fragments smaller than this fraction of their cell's area are dropped
/// as boolean-operation noise.
const ZERO_AREA_EPSILON: f64 = 1e-12;

/// Bounding box tagged with an index into the patch or cell slice.
type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn indexed_box(rect: Rect<f64>, index: usize) -> IndexedBox {
    GeomWithData::new(
        Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        index,
    )
}

fn rect_contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

/// Intersect every patch with every grid cell it overlaps.
///
/// With `parallel` set, cells are distributed over the rayon pool; the
/// output order is the same either way.
#[must_use = "returns the overlay fragments"]
pub fn overlay(patches: &[Patch], cells: &[GridCell], parallel: bool) -> Vec<OverlayFragment> {
    let patch_bounds: Vec<Option<Rect<f64>>> =
        patches.iter().map(|p| p.geometry.bounding_rect()).collect();

    let patch_tree = RTree::bulk_load(
        patch_bounds
            .iter()
            .enumerate()
            .filter_map(|(i, rect)| rect.map(|r| indexed_box(r, i)))
            .collect(),
    );
    let cell_tree = RTree::bulk_load(
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| indexed_box(c.extent.to_rect(), i))
            .collect(),
    );

    let mut candidates: Vec<Vec<usize>> = vec![Vec::new(); cells.len()];
    let mut pairs = 0usize;
    for (cell, patch) in cell_tree.intersection_candidates_with_other_tree(&patch_tree) {
        candidates[cell.data].push(patch.data);
        pairs += 1;
    }
    for list in &mut candidates {
        list.sort_unstable_by_key(|&i| patches[i].id);
    }

    let clip = |(cell, list): (&GridCell, &Vec<usize>)| -> Vec<OverlayFragment> {
        let cell_rect = cell.extent.to_rect();
        let cell_polygon = cell.extent.to_polygon();
        let min_area = ZERO_AREA_EPSILON * cell.extent.width() * cell.extent.height();
        list.iter()
            .filter_map(|&i| {
                let patch = &patches[i];
                let geometry: MultiPolygon<f64> = match patch_bounds[i] {
                    Some(bounds) if rect_contains(&cell_rect, &bounds) => patch.geometry.clone(),
                    _ => patch.geometry.intersection(&cell_polygon),
                };
                if geometry.0.is_empty() || measure(&geometry).0 <= min_area {
                    return None;
                }
                Some(OverlayFragment {
                    cell_id: cell.id,
                    patch_id: patch.id,
                    geometry,
                })
            })
            .collect()
    };

    let per_cell: Vec<Vec<OverlayFragment>> = if parallel {
        cells.par_iter().zip(candidates.par_iter()).map(clip).collect()
    } else {
        cells.iter().zip(candidates.iter()).map(clip).collect()
    };
    let fragments: Vec<OverlayFragment> = per_cell.into_iter().flatten().collect();

    tracing::debug!(
        candidate_pairs = pairs,
        fragments = fragments.len(),
        parallel,
        "overlaid patches on grid"
    );
    fragments
}
