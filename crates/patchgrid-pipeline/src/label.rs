//! Patch labeling: 8-connected component labeling of a binary raster.
//!
//! Two-pass union-find. The first pass unions every foreground cell with
//! its already-visited neighbours (west, north-west, north, north-east);
//! the second pass assigns compact ids in raster-scan order, so the patch
//! containing the top-left-most foreground cell is always patch 1.
//!
//! # Parallel bands
//!
//! The first pass can run on horizontal bands in parallel. Each band owns
//! a private [`UnionFind`]; afterwards a global union-find merges the
//! band-local roots across every seam (the first row of a band against the
//! last row of the band above). Because ids are assigned in the second,
//! sequential pass, the output does not depend on the band height.
//!
//! This is step 2 in the pipeline.

use petgraph::unionfind::UnionFind;
use rayon::prelude::*;

use crate::types::{BinaryRaster, LabelRaster, LabelingMode, PatchId, PipelineError, StageName};

/// Marks a background cell in the provisional label buffer.
const NONE: usize = usize::MAX;

/// Smallest band height chosen by [`LabelingMode::Auto`].
const MIN_AUTO_BAND_ROWS: usize = 64;

/// Output of the labeler.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchLabels {
    /// Labeled raster: `0` for background, `1..=count` for patches.
    pub raster: LabelRaster,
    /// Number of patches.
    pub count: usize,
}

/// Label the 8-connected foreground components of `mask`.
///
/// # Errors
///
/// Returns [`PipelineError::Stage`] if the raster holds more patches than
/// a [`PatchId`] can represent.
pub fn label_patches(mask: &BinaryRaster, mode: LabelingMode) -> Result<PatchLabels, PipelineError> {
    let width = mask.width() as usize;
    let height = mask.height() as usize;
    let cells = mask.cells();

    if cells.is_empty() {
        return Ok(PatchLabels {
            raster: mask.derive(Vec::new()),
            count: 0,
        });
    }

    let band_rows = band_height(mode, height);
    let provisional: Vec<usize> = if band_rows >= height {
        label_band(cells, width, 0)
    } else {
        cells
            .par_chunks(band_rows * width)
            .enumerate()
            .map(|(k, band)| label_band(band, width, k * band_rows * width))
            .collect::<Vec<_>>()
            .concat()
    };

    let mut global = UnionFind::<usize>::new(cells.len());
    for seam_row in (band_rows..height).step_by(band_rows) {
        merge_seam(&provisional, width, seam_row, &mut global);
    }

    let (labels, count) = compact(&provisional, &mut global)?;
    tracing::debug!(patches = count, band_rows, "labeled patches");
    Ok(PatchLabels {
        raster: mask.derive(labels),
        count,
    })
}

/// Rows per band for the requested scheduling mode.
fn band_height(mode: LabelingMode, height: usize) -> usize {
    match mode {
        LabelingMode::Sequential => height,
        LabelingMode::Banded { rows } => (rows as usize).max(1),
        LabelingMode::Auto => {
            let threads = rayon::current_num_threads().max(1);
            height.div_ceil(threads).max(MIN_AUTO_BAND_ROWS)
        }
    }
}

/// First labeling pass over one band.
///
/// Returns, for every cell of the band, the global cell index of its
/// band-local root, or [`NONE`] for background.
fn label_band(band: &[u8], width: usize, offset: usize) -> Vec<usize> {
    let mut uf = UnionFind::<usize>::new(band.len());
    let rows = band.len() / width;

    for row in 0..rows {
        for col in 0..width {
            let i = row * width + col;
            if band[i] == 0 {
                continue;
            }
            if col > 0 && band[i - 1] != 0 {
                uf.union(i, i - 1);
            }
            if row > 0 {
                let above = i - width;
                if col > 0 && band[above - 1] != 0 {
                    uf.union(i, above - 1);
                }
                if band[above] != 0 {
                    uf.union(i, above);
                }
                if col + 1 < width && band[above + 1] != 0 {
                    uf.union(i, above + 1);
                }
            }
        }
    }

    band.iter()
        .enumerate()
        .map(|(i, &v)| if v == 0 { NONE } else { offset + uf.find_mut(i) })
        .collect()
}

/// Union the components touching across the seam above `seam_row`.
fn merge_seam(provisional: &[usize], width: usize, seam_row: usize, uf: &mut UnionFind<usize>) {
    let below = seam_row * width;
    let above = below - width;
    for col in 0..width {
        let here = provisional[below + col];
        if here == NONE {
            continue;
        }
        let lo = col.saturating_sub(1);
        let hi = (col + 1).min(width - 1);
        for c in lo..=hi {
            let there = provisional[above + c];
            if there != NONE {
                uf.union(here, there);
            }
        }
    }
}

/// Second pass: replace roots with compact ids in raster-scan order.
fn compact(
    provisional: &[usize],
    uf: &mut UnionFind<usize>,
) -> Result<(Vec<PatchId>, usize), PipelineError> {
    let mut ids: Vec<PatchId> = vec![0; provisional.len()];
    let mut next: PatchId = 0;
    let mut labels = Vec::with_capacity(provisional.len());

    for &p in provisional {
        if p == NONE {
            labels.push(0);
            continue;
        }
        let root = uf.find_mut(p);
        if ids[root] == 0 {
            next = next.checked_add(1).ok_or_else(|| PipelineError::Stage {
                stage: StageName::Label,
                reason: format!("more than {} patches", PatchId::MAX),
            })?;
            ids[root] = next;
        }
        labels.push(ids[root]);
    }

    Ok((labels, next as usize))
}
