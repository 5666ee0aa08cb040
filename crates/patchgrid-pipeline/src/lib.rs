//! patchgrid-pipeline: landscape patch metrics on a regular grid (sans-IO).
//!
//! Turns a categorical raster into per-grid-cell patch statistics through:
//! classify -> label -> vectorize -> sanitize -> grid -> overlay ->
//! measure -> aggregate.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! rasters and polygons and returns structured data. Reading GeoTIFFs and
//! writing tables lives in `patchgrid-io` and `patchgrid-export`.

pub mod aggregate;
pub mod cancel;
pub mod classify;
pub mod diagnostics;
pub mod grid;
pub mod label;
pub mod metrics;
pub mod overlay;
pub mod pipeline;
pub mod sanitize;
pub mod types;
pub mod vectorize;

pub use aggregate::fingerprint;
pub use cancel::{CancellationToken, Outcome};
pub use classify::{CategoricalRaster, CellValue};
pub use diagnostics::{Clock, PipelineDiagnostics, StageDiagnostics, StageMetrics};
pub use pipeline::{Pipeline, Stage};
pub use types::{
    BinaryRaster, CellId, CellSummary, Dimensions, Extent, GeoTransform, GridCell, LabelRaster,
    LabelingMode, MeasuredFragment, OverlayFragment, Patch, PatchId, PipelineConfig,
    PipelineError, PipelineResult, Raster, StageName,
};

use diagnostics::PipelineSummary;
use pipeline::{Advance, PipelineStage};

/// Run the full pipeline on a categorical raster.
///
/// # Pipeline steps
///
/// 1. Classify cells equal to the class value
/// 2. Label 8-connected patches
/// 3. Trace patch outlines into polygons
/// 4. Repair polygon geometry
/// 5. Generate the grid over the patch extent
/// 6. Intersect patches with grid cells
/// 7. Measure fragment area and perimeter
/// 8. Aggregate fragments per grid cell
///
/// A class value that does not occur in the raster is not an error: the
/// result simply has no summaries.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidClassValue`] or
/// [`PipelineError::InvalidSpacing`] before any stage runs, and
/// [`PipelineError::Stage`] if a stage cannot produce its output.
pub fn process(
    raster: CategoricalRaster,
    config: PipelineConfig,
) -> Result<PipelineResult, PipelineError> {
    Pipeline::new(raster, config)?.complete()
}

/// Run the pipeline from already-vectorized patch polygons (steps 4-8).
///
/// # Errors
///
/// Returns [`PipelineError::InvalidSpacing`] for a bad spacing and
/// [`PipelineError::Stage`] if a stage cannot produce its output.
pub fn process_patches(
    patches: Vec<Patch>,
    config: PipelineConfig,
) -> Result<PipelineResult, PipelineError> {
    Pipeline::from_patches(patches, config)?.complete()
}

/// Run the remaining stages from `start`, checking `token` before each.
///
/// # Errors
///
/// Returns [`PipelineError`] if a stage fails. Cancellation is reported as
/// [`Outcome::Cancelled`], not as an error.
pub fn process_cancellable(
    start: impl Into<Stage>,
    token: &CancellationToken,
) -> Result<Outcome<PipelineResult>, PipelineError> {
    let mut stage = start.into();
    loop {
        if stage.is_complete() {
            return Ok(Outcome::Completed(stage.complete()?));
        }
        if token.is_cancelled() {
            let after = stage.completed();
            tracing::info!(after = ?after, "pipeline cancelled");
            return Ok(Outcome::Cancelled { after });
        }
        stage = match stage.advance()? {
            Advance::Next(next) => next,
            Advance::Complete(done) => done,
        };
    }
}

/// Run the remaining stages from `start`, timing each with `clock`.
///
/// # Errors
///
/// Returns [`PipelineError`] if a stage fails.
pub fn process_with_diagnostics<C: Clock>(
    start: impl Into<Stage>,
    clock: &C,
) -> Result<(PipelineResult, PipelineDiagnostics), PipelineError> {
    let run_start = clock.now();
    let mut diagnostics = PipelineDiagnostics::default();
    let mut stage = start.into();

    while !stage.is_complete() {
        let stage_start = clock.now();
        stage = match stage.advance()? {
            Advance::Next(next) => next,
            Advance::Complete(done) => done,
        };
        let duration = clock.elapsed(&stage_start);
        if let (Some(name), Some(metrics)) = (stage.completed(), stage.metrics()) {
            tracing::debug!(stage = %name, elapsed_ms = duration.as_secs_f64() * 1000.0, "stage finished");
            diagnostics.record(name, StageDiagnostics { duration, metrics });
        }
    }

    let result = stage.complete()?;
    diagnostics.total_duration = clock.elapsed(&run_start);
    diagnostics.summary = PipelineSummary {
        patch_count: result.patch_count,
        dropped_patches: result.dropped_patches.len(),
        grid_cell_count: result.grid_cell_count,
        fragment_count: result.fragment_count,
        row_count: result.summaries.len(),
        fingerprint: fingerprint(&result.summaries),
    };
    tracing::info!(
        rows = diagnostics.summary.row_count,
        patches = diagnostics.summary.patch_count,
        fingerprint = diagnostics.summary.fingerprint,
        "pipeline complete"
    );
    Ok((result, diagnostics))
}
