//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs the entire pipeline in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use patchgrid_pipeline::{CategoricalRaster, Pipeline, PipelineConfig, PipelineError};
//! # fn run(raster: CategoricalRaster) -> Result<(), PipelineError> {
//! let config = PipelineConfig::new("1", 300.0);
//! let result = Pipeline::new(raster, config)?
//!     .classify()?
//!     .label()?
//!     .vectorize()
//!     .sanitize()
//!     .grid()?
//!     .overlay()
//!     .measure()
//!     .aggregate()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages). The caller can inspect the current
//! stage's output via accessor methods at any point, which is how the
//! command-line tool writes intermediate layers.
//!
//! # Memory
//!
//! A stage keeps only what later stages need. The binary mask is released
//! by labeling and the labeled raster by vectorization, so at most one
//! full-size raster is alive at a time.

use crate::classify::{self, CategoricalRaster};
use crate::diagnostics::{StageMetrics, geometry_stats};
use crate::label::{self, PatchLabels};
use crate::sanitize::sanitize_patches;
use crate::types::{
    BinaryRaster, CellSummary, Extent, GridCell, LabelRaster, MeasuredFragment, OverlayFragment,
    Patch, PatchId, PipelineConfig, PipelineError, PipelineResult, StageName,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`classify`](Self::classify) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .classify() to continue"]
pub struct Pending {
    config: PipelineConfig,
    raster: CategoricalRaster,
}

impl Pending {
    /// The input raster.
    #[must_use]
    pub const fn raster(&self) -> &CategoricalRaster {
        &self.raster
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classify the input raster and advance to [`Classified`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidClassValue`] if the class value
    /// cannot be compared with the raster's cells.
    pub fn classify(self) -> Result<Classified, PipelineError> {
        let mask = classify::classify(&self.raster, &self.config.class_value)?;
        let foreground = classify::foreground_count(&mask);
        tracing::debug!(
            foreground,
            cells = mask.cells().len(),
            class_value = %self.config.class_value,
            "classified raster"
        );
        Ok(Classified {
            config: self.config,
            cell_type: self.raster.cell_type(),
            mask,
            foreground,
        })
    }
}

// ───────────────────────── Stage 1: Classified ───────────────────────

/// Pipeline state after classification.
///
/// Call [`label`](Self::label) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .label() to continue"]
pub struct Classified {
    config: PipelineConfig,
    cell_type: &'static str,
    mask: BinaryRaster,
    foreground: usize,
}

impl Classified {
    /// Binary mask: `1` where the input equals the class value.
    #[must_use]
    pub const fn mask(&self) -> &BinaryRaster {
        &self.mask
    }

    /// Number of foreground cells.
    #[must_use]
    pub const fn foreground(&self) -> usize {
        self.foreground
    }

    /// Label 8-connected patches and advance to [`Labeled`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] if the patch count overflows a
    /// [`PatchId`].
    pub fn label(self) -> Result<Labeled, PipelineError> {
        let labels = label::label_patches(&self.mask, self.config.labeling)?;
        Ok(Labeled {
            config: self.config,
            labels,
        })
    }
}

// ───────────────────────── Stage 2: Labeled ──────────────────────────

/// Pipeline state after connected-component labeling.
///
/// Call [`vectorize`](Self::vectorize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .vectorize() to continue"]
pub struct Labeled {
    config: PipelineConfig,
    labels: PatchLabels,
}

impl Labeled {
    /// Labeled raster.
    #[must_use]
    pub const fn labels(&self) -> &LabelRaster {
        &self.labels.raster
    }

    /// Number of patches found.
    #[must_use]
    pub const fn patch_count(&self) -> usize {
        self.labels.count
    }

    /// Trace patch outlines and advance to [`Vectorized`].
    pub fn vectorize(self) -> Vectorized {
        let patches = crate::vectorize::vectorize(&self.labels.raster);
        Vectorized {
            config: self.config,
            patches,
        }
    }
}

// ───────────────────────── Stage 3: Vectorized ───────────────────────

/// Pipeline state holding unrepaired patch polygons.
///
/// Reached from [`Labeled::vectorize`] or directly from polygons with
/// [`Pipeline::from_patches`]. Call [`sanitize`](Self::sanitize) to
/// advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .sanitize() to continue"]
pub struct Vectorized {
    config: PipelineConfig,
    patches: Vec<Patch>,
}

impl Vectorized {
    /// Patch polygons as traced (or as supplied).
    #[must_use]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Repair patch geometry and advance to [`Sanitized`].
    pub fn sanitize(self) -> Sanitized {
        let input_count = self.patches.len();
        let report = sanitize_patches(self.patches);
        Sanitized {
            config: self.config,
            input_count,
            patches: report.patches,
            dropped: report.dropped,
            repaired: report.repaired,
        }
    }
}

// ───────────────────────── Stage 4: Sanitized ────────────────────────

/// Pipeline state after geometry repair.
///
/// Call [`grid`](Self::grid) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .grid() to continue"]
pub struct Sanitized {
    config: PipelineConfig,
    input_count: usize,
    patches: Vec<Patch>,
    dropped: Vec<PatchId>,
    repaired: usize,
}

impl Sanitized {
    /// Valid patch polygons.
    #[must_use]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Ids of patches dropped for lack of area.
    #[must_use]
    pub fn dropped(&self) -> &[PatchId] {
        &self.dropped
    }

    /// Build the analysis grid over the patch extent and advance to
    /// [`Gridded`].
    ///
    /// Without patches the grid is empty.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSpacing`] if the configured spacing
    /// is not a positive finite number, or [`PipelineError::Stage`] if the
    /// grid would be unreasonably large.
    pub fn grid(self) -> Result<Gridded, PipelineError> {
        let extent = crate::grid::patches_extent(&self.patches);
        let cells = match extent {
            Some(ref e) => crate::grid::generate_grid(e, self.config.spacing)?,
            None => Vec::new(),
        };
        Ok(Gridded {
            config: self.config,
            input_count: self.input_count,
            patches: self.patches,
            dropped: self.dropped,
            extent,
            cells,
        })
    }
}

// ───────────────────────── Stage 5: Gridded ──────────────────────────

/// Pipeline state after grid generation.
///
/// Call [`overlay`](Self::overlay) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .overlay() to continue"]
pub struct Gridded {
    config: PipelineConfig,
    input_count: usize,
    patches: Vec<Patch>,
    dropped: Vec<PatchId>,
    extent: Option<Extent>,
    cells: Vec<GridCell>,
}

impl Gridded {
    /// Grid cells in id order.
    #[must_use]
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Extent covered by the grid, or `None` without patches.
    #[must_use]
    pub const fn extent(&self) -> Option<Extent> {
        self.extent
    }

    /// Valid patch polygons.
    #[must_use]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Intersect patches with grid cells and advance to [`Overlaid`].
    pub fn overlay(self) -> Overlaid {
        let fragments =
            crate::overlay::overlay(&self.patches, &self.cells, self.config.parallel_overlay);
        Overlaid {
            config: self.config,
            input_count: self.input_count,
            dropped: self.dropped,
            cells: self.cells,
            fragments,
        }
    }
}

// ───────────────────────── Stage 6: Overlaid ─────────────────────────

/// Pipeline state after overlay.
///
/// Call [`measure`](Self::measure) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .measure() to continue"]
pub struct Overlaid {
    config: PipelineConfig,
    input_count: usize,
    dropped: Vec<PatchId>,
    cells: Vec<GridCell>,
    fragments: Vec<OverlayFragment>,
}

impl Overlaid {
    /// Non-empty patch fragments, cell-major.
    #[must_use]
    pub fn fragments(&self) -> &[OverlayFragment] {
        &self.fragments
    }

    /// Compute fragment area and perimeter and advance to [`Measured`].
    pub fn measure(self) -> Measured {
        let measured = crate::metrics::measure_fragments(&self.fragments);
        Measured {
            config: self.config,
            input_count: self.input_count,
            dropped: self.dropped,
            cells: self.cells,
            measured,
        }
    }
}

// ───────────────────────── Stage 7: Measured ─────────────────────────

/// Pipeline state after fragment measurement.
///
/// Call [`aggregate`](Self::aggregate) to advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing; call .aggregate() to continue"]
pub struct Measured {
    config: PipelineConfig,
    input_count: usize,
    dropped: Vec<PatchId>,
    cells: Vec<GridCell>,
    measured: Vec<MeasuredFragment>,
}

impl Measured {
    /// Measured fragments, in overlay order.
    #[must_use]
    pub fn fragments(&self) -> &[MeasuredFragment] {
        &self.measured
    }

    /// Reduce fragments to per-cell summaries and advance to
    /// [`Aggregated`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] if a fragment refers to a cell
    /// that is not part of the grid.
    pub fn aggregate(self) -> Result<Aggregated, PipelineError> {
        let summaries = crate::aggregate::aggregate(&self.measured, &self.cells)?;
        Ok(Aggregated {
            config: self.config,
            input_count: self.input_count,
            dropped: self.dropped,
            grid_cell_count: self.cells.len(),
            fragment_count: self.measured.len(),
            summaries,
        })
    }
}

// ───────────────────────── Stage 8: Aggregated ───────────────────────

/// Pipeline state after aggregation: the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`PipelineResult`].
#[must_use = "call .into_result() to extract the PipelineResult"]
pub struct Aggregated {
    config: PipelineConfig,
    input_count: usize,
    dropped: Vec<PatchId>,
    grid_cell_count: usize,
    fragment_count: usize,
    summaries: Vec<CellSummary>,
}

impl Aggregated {
    /// One summary per non-empty grid cell, in cell id order.
    #[must_use]
    pub fn summaries(&self) -> &[CellSummary] {
        &self.summaries
    }

    /// The configuration the run used.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Consume the pipeline and return the [`PipelineResult`].
    #[must_use]
    pub fn into_result(self) -> PipelineResult {
        PipelineResult {
            patch_count: self.input_count,
            dropped_patches: self.dropped,
            grid_cell_count: self.grid_cell_count,
            fragment_count: self.fragment_count,
            summaries: self.summaries,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline, `Pending` included.
pub const STAGE_COUNT: usize = 9;

/// The output produced by a single pipeline stage.
///
/// Each variant borrows the data that the corresponding stage computed.
#[must_use]
pub enum StageOutput<'a> {
    /// Input raster (not yet classified).
    Source {
        /// The categorical raster.
        raster: &'a CategoricalRaster,
    },
    /// Binary classification mask.
    Classified {
        /// The mask.
        mask: &'a BinaryRaster,
    },
    /// Labeled patches.
    Labeled {
        /// The labeled raster.
        labels: &'a LabelRaster,
    },
    /// Traced patch polygons.
    Vectorized {
        /// The patches.
        patches: &'a [Patch],
    },
    /// Repaired patch polygons.
    Sanitized {
        /// The kept patches.
        patches: &'a [Patch],
        /// Ids of dropped patches.
        dropped: &'a [PatchId],
    },
    /// Analysis grid.
    Gridded {
        /// The grid cells.
        cells: &'a [GridCell],
    },
    /// Overlay fragments.
    Overlaid {
        /// The fragments.
        fragments: &'a [OverlayFragment],
    },
    /// Measured fragments.
    Measured {
        /// The measured fragments.
        fragments: &'a [MeasuredFragment],
    },
    /// Per-cell summaries.
    Aggregated {
        /// The summary rows.
        summaries: &'a [CellSummary],
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Each stage struct implements it, and [`Stage`] delegates to whichever
/// variant it holds.
///
/// # Loop pattern
///
/// ```rust
/// # use patchgrid_pipeline::{CategoricalRaster, Pipeline, PipelineConfig, PipelineError};
/// # use patchgrid_pipeline::pipeline::{Advance, Stage};
/// # fn run(raster: CategoricalRaster) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(raster, PipelineConfig::default())?.into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage: Sized {
    /// Short name of this stage (e.g. `"source"`, `"overlay"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `8` for
    /// Aggregated).
    const INDEX: usize;

    /// The processing step whose output this state holds, or `None` for
    /// [`Pending`].
    const COMPLETED: Option<StageName>;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` for [`Pending`], which has not done any work.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success, `Ok(None)` if already at the
    /// final stage, or `Err` if the stage transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<PipelineResult, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;
    const COMPLETED: Option<StageName> = None;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            raster: &self.raster,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Classified(self.classify()?)))
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        self.classify()?.complete()
    }
}

impl PipelineStage for Classified {
    const NAME: &str = "classify";
    const INDEX: usize = 1;
    const COMPLETED: Option<StageName> = Some(StageName::Classify);

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Classified { mask: &self.mask }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Classify {
            width: self.mask.width(),
            height: self.mask.height(),
            cell_type: self.cell_type.to_owned(),
            class_value: self.config.class_value.clone(),
            foreground_cells: self.foreground,
            total_cells: self.mask.cells().len(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Labeled(self.label()?)))
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        self.label()?.complete()
    }
}

impl PipelineStage for Labeled {
    const NAME: &str = "label";
    const INDEX: usize = 2;
    const COMPLETED: Option<StageName> = Some(StageName::Label);

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Labeled {
            labels: &self.labels.raster,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Label {
            mode: format!("{:?}", self.config.labeling),
            patch_count: self.labels.count,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Vectorized(self.vectorize())))
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        self.vectorize().complete()
    }
}

impl PipelineStage for Vectorized {
    const NAME: &str = "vectorize";
    const INDEX: usize = 3;
    const COMPLETED: Option<StageName> = Some(StageName::Vectorize);

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Vectorized {
            patches: &self.patches,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let stats = geometry_stats(&self.patches);
        Some(StageMetrics::Vectorize {
            patch_count: self.patches.len(),
            polygon_count: stats.polygons,
            hole_count: stats.holes,
            vertex_count: stats.vertices,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Sanitized(self.sanitize())))
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        self.sanitize().complete()
    }
}

impl PipelineStage for Sanitized {
    const NAME: &str = "sanitize";
    const INDEX: usize = 4;
    const COMPLETED: Option<StageName> = Some(StageName::Sanitize);

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Sanitized {
            patches: &self.patches,
            dropped: &self.dropped,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Sanitize {
            kept: self.patches.len(),
            dropped: self.dropped.len(),
            repaired: self.repaired,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Gridded(self.grid()?)))
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        self.grid()?.complete()
    }
}

impl PipelineStage for Gridded {
    const NAME: &str = "grid";
    const INDEX: usize = 5;
    const COMPLETED: Option<StageName> = Some(StageName::Grid);

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Gridded { cells: &self.cells }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Grid {
            spacing: self.config.spacing,
            cell_count: self.cells.len(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Overlaid(self.overlay())))
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        self.overlay().complete()
    }
}

impl PipelineStage for Overlaid {
    const NAME: &str = "overlay";
    const INDEX: usize = 6;
    const COMPLETED: Option<StageName> = Some(StageName::Overlay);

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Overlaid {
            fragments: &self.fragments,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Overlay {
            fragment_count: self.fragments.len(),
            parallel: self.config.parallel_overlay,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Measured(self.measure())))
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        self.measure().complete()
    }
}

impl PipelineStage for Measured {
    const NAME: &str = "measure";
    const INDEX: usize = 7;
    const COMPLETED: Option<StageName> = Some(StageName::Measure);

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Measured {
            fragments: &self.measured,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Measure {
            fragment_count: self.measured.len(),
            total_area: self.measured.iter().map(|f| f.area).sum(),
            total_perimeter: self.measured.iter().map(|f| f.perimeter).sum(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Aggregated(self.aggregate()?)))
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        Ok(self.aggregate()?.into_result())
    }
}

impl PipelineStage for Aggregated {
    const NAME: &str = "aggregate";
    const INDEX: usize = 8;
    const COMPLETED: Option<StageName> = Some(StageName::Aggregate);

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Aggregated {
            summaries: &self.summaries,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Aggregate {
            row_count: self.summaries.len(),
            fingerprint: crate::aggregate::fingerprint(&self.summaries),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<PipelineResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// Use [`From`] conversions to enter the dynamic API from any typed
/// stage, then call [`advance`](Self::advance) in a loop.
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Classified`].
    Classified(Classified),
    /// See [`Labeled`].
    Labeled(Labeled),
    /// See [`Vectorized`].
    Vectorized(Vectorized),
    /// See [`Sanitized`].
    Sanitized(Sanitized),
    /// See [`Gridded`].
    Gridded(Gridded),
    /// See [`Overlaid`].
    Overlaid(Overlaid),
    /// See [`Measured`].
    Measured(Measured),
    /// See [`Aggregated`].
    Aggregated(Aggregated),
}

/// Compile-time guard: adding a [`Stage`] variant makes this match
/// non-exhaustive until [`STAGE_COUNT`] is revisited.
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Classified(_)
        | Stage::Labeled(_)
        | Stage::Vectorized(_)
        | Stage::Sanitized(_)
        | Stage::Gridded(_)
        | Stage::Overlaid(_)
        | Stage::Measured(_)
        | Stage::Aggregated(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the completed
/// final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at the final stage.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Classified(s) => s.$method($($arg),*),
            Self::Labeled(s) => s.$method($($arg),*),
            Self::Vectorized(s) => s.$method($($arg),*),
            Self::Sanitized(s) => s.$method($($arg),*),
            Self::Gridded(s) => s.$method($($arg),*),
            Self::Overlaid(s) => s.$method($($arg),*),
            Self::Measured(s) => s.$method($($arg),*),
            Self::Aggregated(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Short name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The processing step whose output this state holds.
    #[must_use]
    pub fn completed(&self) -> Option<StageName> {
        delegate!(self, completed)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Aggregated(_))
    }

    /// Advance to the next stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if already
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        match self.next()? {
            Some(next) => Ok(Advance::Next(next)),
            None => Err(PipelineError::Stage {
                stage: StageName::Aggregate,
                reason: "non-final stage produced no successor".to_owned(),
            }),
        }
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<PipelineResult, PipelineError> {
        delegate!(self, complete)
    }
}

// Lets the macro read the trait's associated constants through `&self`.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
    fn completed(&self) -> Option<StageName>;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }

    fn completed(&self) -> Option<StageName> {
        T::COMPLETED
    }
}

macro_rules! impl_from_stage {
    ($($variant:ident),* $(,)?) => {$(
        impl From<$variant> for Stage {
            fn from(s: $variant) -> Self {
                Self::$variant(s)
            }
        }
    )*};
}

impl_from_stage!(
    Pending,
    Classified,
    Labeled,
    Vectorized,
    Sanitized,
    Gridded,
    Overlaid,
    Measured,
    Aggregated,
);

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental landscape metrics pipeline.
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline from a categorical raster.
    ///
    /// The configuration and class value are validated up front so that
    /// no stage runs with parameters that would fail later.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSpacing`] or
    /// [`PipelineError::InvalidConfig`] for a bad configuration, and
    /// [`PipelineError::InvalidClassValue`] if the class value does not
    /// fit the raster's cell type.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(raster: CategoricalRaster, config: PipelineConfig) -> Result<Pending, PipelineError> {
        config.validate()?;
        raster.check_class_value(&config.class_value)?;
        Ok(Pending { config, raster })
    }

    /// Start a pipeline from already-vectorized patch polygons.
    ///
    /// Classification, labeling and vectorization are skipped; the
    /// polygons still go through the sanitizer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSpacing`] or
    /// [`PipelineError::InvalidConfig`] for a bad configuration.
    pub fn from_patches(
        patches: Vec<Patch>,
        config: PipelineConfig,
    ) -> Result<Vectorized, PipelineError> {
        config.validate()?;
        Ok(Vectorized { config, patches })
    }
}
