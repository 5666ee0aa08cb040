//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! Every call to [`process_with_diagnostics`](crate::process_with_diagnostics)
//! collects diagnostics alongside the pipeline result. The command-line
//! tool prints them as a table or as JSON for benchmarking.
//!
//! This crate never reads a clock itself: callers pass a [`Clock`], so the
//! core stays free of platform time sources and tests can use a fake one.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Patch, StageName};

/// Monotonic time source used to time pipeline stages.
pub trait Clock {
    /// A point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// Each field captures metrics for one stage. A field is `None` when the
/// run started past that stage, e.g. the raster stages of a run fed with
/// polygons.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: classification.
    pub classify: Option<StageDiagnostics>,
    /// Stage 2: connected-component labeling.
    pub label: Option<StageDiagnostics>,
    /// Stage 3: vectorization.
    pub vectorize: Option<StageDiagnostics>,
    /// Stage 4: geometry repair.
    pub sanitize: Option<StageDiagnostics>,
    /// Stage 5: grid generation.
    pub grid: Option<StageDiagnostics>,
    /// Stage 6: overlay.
    pub overlay: Option<StageDiagnostics>,
    /// Stage 7: measurement.
    pub measure: Option<StageDiagnostics>,
    /// Stage 8: aggregation.
    pub aggregate: Option<StageDiagnostics>,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Classification metrics.
    Classify {
        /// Raster width in cells.
        width: u32,
        /// Raster height in cells.
        height: u32,
        /// Input cell type name.
        cell_type: String,
        /// Class value as configured.
        class_value: String,
        /// Cells equal to the class value.
        foreground_cells: usize,
        /// All cells.
        total_cells: usize,
    },
    /// Labeling metrics.
    Label {
        /// Labeling schedule used.
        mode: String,
        /// Number of patches found.
        patch_count: usize,
    },
    /// Vectorization metrics.
    Vectorize {
        /// Number of patches.
        patch_count: usize,
        /// Polygons across all patches.
        polygon_count: usize,
        /// Interior rings across all patches.
        hole_count: usize,
        /// Ring vertices across all patches.
        vertex_count: usize,
    },
    /// Geometry repair metrics.
    Sanitize {
        /// Patches kept.
        kept: usize,
        /// Patches dropped for lack of area.
        dropped: usize,
        /// Kept patches whose geometry changed.
        repaired: usize,
    },
    /// Grid generation metrics.
    Grid {
        /// Cell size.
        spacing: f64,
        /// Generated cells.
        cell_count: usize,
    },
    /// Overlay metrics.
    Overlay {
        /// Non-empty fragments.
        fragment_count: usize,
        /// Whether cells were processed on the thread pool.
        parallel: bool,
    },
    /// Measurement metrics.
    Measure {
        /// Measured fragments.
        fragment_count: usize,
        /// Sum of fragment areas.
        total_area: f64,
        /// Sum of fragment perimeters.
        total_perimeter: f64,
    },
    /// Aggregation metrics.
    Aggregate {
        /// Output rows.
        row_count: usize,
        /// Order-sensitive hash of the output rows.
        fingerprint: u64,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Patches found or supplied.
    pub patch_count: usize,
    /// Patches dropped by the sanitizer.
    pub dropped_patches: usize,
    /// Generated grid cells.
    pub grid_cell_count: usize,
    /// Non-empty overlay fragments.
    pub fragment_count: usize,
    /// Output rows.
    pub row_count: usize,
    /// Order-sensitive hash of the output rows.
    pub fingerprint: u64,
}

impl PipelineDiagnostics {
    /// Store diagnostics for the stage whose output has just been produced.
    pub fn record(&mut self, stage: StageName, diagnostics: StageDiagnostics) {
        let slot = match stage {
            StageName::Classify => &mut self.classify,
            StageName::Label => &mut self.label,
            StageName::Vectorize => &mut self.vectorize,
            StageName::Sanitize => &mut self.sanitize,
            StageName::Grid => &mut self.grid,
            StageName::Overlay => &mut self.overlay,
            StageName::Measure => &mut self.measure,
            StageName::Aggregate => &mut self.aggregate,
        };
        *slot = Some(diagnostics);
    }

    /// Diagnostics of the stages that ran, in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<(StageName, &StageDiagnostics)> {
        [
            (StageName::Classify, &self.classify),
            (StageName::Label, &self.label),
            (StageName::Vectorize, &self.vectorize),
            (StageName::Sanitize, &self.sanitize),
            (StageName::Grid, &self.grid),
            (StageName::Overlay, &self.overlay),
            (StageName::Measure, &self.measure),
            (StageName::Aggregate, &self.aggregate),
        ]
        .into_iter()
        .filter_map(|(name, diag)| diag.as_ref().map(|d| (name, d)))
        .collect()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Patches: {} ({} dropped)  |  Grid cells: {}",
            self.summary.patch_count, self.summary.dropped_patches, self.summary.grid_cell_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{:<24} {ms:>8.3}ms {pct:>9.1}%  {details}", name.as_str()));
        }

        lines.push(String::new());
        lines.push(format!(
            "Fragments: {}  |  Rows: {}  |  Fingerprint: {:016x}",
            self.summary.fragment_count, self.summary.row_count, self.summary.fingerprint,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Classify {
            width,
            height,
            cell_type,
            class_value,
            foreground_cells,
            total_cells,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let share = if *total_cells > 0 {
                *foreground_cells as f64 / *total_cells as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "{width}x{height} {cell_type} class={class_value} fg={foreground_cells} ({share:.1}%)"
            )
        }
        StageMetrics::Label { mode, patch_count } => format!("{mode} {patch_count} patches"),
        StageMetrics::Vectorize {
            patch_count,
            polygon_count,
            hole_count,
            vertex_count,
        } => format!(
            "{patch_count} patches, {polygon_count} polys, {hole_count} holes, {vertex_count} pts"
        ),
        StageMetrics::Sanitize {
            kept,
            dropped,
            repaired,
        } => format!("kept={kept} dropped={dropped} repaired={repaired}"),
        StageMetrics::Grid {
            spacing,
            cell_count,
        } => format!("spacing={spacing} {cell_count} cells"),
        StageMetrics::Overlay {
            fragment_count,
            parallel,
        } => {
            let mode = if *parallel { "parallel" } else { "sequential" };
            format!("{mode} {fragment_count} fragments")
        }
        StageMetrics::Measure {
            fragment_count,
            total_area,
            total_perimeter,
        } => format!("{fragment_count} fragments area={total_area:.3} perim={total_perimeter:.3}"),
        StageMetrics::Aggregate {
            row_count,
            fingerprint,
        } => format!("{row_count} rows fp={fingerprint:016x}"),
    }
}

/// Ring and vertex counts for a set of patches.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct GeometryStats {
    /// Polygons across all patches.
    pub polygons: usize,
    /// Interior rings.
    pub holes: usize,
    /// Ring vertices, closing vertices included.
    pub vertices: usize,
}

pub(crate) fn geometry_stats(patches: &[Patch]) -> GeometryStats {
    let mut stats = GeometryStats::default();
    for polygon in patches.iter().flat_map(|p| &p.geometry.0) {
        stats.polygons += 1;
        stats.holes += polygon.interiors().len();
        stats.vertices += polygon.exterior().0.len()
            + polygon.interiors().iter().map(|r| r.0.len()).sum::<usize>();
    }
    stats
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{MultiPolygon, polygon};

    use super::*;

    fn stage(ms: u64, metrics: StageMetrics) -> StageDiagnostics {
        StageDiagnostics {
            duration: Duration::from_millis(ms),
            metrics,
        }
    }

    fn sample() -> PipelineDiagnostics {
        let mut diag = PipelineDiagnostics {
            total_duration: Duration::from_millis(40),
            summary: PipelineSummary {
                patch_count: 3,
                dropped_patches: 1,
                grid_cell_count: 4,
                fragment_count: 5,
                row_count: 2,
                fingerprint: 0xdead_beef,
            },
            ..PipelineDiagnostics::default()
        };
        diag.record(
            StageName::Sanitize,
            stage(
                10,
                StageMetrics::Sanitize {
                    kept: 2,
                    dropped: 1,
                    repaired: 1,
                },
            ),
        );
        diag.record(
            StageName::Grid,
            stage(
                30,
                StageMetrics::Grid {
                    spacing: 300.0,
                    cell_count: 4,
                },
            ),
        );
        diag
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn stages_are_listed_in_execution_order() {
        let diag = sample();
        let names: Vec<StageName> = diag.stages().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec![StageName::Sanitize, StageName::Grid]);
    }

    #[test]
    fn report_produces_nonempty_string() {
        let report = sample().report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        assert!(report.contains("sanitize"));
        assert!(report.contains("kept=2 dropped=1 repaired=1"));
        assert!(report.contains("75.0%"));
        assert!(report.contains("00000000deadbeef"));
        assert!(!report.contains("classify"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!((json["total_duration"].as_f64().unwrap() - 0.04).abs() < 1e-12);
        assert!((json["grid"]["duration"].as_f64().unwrap() - 0.03).abs() < 1e-12);
        assert!(json["classify"].is_null());

        let back: PipelineDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_duration, Duration::from_millis(40));
        assert_eq!(back.grid.unwrap().metrics, sample().grid.unwrap().metrics);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<PipelineDiagnostics>(json).is_err());
    }

    #[test]
    fn geometry_stats_counts_rings_and_vertices() {
        let patch = Patch {
            id: 1,
            geometry: MultiPolygon::new(vec![polygon![
                exterior: [
                    (x: 0.0, y: 0.0),
                    (x: 4.0, y: 0.0),
                    (x: 4.0, y: 4.0),
                    (x: 0.0, y: 4.0),
                ],
                interiors: [[
                    (x: 1.0, y: 1.0),
                    (x: 1.0, y: 2.0),
                    (x: 2.0, y: 2.0),
                    (x: 2.0, y: 1.0),
                ]],
            ]]),
        };
        assert_eq!(
            geometry_stats(&[patch]),
            GeometryStats {
                polygons: 1,
                holes: 1,
                vertices: 10,
            }
        );
        assert_eq!(geometry_stats(&[]), GeometryStats::default());
    }
}
