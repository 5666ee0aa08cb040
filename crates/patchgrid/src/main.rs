//! patchgrid: per-grid-cell landscape patch metrics.
//!
//! Extracts one class from a categorical raster, labels its 8-connected
//! patches, converts them to polygons and reports, for every cell of a
//! regular grid, the patch area, perimeter and patch count inside it.
//!
//! # Usage
//!
//! ```text
//! patchgrid [OPTIONS] --output <TABLE> <RASTER>
//! patchgrid [OPTIONS] --output <TABLE> --patches <GEOJSON>
//! ```
//!
//! The output format follows the table's extension (`.csv`, `.geojson`).
//! Per-stage diagnostics are printed to stdout; logs go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use patchgrid_pipeline::{
    CategoricalRaster, Clock, LabelingMode, Patch, Pipeline, PipelineConfig, PipelineDiagnostics,
    PipelineError, Stage,
};
use tracing_subscriber::EnvFilter;

/// Per-grid-cell patch metrics from a classified raster.
///
/// Reads a categorical raster (GeoTIFF or ESRI ASCII grid), extracts the
/// cells equal to `--class-value` and writes one row per grid cell that
/// contains part of a patch.
#[derive(Parser)]
#[command(name = "patchgrid", version)]
struct Cli {
    /// Input raster (`.tif`, `.tiff` or `.asc`).
    #[arg(required_unless_present = "patches", conflicts_with = "patches")]
    raster: Option<PathBuf>,

    /// Start from a GeoJSON polygon layer instead of a raster.
    #[arg(long)]
    patches: Option<PathBuf>,

    /// Class value to extract, parsed against the raster's cell type.
    #[arg(long, default_value = PipelineConfig::DEFAULT_CLASS_VALUE)]
    class_value: String,

    /// Grid spacing in CRS units.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SPACING)]
    spacing: f64,

    /// Label in horizontal bands of this many rows, in parallel.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    band_rows: Option<u32>,

    /// Intersect grid cells with patches on a single thread.
    #[arg(long)]
    sequential_overlay: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Output table (`.csv`, `.geojson` or `.json`).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Directory for intermediate layers (class mask, labels, patch
    /// polygons, grid).
    #[arg(long)]
    intermediates: Option<PathBuf>,

    /// Number of runs for averaging stage timings.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Where the pipeline starts.
enum Input {
    Raster(CategoricalRaster),
    Patches(Vec<Patch>),
}

impl Input {
    fn load(cli: &Cli) -> Result<Self, patchgrid_io::IoError> {
        match (&cli.raster, &cli.patches) {
            (_, Some(path)) => patchgrid_io::read_patches(path).map(Self::Patches),
            (Some(path), None) => patchgrid_io::read_raster(path).map(Self::Raster),
            // clap requires one of the two
            (None, None) => Ok(Self::Patches(Vec::new())),
        }
    }

    fn crs(&self) -> Option<&str> {
        match self {
            Self::Raster(raster) => raster.crs(),
            Self::Patches(_) => None,
        }
    }

    fn start(&self, config: PipelineConfig) -> Result<Stage, PipelineError> {
        Ok(match self {
            Self::Raster(raster) => Pipeline::new(raster.clone(), config)?.into(),
            Self::Patches(patches) => Pipeline::from_patches(patches.clone(), config)?.into(),
        })
    }
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        class_value: cli.class_value.clone(),
        spacing: cli.spacing,
        labeling: cli
            .band_rows
            .map_or(LabelingMode::Auto, |rows| LabelingMode::Banded { rows }),
        parallel_overlay: !cli.sequential_overlay,
    })
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let input = match Input::load(&cli) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("I/O error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        class_value = %config.class_value,
        spacing = config.spacing,
        runs = cli.runs,
        "starting",
    );

    if let Some(ref dir) = cli.intermediates
        && let Err(msg) = write_intermediates(dir, &input, &config)
    {
        eprintln!("{msg}");
        return ExitCode::FAILURE;
    }

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut last_result = None;

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let outcome = input
            .start(config.clone())
            .and_then(|start| patchgrid_pipeline::process_with_diagnostics(start, &StdClock));
        match outcome {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
                last_result = Some(result);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    let Some(result) = last_result else {
        return ExitCode::FAILURE;
    };
    if let Some(ref output) = cli.output
        && let Err(e) = patchgrid_io::write_table(&result.summaries, output, input.crs())
    {
        eprintln!("I/O error: {e}");
        return ExitCode::FAILURE;
    }

    eprintln!("{} rows", result.summaries.len());
    ExitCode::SUCCESS
}

/// Drive the stages once, saving each intermediate layer under `dir`.
fn write_intermediates(dir: &Path, input: &Input, config: &PipelineConfig) -> Result<(), String> {
    let pipeline_error = |e: PipelineError| format!("Pipeline error: {e}");
    let io_error = |e: patchgrid_io::IoError| format!("I/O error: {e}");
    let export_error = |e: patchgrid_export::ExportError| format!("Export error: {e}");
    let crs = input.crs();

    let vectorized = match input {
        Input::Raster(raster) => {
            let classified = Pipeline::new(raster.clone(), config.clone())
                .and_then(patchgrid_pipeline::pipeline::Pending::classify)
                .map_err(pipeline_error)?;
            patchgrid_io::write_raster(classified.mask(), &dir.join("class_area.tif"))
                .map_err(io_error)?;
            let labeled = classified.label().map_err(pipeline_error)?;
            patchgrid_io::write_raster(labeled.labels(), &dir.join("labelled_patches.tif"))
                .map_err(io_error)?;
            labeled.vectorize()
        }
        Input::Patches(patches) => {
            Pipeline::from_patches(patches.clone(), config.clone()).map_err(pipeline_error)?
        }
    };

    let sanitized = vectorized.sanitize();
    let layer =
        patchgrid_export::patches_to_geojson(sanitized.patches(), crs).map_err(export_error)?;
    patchgrid_io::write_text(&dir.join("vector_patches.geojson"), &layer).map_err(io_error)?;

    let gridded = sanitized.grid().map_err(pipeline_error)?;
    let grid = patchgrid_export::grid_to_geojson(gridded.cells(), crs).map_err(export_error)?;
    patchgrid_io::write_text(&dir.join("grid.geojson"), &grid).map_err(io_error)?;

    tracing::info!(dir = %dir.display(), "wrote intermediates");
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for name in patchgrid_pipeline::StageName::ALL {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .flat_map(PipelineDiagnostics::stages)
            .filter(|(stage, _)| *stage == name)
            .map(|(_, diag)| diag.duration.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{:<24} {stage_mean:>10.3}ms", name.as_str());
    }

    let fingerprints: std::collections::BTreeSet<u64> = all_diagnostics
        .iter()
        .map(|d| d.summary.fingerprint)
        .collect();
    if fingerprints.len() > 1 {
        println!();
        println!("Warning: output fingerprint differed between runs");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_config() {
        let cli = Cli::parse_from([
            "patchgrid",
            "landcover.tif",
            "--class-value",
            "31",
            "--spacing",
            "250",
            "--band-rows",
            "64",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.class_value, "31");
        assert!((config.spacing - 250.0).abs() < f64::EPSILON);
        assert_eq!(config.labeling, LabelingMode::Banded { rows: 64 });
        assert!(config.parallel_overlay);
    }

    #[test]
    fn labeling_defaults_to_pipeline_default() {
        let cli = Cli::parse_from(["patchgrid", "landcover.tif"]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.labeling, PipelineConfig::default().labeling);
        assert_eq!(config.labeling, LabelingMode::Auto);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "patchgrid",
            "--patches",
            "patches.geojson",
            "--spacing",
            "250",
            "--config-json",
            r#"{"class_value": "2", "spacing": 50.0}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.class_value, "2");
        assert!((config.spacing - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn raster_and_patches_are_exclusive() {
        assert!(
            Cli::try_parse_from(["patchgrid", "a.tif", "--patches", "b.geojson"]).is_err()
        );
        assert!(Cli::try_parse_from(["patchgrid"]).is_err());
    }
}
