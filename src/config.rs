//! Resolved workflow configuration.
//!
//! Built once from the command line (or environment), validated, and then
//! shared read-only by every step.

use crate::error::{Result, WorkflowError};
use crate::ui::cli::GlobalArgs;
use std::path::{Path, PathBuf};

const PARAMETERS_FILE: &str = "parameters.csv";
const PLOTS_DIR: &str = "plots";

/// Settings of the gridded amplitude analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSettings {
    pub grid_size_km: f64,
    pub use_detrended: bool,
    pub half_amplitude: bool,
    pub multi_resolution: bool,
    pub grid_sizes: Vec<f64>,
}

impl GridSettings {
    /// Grid sizes to process for the current resolution mode.
    pub fn sizes_to_run(&self) -> Vec<f64> {
        if self.multi_resolution {
            self.grid_sizes.clone()
        } else {
            vec![self.grid_size_km]
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub data_dir: PathBuf,
    pub min_temporal_coherence: f64,
    pub insar_radius: f64,
    pub insar_file: String,
    pub stations_file: String,
    pub grid: GridSettings,
}

/// Parses a comma separated list of positive grid sizes.
pub fn parse_grid_sizes(value: &str) -> Result<Vec<f64>> {
    let sizes = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .ok_or_else(|| WorkflowError::Config(format!("invalid grid size '{s}'")))
        })
        .collect::<Result<Vec<f64>>>()?;
    if sizes.is_empty() {
        return Err(WorkflowError::Config("GRID_SIZES is empty".to_string()));
    }
    Ok(sizes)
}

fn format_flag(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

/// `<stem>_aligned.<ext>` next to the original file.
pub fn aligned_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_aligned.{}", ext.to_string_lossy()),
        None => format!("{stem}_aligned"),
    };
    path.with_file_name(name)
}

impl WorkflowConfig {
    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        let data_dir = args.data_dir.as_ref().ok_or_else(|| {
            WorkflowError::Config("DATA_DIR environment variable is not set".to_string())
        })?;
        if !data_dir.is_dir() {
            return Err(WorkflowError::Config(format!(
                "data directory '{}' does not exist or is not a directory",
                data_dir.display()
            )));
        }
        let data_dir = data_dir
            .canonicalize()
            .map_err(|e| WorkflowError::io(data_dir, e))?;

        if !(0.0..=1.0).contains(&args.min_temporal_coherence) {
            return Err(WorkflowError::Config(format!(
                "MIN_TEMPORAL_COHERENCE must lie in [0, 1], got {}",
                args.min_temporal_coherence
            )));
        }
        if args.insar_radius == 0 {
            return Err(WorkflowError::Config(
                "INSAR_RADIUS must be positive".to_string(),
            ));
        }
        if !(args.grid_size_km.is_finite() && args.grid_size_km > 0.0) {
            return Err(WorkflowError::Config(format!(
                "GRID_SIZE_KM must be positive, got {}",
                args.grid_size_km
            )));
        }

        Ok(WorkflowConfig {
            data_dir,
            min_temporal_coherence: args.min_temporal_coherence,
            insar_radius: f64::from(args.insar_radius),
            insar_file: args.insar_file.clone(),
            stations_file: args.stations_file.clone(),
            grid: GridSettings {
                grid_size_km: args.grid_size_km,
                use_detrended: args.use_detrended,
                half_amplitude: args.half_amplitude,
                multi_resolution: args.multi_resolution,
                grid_sizes: parse_grid_sizes(&args.grid_sizes)?,
            },
        })
    }

    pub fn stations_path(&self) -> PathBuf {
        self.data_dir.join(&self.stations_file)
    }

    pub fn parameters_path(&self) -> PathBuf {
        self.data_dir.join(PARAMETERS_FILE)
    }

    pub fn insar_before_path(&self) -> PathBuf {
        self.data_dir.join(&self.insar_file)
    }

    pub fn insar_after_path(&self) -> PathBuf {
        aligned_path(&self.insar_before_path())
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.data_dir.join(PLOTS_DIR)
    }

    /// Environment exported to external steps.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let sizes = self
            .grid
            .grid_sizes
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            ("DATA_DIR".into(), self.data_dir.display().to_string()),
            (
                "MIN_TEMPORAL_COHERENCE".into(),
                self.min_temporal_coherence.to_string(),
            ),
            ("INSAR_RADIUS".into(), self.insar_radius.to_string()),
            ("INSAR_FILE".into(), self.insar_file.clone()),
            ("STATIONS_FILE".into(), self.stations_file.clone()),
            ("GRID_SIZE_KM".into(), self.grid.grid_size_km.to_string()),
            ("USE_DETRENDED".into(), format_flag(self.grid.use_detrended)),
            ("HALF_AMPLITUDE".into(), format_flag(self.grid.half_amplitude)),
            (
                "MULTI_RESOLUTION".into(),
                format_flag(self.grid.multi_resolution),
            ),
            ("GRID_SIZES".into(), sizes),
        ]
    }
}
