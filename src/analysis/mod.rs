//! Plot generation for the processed InSAR and GNSS data.
//!
//! - time_series: per station InSAR/GNSS comparison plots and trend slopes
//! - velocity_map: regional and per station velocity maps

pub mod time_series;
pub mod velocity_map;

use crate::config::WorkflowConfig;
use crate::error::{Result, WorkflowError};
use crate::models::insar::InsarDataset;
use crate::models::station::Station;
use crate::parser::{load_insar_csv, load_plane_parameters, load_stations};
use async_lock::Semaphore;
use serde::Serialize;
use std::{fs, path::Path, path::PathBuf, sync::Arc};
use time_series::{Comparison, StationComparison, compare_station};
use tracing::{debug, info};
use velocity_map::{plot_global_velocity_map, plot_station_velocity_map};

pub const SUMMARY_FILE: &str = "station_summary.json";

/// Outcome of the plotting step for one station.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StationReport {
    pub station: String,
    pub comparison: Option<StationComparison>,
    pub skipped_reason: Option<String>,
    pub velocity_map: Option<PathBuf>,
}

/// Everything produced by one plotting run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlotSummary {
    pub insar_radius_m: f64,
    pub min_temporal_coherence: f64,
    pub regional_map: Option<PathBuf>,
    pub stations: Vec<StationReport>,
}

impl PlotSummary {
    pub fn skipped(&self) -> impl Iterator<Item = &StationReport> {
        self.stations.iter().filter(|s| s.comparison.is_none())
    }
}

/// Shared by the station tasks. The time series use the coherence filtered
/// datasets, the velocity maps every point.
struct PlotInputs {
    data_dir: PathBuf,
    plots_dir: PathBuf,
    radius: f64,
    before: InsarDataset,
    after: InsarDataset,
    coherent_before: InsarDataset,
    coherent_after: InsarDataset,
}

fn report_station(inputs: &PlotInputs, station: &Station) -> Result<StationReport> {
    let comparison = compare_station(
        &inputs.data_dir,
        &inputs.plots_dir,
        &inputs.coherent_before,
        &inputs.coherent_after,
        station,
        inputs.radius,
    )?;
    let velocity_map = plot_station_velocity_map(
        &inputs.before,
        &inputs.after,
        station,
        inputs.radius,
        &inputs.plots_dir,
    )?;

    let (comparison, skipped_reason) = match comparison {
        Comparison::Done(c) => (Some(c), None),
        Comparison::Skipped(reason) => (None, Some(reason)),
    };
    Ok(StationReport {
        station: station.name.clone(),
        comparison,
        skipped_reason,
        velocity_map,
    })
}

/// Processes the stations with at most `threads` running at once.
///
/// Reports come back in station list order.
async fn report_stations(
    inputs: Arc<PlotInputs>,
    stations: Vec<Station>,
    threads: usize,
) -> Result<Vec<StationReport>> {
    let semaphore = Arc::new(Semaphore::new(threads.max(1)));
    let mut tasks = Vec::new();

    for station in stations {
        let inputs_clone = Arc::clone(&inputs);
        let semaphore_clone = Arc::clone(&semaphore);

        let task = smol::spawn(async move {
            let _permit = semaphore_clone.acquire().await;
            debug!(station = %station.name, "Processing station");
            println!("\n----------------------------------------");
            println!("🛰️  Processing station '{}'", station.name);
            smol::unblock(move || report_station(&inputs_clone, &station)).await
        });
        tasks.push(task);
    }

    let mut reports = Vec::with_capacity(tasks.len());
    for task in tasks {
        reports.push(task.await?);
    }
    Ok(reports)
}

/// Generates every plot: combined time series, regional map, station maps.
pub fn run_plots(config: &WorkflowConfig, threads: usize, suffix: &str) -> Result<PlotSummary> {
    let plots_dir = config.plots_dir();
    fs::create_dir_all(&plots_dir).map_err(|e| WorkflowError::io(&plots_dir, e))?;

    let before = load_insar_csv(&config.insar_before_path())?;
    let after = load_insar_csv(&config.insar_after_path())?;
    let coherent_before = before.filter_coherence(config.min_temporal_coherence);
    let coherent_after = after.filter_coherence(config.min_temporal_coherence);
    let stations = load_stations(&config.stations_path())?;
    let plane = load_plane_parameters(&config.parameters_path())?;
    info!(
        before = before.points.len(),
        after = after.points.len(),
        coherent_before = coherent_before.points.len(),
        coherent_after = coherent_after.points.len(),
        stations = stations.len(),
        "Inputs ready"
    );

    let regional_map = plot_global_velocity_map(
        &before,
        &after,
        &stations,
        &plane,
        &plots_dir,
        "Regional Velocity Map",
        suffix,
    )?;

    let inputs = Arc::new(PlotInputs {
        data_dir: config.data_dir.clone(),
        plots_dir: plots_dir.clone(),
        radius: config.insar_radius,
        before,
        after,
        coherent_before,
        coherent_after,
    });
    let reports = smol::block_on(report_stations(inputs, stations, threads))?;

    let summary = PlotSummary {
        insar_radius_m: config.insar_radius,
        min_temporal_coherence: config.min_temporal_coherence,
        regional_map,
        stations: reports,
    };
    write_summary(&plots_dir.join(SUMMARY_FILE), &summary)?;
    Ok(summary)
}

pub fn write_summary(path: &Path, summary: &PlotSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).map_err(|e| WorkflowError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridSettings;
    use tempfile::tempdir;

    const INSAR: &str = "latitude,longitude,temporal_coherence,20200101,20210101,20220101\n\
                         45.001,9.0,0.9,0.0,2.0,4.0\n\
                         45.0012,9.0001,0.95,0.5,2.5,4.5\n\
                         45.002,9.001,0.3,50.0,50.0,50.0\n\
                         45.5,9.5,0.8,1.0,1.0,1.0\n";

    fn write_inputs(dir: &Path) {
        fs::write(dir.join("insar.csv"), INSAR).unwrap();
        fs::write(dir.join("insar_aligned.csv"), INSAR).unwrap();
        fs::write(
            dir.join("stations_list"),
            "Station latitude longitude\nABCD 45.0 9.0\nNOGN 45.5 9.5\n",
        )
        .unwrap();
        fs::write(
            dir.join("parameters.csv"),
            "Plane Coefficient a,Plane Coefficient b,Plane Coefficient c\n0.1,0.2,0.3\n",
        )
        .unwrap();
        fs::write(
            dir.join("ABCD_NEU_TIME_2020_LOS.txt"),
            "58849.0 2020-01-01 00:00:00 0 0 0 1.0\n\
             59214.25 2021-01-01 06:00:00 0 0 0 3.0\n",
        )
        .unwrap();
    }

    fn config(dir: &Path) -> WorkflowConfig {
        WorkflowConfig {
            data_dir: dir.to_path_buf(),
            min_temporal_coherence: 0.7,
            insar_radius: 500.0,
            insar_file: "insar.csv".to_string(),
            stations_file: "stations_list".to_string(),
            grid: GridSettings {
                grid_size_km: 0.5,
                use_detrended: true,
                half_amplitude: true,
                multi_resolution: false,
                grid_sizes: vec![0.5],
            },
        }
    }

    #[test]
    fn produces_plots_and_summary() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path());

        let summary = run_plots(&config(dir.path()), 2, "combined").unwrap();

        assert_eq!(summary.stations.len(), 2);
        assert_eq!(summary.stations[0].station, "ABCD");
        let abcd = summary.stations[0].comparison.as_ref().unwrap();
        // The low coherence point is excluded.
        assert_eq!(abcd.points_before, 2);
        assert_eq!(summary.skipped().count(), 1);
        assert!(summary.stations[1].velocity_map.is_some());

        let plots = dir.path().join("plots");
        assert!(plots.join("ABCD_combined_plot.svg").exists());
        assert!(plots.join("combined_velocity_map_with_correction.svg").exists());
        assert!(plots.join("ABCD_velocity_map.svg").exists());
        assert_eq!(
            summary.regional_map,
            Some(plots.join("combined_velocity_map_with_correction.svg"))
        );

        let json = fs::read_to_string(plots.join(SUMMARY_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stations"][0]["station"], "ABCD");
        assert_eq!(value["insar_radius_m"], 500.0);
    }

    #[test]
    fn regional_map_keeps_low_coherence_points() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path());
        let insar = "latitude,longitude,temporal_coherence,20200101,20210101\n\
                     45.001,9.0,0.9,1.0,1.0\n\
                     45.002,9.0,0.9,2.0,2.0\n\
                     45.003,9.0,0.9,3.0,3.0\n\
                     45.004,9.0,0.2,2.5,2.5\n";
        fs::write(dir.path().join("insar.csv"), insar).unwrap();
        fs::write(dir.path().join("insar_aligned.csv"), insar).unwrap();

        let summary = run_plots(&config(dir.path()), 1, "combined").unwrap();

        // Four points on each of the three regional panels.
        let svg = fs::read_to_string(summary.regional_map.unwrap()).unwrap();
        assert_eq!(svg.matches("<circle").count(), 12);
        // The time series still drops the low coherence point.
        let abcd = summary.stations[0].comparison.as_ref().unwrap();
        assert_eq!(abcd.points_before, 3);
    }

    #[test]
    fn missing_velocities_skip_only_the_regional_map() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path());
        let insar = "latitude,longitude,temporal_coherence,20200101,20210101\n\
                     45.001,9.0,0.9,,\n";
        fs::write(dir.path().join("insar.csv"), insar).unwrap();
        fs::write(dir.path().join("insar_aligned.csv"), insar).unwrap();

        let summary = run_plots(&config(dir.path()), 1, "combined").unwrap();

        assert_eq!(summary.regional_map, None);
        assert_eq!(summary.stations.len(), 2);
        assert!(dir.path().join("plots").join(SUMMARY_FILE).exists());
    }

    #[test]
    fn missing_aligned_file_is_an_error() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path());
        fs::remove_file(dir.path().join("insar_aligned.csv")).unwrap();
        assert!(matches!(
            run_plots(&config(dir.path()), 1, "combined"),
            Err(WorkflowError::Csv { .. })
        ));
    }
}
