//! Gridded displacement amplitude analysis.
//!
//! Each InSAR point gets one amplitude (peak to peak of its series, optionally
//! detrended and halved). Points are binned into square cells of a given size
//! in km and the mean amplitude per cell is exported as CSV and as a heat map.

use crate::config::{GridSettings, WorkflowConfig};
use crate::error::{Result, WorkflowError};
use crate::models::insar::InsarDataset;
use crate::parser::load_insar_csv;
use crate::plot::{ColorBar, Colormap, Figure, Layout, Panel, Series};
use crate::stats;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// Kilometres per degree of latitude.
const KM_PER_DEGREE: f64 = 111.32;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub centre_lat: f64,
    pub centre_lon: f64,
    pub point_count: usize,
    pub mean_amplitude: f64,
}

/// Files produced for one grid size.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOutput {
    pub size_km: f64,
    pub cells: usize,
    pub csv_path: PathBuf,
    pub plot_path: PathBuf,
}

/// Amplitude of every point, `None` for points without data.
pub fn point_amplitudes(dataset: &InsarDataset, settings: &GridSettings) -> Vec<Option<f64>> {
    dataset
        .points
        .iter()
        .map(|p| {
            if settings.use_detrended {
                stats::amplitude(&stats::detrend(&p.displacements), settings.half_amplitude)
            } else {
                stats::amplitude(&p.displacements, settings.half_amplitude)
            }
        })
        .collect()
}

/// Bins amplitudes into `size_km` cells anchored at the south-west corner of the data.
pub fn grid_amplitudes(
    dataset: &InsarDataset,
    amplitudes: &[Option<f64>],
    size_km: f64,
) -> Vec<GridCell> {
    let located: Vec<(f64, f64, f64)> = dataset
        .points
        .iter()
        .zip(amplitudes.iter())
        .filter_map(|(p, a)| a.map(|a| (p.latitude, p.longitude, a)))
        .collect();
    if located.is_empty() {
        return Vec::new();
    }

    let min_lat = located.iter().map(|l| l.0).fold(f64::INFINITY, f64::min);
    let min_lon = located.iter().map(|l| l.1).fold(f64::INFINITY, f64::min);
    let mean_lat = located.iter().map(|l| l.0).sum::<f64>() / located.len() as f64;
    let lat_step = size_km / KM_PER_DEGREE;
    let lon_step = size_km / (KM_PER_DEGREE * mean_lat.to_radians().cos().max(1e-6));

    let mut bins: BTreeMap<(usize, usize), (f64, usize)> = BTreeMap::new();
    for (lat, lon, amplitude) in located {
        let row = ((lat - min_lat) / lat_step).floor() as usize;
        let col = ((lon - min_lon) / lon_step).floor() as usize;
        let entry = bins.entry((row, col)).or_insert((0.0, 0));
        entry.0 += amplitude;
        entry.1 += 1;
    }

    bins.into_iter()
        .map(|((row, col), (sum, count))| GridCell {
            row,
            col,
            centre_lat: min_lat + (row as f64 + 0.5) * lat_step,
            centre_lon: min_lon + (col as f64 + 0.5) * lon_step,
            point_count: count,
            mean_amplitude: sum / count as f64,
        })
        .collect()
}

fn write_cells(path: &Path, cells: &[GridCell]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| WorkflowError::csv(path, e))?;
    for cell in cells {
        writer
            .serialize(cell)
            .map_err(|e| WorkflowError::csv(path, e))?;
    }
    writer.flush().map_err(|e| WorkflowError::io(path, e))
}

fn size_label(size_km: f64) -> String {
    format!("{size_km}").replace('.', "p")
}

fn heat_map(cells: &[GridCell], size_km: f64, settings: &GridSettings) -> Figure {
    let values: Vec<f64> = cells.iter().map(|c| c.mean_amplitude).collect();
    let range = (
        values.iter().copied().fold(f64::INFINITY, f64::min),
        values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    );
    let kind = match (settings.use_detrended, settings.half_amplitude) {
        (true, true) => "Detrended half amplitude",
        (true, false) => "Detrended amplitude",
        (false, true) => "Half amplitude",
        (false, false) => "Amplitude",
    };

    let mut panel = Panel::new(format!("{kind}, {size_km} km grid"))
        .labels("Longitude (decimal degrees)", "Latitude (decimal degrees)")
        .equal_aspect();
    panel.push(Series::ColorMapped {
        xs: cells.iter().map(|c| c.centre_lon).collect(),
        ys: cells.iter().map(|c| c.centre_lat).collect(),
        values,
        colormap: Colormap::Plasma,
        range,
        radius: 4.0,
        opacity: 0.9,
    });
    panel.color_bar = Some(ColorBar {
        colormap: Colormap::Plasma,
        range,
        label: "Amplitude (mm)".to_string(),
    });

    let mut figure =
        Figure::new(Layout::Vertical, 1000.0, 900.0).title("Grid Amplitude Analysis");
    figure.add_panel(panel);
    figure
}

/// Runs the analysis for every configured grid size.
pub fn run_grid_analysis(config: &WorkflowConfig) -> Result<Vec<GridOutput>> {
    let dataset = load_insar_csv(&config.insar_before_path())?
        .filter_coherence(config.min_temporal_coherence);
    let amplitudes = point_amplitudes(&dataset, &config.grid);
    if amplitudes.iter().all(Option::is_none) {
        return Err(WorkflowError::EmptyData(
            "no InSAR point has displacement data".to_string(),
        ));
    }

    let plots_dir = config.plots_dir();
    fs::create_dir_all(&plots_dir).map_err(|e| WorkflowError::io(&plots_dir, e))?;

    let mut outputs = Vec::new();
    for size_km in config.grid.sizes_to_run() {
        let cells = grid_amplitudes(&dataset, &amplitudes, size_km);
        let label = size_label(size_km);
        let csv_path = config.data_dir.join(format!("grid_amplitude_{label}km.csv"));
        let plot_path = plots_dir.join(format!("grid_amplitude_{label}km.svg"));

        write_cells(&csv_path, &cells)?;
        heat_map(&cells, size_km, &config.grid).save(&plot_path)?;
        info!(size_km, cells = cells.len(), path = %csv_path.display(), "Grid amplitudes written");

        outputs.push(GridOutput {
            size_km,
            cells: cells.len(),
            csv_path,
            plot_path,
        });
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::insar::InsarPoint;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn settings(use_detrended: bool, half_amplitude: bool) -> GridSettings {
        GridSettings {
            grid_size_km: 1.0,
            use_detrended,
            half_amplitude,
            multi_resolution: true,
            grid_sizes: vec![1.0, 5.0],
        }
    }

    fn point(lat: f64, lon: f64, displacements: Vec<f64>) -> InsarPoint {
        InsarPoint {
            latitude: lat,
            longitude: lon,
            temporal_coherence: 0.9,
            displacements,
        }
    }

    fn dataset() -> InsarDataset {
        InsarDataset {
            dates: (1..=4)
                .map(|m| NaiveDate::from_ymd_opt(2020, m, 1).unwrap())
                .collect(),
            points: vec![
                point(45.0, 9.0, vec![0.0, 4.0, 0.0, 4.0]),
                point(45.001, 9.001, vec![0.0, 2.0, 0.0, 2.0]),
                point(45.05, 9.0, vec![0.0, 1.0, 2.0, 3.0]),
                point(45.05, 9.0, vec![f64::NAN; 4]),
            ],
        }
    }

    #[test]
    fn detrending_removes_linear_motion() {
        let amplitudes = point_amplitudes(&dataset(), &settings(true, false));
        assert!(amplitudes[2].unwrap().abs() < 1e-9);
        assert_eq!(amplitudes[3], None);

        let raw = point_amplitudes(&dataset(), &settings(false, true));
        assert_eq!(raw[0], Some(2.0));
        assert_eq!(raw[2], Some(1.5));
    }

    #[test]
    fn bins_points_into_cells() {
        let data = dataset();
        let amplitudes = point_amplitudes(&data, &settings(false, false));
        let cells = grid_amplitudes(&data, &amplitudes, 1.0);

        // Two nearby points share a cell, the northern one (~5.5 km) gets its own.
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].point_count, 2);
        assert_eq!(cells[0].mean_amplitude, 3.0);
        assert_eq!(cells[1].point_count, 1);
        assert!(cells[1].row > 0);

        let coarse = grid_amplitudes(&data, &amplitudes, 10.0);
        assert_eq!(coarse.len(), 1);
        assert_eq!(coarse[0].point_count, 3);
    }

    #[test]
    fn size_labels_are_file_friendly() {
        assert_eq!(size_label(0.25), "0p25");
        assert_eq!(size_label(5.0), "5");
    }

    #[test]
    fn writes_one_output_per_size() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("insar.csv"),
            "latitude,longitude,temporal_coherence,20200101,20200201,20200301\n\
             45.0,9.0,0.9,0,3,0\n\
             45.02,9.02,0.9,1,2,1\n",
        )
        .unwrap();
        let config = WorkflowConfig {
            data_dir: dir.path().to_path_buf(),
            min_temporal_coherence: 0.7,
            insar_radius: 500.0,
            insar_file: "insar.csv".to_string(),
            stations_file: "stations_list".to_string(),
            grid: settings(false, true),
        };

        let outputs = run_grid_analysis(&config).unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].csv_path.ends_with("grid_amplitude_1km.csv"));
        assert!(outputs[1].plot_path.exists());

        let csv = fs::read_to_string(&outputs[0].csv_path).unwrap();
        assert!(csv.starts_with("row,col,centre_lat,centre_lon,point_count,mean_amplitude"));
        assert_eq!(csv.lines().count(), 3);
    }
}
