//! Velocity maps: regional before/after/correction and per station zooms.

use crate::error::Result;
use crate::geo::{DistanceMetric, within_radius};
use crate::models::insar::InsarDataset;
use crate::models::plane::CorrectionPlane;
use crate::models::station::Station;
use crate::plot::{ColorBar, Colormap, Figure, Layout, Marker, Panel, Series};
use crate::stats;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outlier fence factor for the regional map.
pub const REGIONAL_IQR_FACTOR: f64 = 2.0;
/// Outlier fence factor for station maps.
pub const STATION_IQR_FACTOR: f64 = 1.5;

/// Points kept after outlier removal, with their velocity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalPoints {
    pub longitudes: Vec<f64>,
    pub latitudes: Vec<f64>,
    pub velocities: Vec<f64>,
}

impl NormalPoints {
    pub fn len(&self) -> usize {
        self.velocities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velocities.is_empty()
    }
}

/// Keeps the points at `indexes` whose mean displacement lies inside the
/// Tukey fences computed over those same points.
pub fn filter_normal_points(dataset: &InsarDataset, indexes: &[usize], k: f64) -> NormalPoints {
    let candidates: Vec<(f64, f64, f64)> = indexes
        .iter()
        .filter_map(|&i| dataset.points.get(i))
        .filter_map(|p| {
            p.mean_displacement()
                .map(|v| (p.longitude, p.latitude, v))
        })
        .collect();
    let velocities: Vec<f64> = candidates.iter().map(|c| c.2).collect();
    let Some((lower, upper)) = stats::iqr_bounds(&velocities, k) else {
        return NormalPoints::default();
    };

    let mut normal = NormalPoints::default();
    for (lon, lat, v) in candidates {
        if v >= lower && v <= upper {
            normal.longitudes.push(lon);
            normal.latitudes.push(lat);
            normal.velocities.push(v);
        }
    }
    normal
}

fn all_indexes(dataset: &InsarDataset) -> Vec<usize> {
    (0..dataset.points.len()).collect()
}

/// Colour range shared by the before and after panels: mean ± 3 std.
pub fn shared_color_range(before: &NormalPoints, after: &NormalPoints) -> Option<(f64, f64)> {
    let before_mean = stats::mean(&before.velocities)?;
    let after_mean = stats::mean(&after.velocities)?;
    let before_std = stats::std_dev(&before.velocities).unwrap_or(0.0);
    let after_std = stats::std_dev(&after.velocities).unwrap_or(0.0);
    let mean = (before_mean + after_mean) / 2.0;
    let std = (before_std + after_std) / 2.0;
    Some((mean - 3.0 * std, mean + 3.0 * std))
}

fn value_range(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 1.0))
}

fn station_markers(stations: &[Station]) -> Vec<Marker> {
    stations
        .iter()
        .map(|s| Marker {
            x: s.longitude,
            y: s.latitude,
            label: s.name.clone(),
        })
        .collect()
}

fn map_panel(
    title: &str,
    points: &NormalPoints,
    values: Vec<f64>,
    colormap: Colormap,
    range: (f64, f64),
    bar_label: &str,
    radius: f64,
) -> Panel {
    let mut panel =
        Panel::new(title).labels("Longitude (decimal degrees)", "Latitude (decimal degrees)");
    panel.push(Series::ColorMapped {
        xs: points.longitudes.clone(),
        ys: points.latitudes.clone(),
        values,
        colormap,
        range,
        radius,
        opacity: 0.7,
    });
    panel.color_bar = Some(ColorBar {
        colormap,
        range,
        label: bar_label.to_string(),
    });
    panel
}

/// Regional map with before, after and correction plane panels.
///
/// Returns `None` when no velocity survives the outlier filter.
pub fn plot_global_velocity_map(
    before: &InsarDataset,
    after: &InsarDataset,
    stations: &[Station],
    plane: &CorrectionPlane,
    output_dir: &Path,
    title: &str,
    suffix: &str,
) -> Result<Option<PathBuf>> {
    let before_points = filter_normal_points(before, &all_indexes(before), REGIONAL_IQR_FACTOR);
    let after_points = filter_normal_points(after, &all_indexes(after), REGIONAL_IQR_FACTOR);
    let Some(range) = shared_color_range(&before_points, &after_points) else {
        warn!("No InSAR velocities left for the regional map, skipping it");
        return Ok(None);
    };

    let correction: Vec<f64> = before_points
        .longitudes
        .iter()
        .zip(before_points.latitudes.iter())
        .map(|(lon, lat)| plane.evaluate(*lon, *lat))
        .collect();
    let correction_range = value_range(&correction);

    let markers = station_markers(stations);
    let panels = vec![
        map_panel(
            "Before Alignment",
            &before_points,
            before_points.velocities.clone(),
            Colormap::Seismic,
            range,
            "Velocity (mm/year)",
            1.0,
        ),
        map_panel(
            "After Alignment",
            &after_points,
            after_points.velocities.clone(),
            Colormap::Seismic,
            range,
            "Velocity (mm/year)",
            1.0,
        ),
        map_panel(
            "Velocity Correction Plane",
            &before_points,
            correction,
            Colormap::Plasma,
            correction_range,
            "Correction Value (mm/year)",
            1.0,
        ),
    ];

    let mut figure = Figure::new(Layout::Vertical, 1400.0, 1000.0).title(title);
    for mut panel in panels {
        panel.markers = markers.clone();
        figure.add_panel(panel.equal_aspect());
    }

    let output_path = output_dir.join(format!("{suffix}_velocity_map_with_correction.svg"));
    figure.save(&output_path)?;
    info!(path = %output_path.display(), "Velocity map with correction saved");
    Ok(Some(output_path))
}

/// Before/after map of the points within `radius` metres (geodesic) of a station.
///
/// Returns `None` when no point survives the radius and outlier filters.
pub fn plot_station_velocity_map(
    before: &InsarDataset,
    after: &InsarDataset,
    station: &Station,
    radius: f64,
    output_dir: &Path,
) -> Result<Option<PathBuf>> {
    let centre = (station.latitude, station.longitude);
    let select = |dataset: &InsarDataset| {
        let indexes = within_radius(
            dataset.coordinates(),
            centre,
            radius,
            DistanceMetric::Geodesic,
        );
        filter_normal_points(dataset, &indexes, STATION_IQR_FACTOR)
    };
    let before_points = select(before);
    let after_points = select(after);
    if before_points.is_empty() && after_points.is_empty() {
        warn!(station = %station.name, radius, "No InSAR points for station velocity map");
        return Ok(None);
    }

    let marker = Marker {
        x: station.longitude,
        y: station.latitude,
        label: station.name.clone(),
    };
    let mut figure = Figure::new(Layout::Horizontal, 800.0, 800.0)
        .title(format!("Velocity Map for Station {}", station.name));
    for (title, points) in [
        ("Before Alignment", &before_points),
        ("After Alignment", &after_points),
    ] {
        let mut panel = map_panel(
            title,
            points,
            points.velocities.clone(),
            Colormap::Plasma,
            value_range(&points.velocities),
            "Velocity (mm/year)",
            4.0,
        )
        .labels("Longitude", "Latitude");
        panel.markers.push(marker.clone());
        figure.add_panel(panel);
    }

    let output_path = output_dir.join(format!("{}_velocity_map.svg", station.name));
    figure.save(&output_path)?;
    info!(station = %station.name, path = %output_path.display(), "Velocity map saved");
    Ok(Some(output_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::insar::InsarPoint;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn dataset(velocities: &[f64]) -> InsarDataset {
        InsarDataset {
            dates: vec![NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()],
            points: velocities
                .iter()
                .enumerate()
                .map(|(i, v)| InsarPoint {
                    latitude: 45.0 + i as f64 * 0.0001,
                    longitude: 9.0,
                    temporal_coherence: 0.9,
                    displacements: vec![*v],
                })
                .collect(),
        }
    }

    fn station() -> Station {
        Station {
            name: "ABCD".to_string(),
            latitude: 45.0,
            longitude: 9.0,
        }
    }

    #[test]
    fn outliers_are_removed() {
        let data = dataset(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let normal = filter_normal_points(&data, &all_indexes(&data), STATION_IQR_FACTOR);
        assert_eq!(normal.velocities, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(normal.latitudes.len(), 4);
    }

    #[test]
    fn points_without_data_are_dropped() {
        let data = dataset(&[1.0, f64::NAN, 2.0]);
        let normal = filter_normal_points(&data, &all_indexes(&data), REGIONAL_IQR_FACTOR);
        assert_eq!(normal.len(), 2);
    }

    #[test]
    fn shared_range_spans_three_deviations() {
        let before = NormalPoints {
            velocities: vec![0.0, 2.0],
            ..Default::default()
        };
        let after = NormalPoints {
            velocities: vec![2.0, 4.0],
            ..Default::default()
        };
        let (lo, hi) = shared_color_range(&before, &after).unwrap();
        let std = 2f64.sqrt();
        assert!((lo - (2.0 - 3.0 * std)).abs() < 1e-9);
        assert!((hi - (2.0 + 3.0 * std)).abs() < 1e-9);
        assert_eq!(shared_color_range(&NormalPoints::default(), &after), None);
    }

    #[test]
    fn writes_regional_map() {
        let dir = tempdir().unwrap();
        let data = dataset(&[1.0, 2.0, 3.0]);
        let plane = CorrectionPlane {
            a: 0.1,
            b: 0.2,
            c: 0.3,
        };
        let path = plot_global_velocity_map(
            &data,
            &data,
            &[station()],
            &plane,
            dir.path(),
            "Regional Velocity Map",
            "combined",
        )
        .unwrap()
        .unwrap();
        assert!(path.ends_with("combined_velocity_map_with_correction.svg"));
        let svg = fs::read_to_string(path).unwrap();
        assert!(svg.contains("Velocity Correction Plane"));
        assert_eq!(svg.matches("<polygon").count(), 3);
    }

    #[test]
    fn regional_map_is_skipped_without_velocities() {
        let dir = tempdir().unwrap();
        let empty = dataset(&[]);
        let plane = CorrectionPlane {
            a: 0.0,
            b: 0.0,
            c: 0.0,
        };
        let result =
            plot_global_velocity_map(&empty, &empty, &[], &plane, dir.path(), "t", "combined");
        assert_eq!(result.unwrap(), None);
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn station_map_uses_radius() {
        let dir = tempdir().unwrap();
        let data = dataset(&[1.0, 2.0, 3.0]);
        let written = plot_station_velocity_map(&data, &data, &station(), 50.0, dir.path())
            .unwrap()
            .unwrap();
        assert!(written.ends_with("ABCD_velocity_map.svg"));

        let far = Station {
            name: "FAR".to_string(),
            latitude: 46.0,
            longitude: 9.0,
        };
        assert_eq!(
            plot_station_velocity_map(&data, &data, &far, 50.0, dir.path()).unwrap(),
            None
        );
    }
}
