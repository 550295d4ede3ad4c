//! Combined InSAR / GNSS time series per station.

use crate::error::Result;
use crate::geo::{DistanceMetric, within_radius};
use crate::models::gnss::GnssSeries;
use crate::models::insar::InsarDataset;
use crate::models::station::Station;
use crate::parser::{find_gnss_file, load_gnss_file};
use crate::plot::{Figure, Layout, Panel, Rgb, Series, date_to_axis};
use crate::stats::{LinearFit, linear_regression};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Trend comparison for one station, also written to the JSON summary.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StationComparison {
    pub station: String,
    pub gnss_file: PathBuf,
    pub gnss_samples: usize,
    pub points_before: usize,
    pub points_after: usize,
    /// InSAR trends in mm per calendar year, fitted against decimal years
    /// since the first acquisition rather than the acquisition index.
    pub slope_before: Option<f64>,
    pub slope_after: Option<f64>,
    pub slope_gnss: Option<f64>,
    pub plot_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Done(StationComparison),
    Skipped(String),
}

/// Averaged InSAR series around a station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationAverage {
    pub point_count: usize,
    pub series: Vec<f64>,
}

/// Mean displacement per acquisition of the points within `radius` metres.
pub fn average_within_radius(
    dataset: &InsarDataset,
    station: &Station,
    radius: f64,
) -> StationAverage {
    let indexes = within_radius(
        dataset.coordinates(),
        (station.latitude, station.longitude),
        radius,
        DistanceMetric::Haversine,
    );
    StationAverage {
        point_count: indexes.len(),
        series: dataset.average_series(&indexes),
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn trend_label(prefix: &str, fit: Option<LinearFit>) -> String {
    match fit {
        Some(fit) => format!("{prefix} (Slope: {:.5} mm/year)", fit.slope),
        None => format!("{prefix} (Slope: n/a)"),
    }
}

fn trend_series(xs_axis: &[f64], xs_years: &[f64], fit: LinearFit, color: Rgb, label: String) -> Series {
    Series::Line {
        xs: xs_axis.to_vec(),
        ys: xs_years.iter().map(|x| fit.predict(*x)).collect(),
        color,
        label: Some(label),
        width: 2.5,
    }
}

/// Inputs of the two panel comparison figure.
pub struct CombinedPlotData<'a> {
    pub station: &'a str,
    pub dates: &'a [NaiveDate],
    pub insar_years: &'a [f64],
    pub before: &'a [f64],
    pub after: &'a [f64],
    pub gnss: &'a GnssSeries,
    pub fit_before: Option<LinearFit>,
    pub fit_after: Option<LinearFit>,
    pub fit_gnss: Option<LinearFit>,
}

pub fn build_combined_figure(data: &CombinedPlotData<'_>) -> Figure {
    let insar_axis: Vec<f64> = data.dates.iter().map(|d| date_to_axis(midnight(*d))).collect();
    let gnss_axis: Vec<f64> = data.gnss.dates().into_iter().map(date_to_axis).collect();
    let gnss_years = data.gnss.decimal_years();

    let mut top = Panel::new(format!(
        "InSAR Time Series Before Alignment - Station {}",
        data.station
    ))
    .labels("", "Displacement (mm)")
    .date_axis();
    top.push(Series::Points {
        xs: insar_axis.clone(),
        ys: data.before.to_vec(),
        color: Rgb::RED,
        label: Some("Before Alignment (Displacement)".to_string()),
        radius: 2.0,
    });
    if let Some(fit) = data.fit_before {
        top.push(trend_series(
            &insar_axis,
            data.insar_years,
            fit,
            Rgb::RED,
            trend_label("Trend", Some(fit)),
        ));
    }

    let mut bottom = Panel::new(format!(
        "Combined InSAR After Alignment and GNSS LOS - Station {}",
        data.station
    ))
    .labels("TIME (YYYY-MM-DD)", "Displacement (mm)")
    .date_axis();
    bottom.push(Series::Points {
        xs: insar_axis.clone(),
        ys: data.after.to_vec(),
        color: Rgb::BLUE,
        label: Some("After Alignment (Displacement)".to_string()),
        radius: 2.0,
    });
    if let Some(fit) = data.fit_after {
        bottom.push(trend_series(
            &insar_axis,
            data.insar_years,
            fit,
            Rgb::BLUE,
            trend_label("InSAR Trend", Some(fit)),
        ));
    }
    bottom.push(Series::Points {
        xs: gnss_axis.clone(),
        ys: data.gnss.los(),
        color: Rgb::GREEN,
        label: Some("GNSS LOS Displacement".to_string()),
        radius: 1.5,
    });
    if let Some(fit) = data.fit_gnss {
        bottom.push(trend_series(
            &gnss_axis,
            &gnss_years,
            fit,
            Rgb::GREEN,
            trend_label("GNSS Trend", Some(fit)),
        ));
    }

    let mut figure = Figure::new(Layout::Vertical, 1200.0, 500.0);
    if let (Some(first), Some(last)) = (data.dates.first(), data.dates.last()) {
        figure = figure.subtitle(format!(
            "Date Range: {} to {}",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        ));
    }
    figure.add_panel(top);
    figure.add_panel(bottom);
    figure
}

/// Builds and saves the combined plot of one station.
///
/// `before` and `after` must already be filtered by temporal coherence.
pub fn compare_station(
    data_dir: &Path,
    plots_dir: &Path,
    before: &InsarDataset,
    after: &InsarDataset,
    station: &Station,
    radius: f64,
) -> Result<Comparison> {
    let Some(gnss_file) = find_gnss_file(data_dir, &station.name)? else {
        let reason = format!(
            "GNSS file not found for pattern {}_NEU_TIME*_LOS.txt",
            station.name
        );
        warn!(station = %station.name, "{reason}");
        return Ok(Comparison::Skipped(reason));
    };
    info!(station = %station.name, file = %gnss_file.display(), "Using GNSS file");

    let gnss = match load_gnss_file(&gnss_file) {
        Ok(series) => series,
        Err(e) => {
            warn!(station = %station.name, error = %e, "Unusable GNSS file");
            return Ok(Comparison::Skipped(e.to_string()));
        }
    };

    let avg_before = average_within_radius(before, station, radius);
    let avg_after = average_within_radius(after, station, radius);
    if avg_before.point_count == 0 && avg_after.point_count == 0 {
        let reason = format!("no InSAR point within {radius} m");
        warn!(station = %station.name, "{reason}");
        return Ok(Comparison::Skipped(reason));
    }

    let before_years = before.decimal_years();
    let after_years = after.decimal_years();
    let fit_before = linear_regression(&before_years, &avg_before.series);
    let fit_after = linear_regression(&after_years, &avg_after.series);
    let fit_gnss = linear_regression(&gnss.decimal_years(), &gnss.los());

    // The aligned product keeps the acquisition dates of the original one.
    let figure = build_combined_figure(&CombinedPlotData {
        station: &station.name,
        dates: &before.dates,
        insar_years: &before_years,
        before: &avg_before.series,
        after: &avg_after.series,
        gnss: &gnss,
        fit_before,
        fit_after,
        fit_gnss,
    });
    let plot_path = plots_dir.join(format!("{}_combined_plot.svg", station.name));
    figure.save(&plot_path)?;

    Ok(Comparison::Done(StationComparison {
        station: station.name.clone(),
        gnss_file,
        gnss_samples: gnss.len(),
        points_before: avg_before.point_count,
        points_after: avg_after.point_count,
        slope_before: fit_before.map(|f| f.slope),
        slope_after: fit_after.map(|f| f.slope),
        slope_gnss: fit_gnss.map(|f| f.slope),
        plot_path,
    }))
}
