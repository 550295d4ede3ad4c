//! Output and reporting functions for the processing workflow.
//!
//! This module handles all console reporting, including:
//! - Configuration summary printed before processing
//! - Per station plotting report
//! - Grid analysis report
//! - Workflow runtime summary

use crate::analysis::PlotSummary;
use crate::config::WorkflowConfig;
use crate::grid::GridOutput;
use crate::workflow::{WorkflowOutcome, format_runtime};

/// Prints the resolved configuration.
pub fn print_config_summary(config: &WorkflowConfig) {
    println!("📂 Using data directory: {}", config.data_dir.display());
    println!(
        "🔧 InSAR file '{}', station list '{}'",
        config.insar_file, config.stations_file
    );
    println!(
        "🔧 Minimum temporal coherence {}, averaging radius {} m",
        config.min_temporal_coherence, config.insar_radius
    );
}

/// Prints which stations were plotted and which were skipped.
///
/// # Arguments
/// * `summary` - Result of the plotting run
pub fn print_plot_report(summary: &PlotSummary) {
    println!("\n🔚 Plotting completed!");
    match &summary.regional_map {
        Some(path) => println!("🗺️  Regional velocity map saved: {}", path.display()),
        None => println!("⚠️  Regional velocity map skipped: no InSAR velocities"),
    }

    let plotted: Vec<_> = summary
        .stations
        .iter()
        .filter_map(|s| s.comparison.as_ref())
        .collect();
    if plotted.is_empty() {
        println!("⚠️  No combined time series plot was produced");
    } else {
        println!("✅ Combined time series plots: {}", plotted.len());
        for comparison in plotted {
            let slope = |s: Option<f64>| match s {
                Some(v) => format!("{v:.5}"),
                None => "n/a".to_string(),
            };
            println!(
                "\t- {}: InSAR {} mm/year, GNSS {} mm/year ({} points)",
                comparison.station,
                slope(comparison.slope_after),
                slope(comparison.slope_gnss),
                comparison.points_after
            );
        }
    }

    let skipped: Vec<_> = summary.skipped().collect();
    if !skipped.is_empty() {
        println!("⚠️  Stations skipped: {}", skipped.len());
        for report in skipped {
            println!(
                "\t- {}: {}",
                report.station,
                report.skipped_reason.as_deref().unwrap_or("unknown reason")
            );
        }
    }
    println!("All plots were successfully saved in the folder 'plots'.");
}

/// Prints the files written by the grid analysis.
pub fn print_grid_report(outputs: &[GridOutput]) {
    println!("\n🔚 Grid amplitude analysis completed!");
    for output in outputs {
        println!(
            "\t- {} km: {} cells, {}",
            output.size_km,
            output.cells,
            output.csv_path.display()
        );
    }
}

/// Prints the outcome of a workflow run and its total runtime.
pub fn print_workflow_report(outcome: &WorkflowOutcome) {
    if outcome.aborted() {
        println!("❗ Workflow aborted due to error.");
    } else {
        println!("✅ Workflow completed: {} steps", outcome.completed.len());
    }
    println!("⏱️  Total runtime: {}", format_runtime(outcome.duration));
}
