mod analysis;
mod config;
mod error;
mod geo;
mod grid;
mod models;
mod parser;
mod plot;
mod stats;
mod ui;
mod workflow;

use clap::Parser;
use config::WorkflowConfig;
use error::Result;
use std::process;
use ui::cli::{Args, Command};
use ui::output::{
    print_config_summary, print_grid_report, print_plot_report, print_workflow_report,
};
use workflow::{WorkflowRunner, resolve_steps};

/// Runs the selected command, returning whether it fully succeeded.
fn execute(args: Args) -> Result<bool> {
    let config = WorkflowConfig::from_args(&args.global)?;
    print_config_summary(&config);

    match args.command {
        Command::Run(run) => {
            let runner = WorkflowRunner {
                config,
                steps: resolve_steps(run.steps.as_deref()),
                interpreter: run.interpreter,
                scripts_dir: run.scripts_dir,
                log_file: run.log_file,
                threads: run.plot.threads_num,
                suffix: run.plot.suffix,
            };
            let outcome = smol::block_on(runner.run())?;
            print_workflow_report(&outcome);
            Ok(!outcome.aborted())
        }
        Command::Plot(plot) => {
            let summary = analysis::run_plots(&config, plot.threads_num, &plot.suffix)?;
            print_plot_report(&summary);
            Ok(true)
        }
        Command::Grid => {
            let outputs = grid::run_grid_analysis(&config)?;
            print_grid_report(&outputs);
            Ok(true)
        }
    }
}

fn main() {
    let args = Args::parse();
    args.logging.initialize_logging();

    match execute(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
