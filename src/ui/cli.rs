//! Command-line interface module.
//!
//! Every processing parameter can be given as a flag or through the
//! environment variable of the same name, so that external steps launched by
//! the workflow runner see exactly the configuration this process used.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV_VAR: &str = "INSAR_GNSS_LOG";

/// CLI arguments for the InSAR / GNSS processing workflow
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every workflow step in order, aborting at the first failure.
    Run(RunArgs),
    /// Plot combined InSAR/GNSS time series and velocity maps.
    Plot(PlotArgs),
    /// Compute gridded seasonal amplitudes of the InSAR series.
    Grid,
}

/// Processing parameters shared by every step.
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding every input and output file
    #[arg(long, env = "DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum temporal coherence of InSAR points (inclusive)
    #[arg(long, env = "MIN_TEMPORAL_COHERENCE", default_value_t = 0.7, global = true)]
    pub min_temporal_coherence: f64,

    /// Radius in metres for InSAR averaging around a station
    #[arg(long, env = "INSAR_RADIUS", default_value_t = 500, global = true)]
    pub insar_radius: u32,

    /// InSAR CSV file name inside the data directory
    #[arg(long, env = "INSAR_FILE", default_value = "insar.csv", global = true)]
    pub insar_file: String,

    /// Station list file name inside the data directory
    #[arg(long, env = "STATIONS_FILE", default_value = "stations_list", global = true)]
    pub stations_file: String,

    /// Grid size in km used when multi-resolution analysis is off
    #[arg(long, env = "GRID_SIZE_KM", default_value_t = 0.5, global = true)]
    pub grid_size_km: f64,

    /// Detrend each series before computing its amplitude
    #[arg(long, env = "USE_DETRENDED", default_value = "true", value_parser = parse_flag, action = ArgAction::Set, global = true)]
    pub use_detrended: bool,

    /// Use half the peak to peak range as amplitude
    #[arg(long, env = "HALF_AMPLITUDE", default_value = "true", value_parser = parse_flag, action = ArgAction::Set, global = true)]
    pub half_amplitude: bool,

    /// Run the grid analysis for every size in --grid-sizes
    #[arg(long, env = "MULTI_RESOLUTION", default_value = "true", value_parser = parse_flag, action = ArgAction::Set, global = true)]
    pub multi_resolution: bool,

    /// Comma separated grid sizes in km
    #[arg(long, env = "GRID_SIZES", default_value = "0.25, 0.5, 1.0, 1.5, 2.5, 5.0", global = true)]
    pub grid_sizes: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PlotArgs {
    /// Number of stations processed concurrently
    #[arg(short = 't', long = "threads-num", default_value = "5")]
    pub threads_num: usize,

    /// Prefix of the regional velocity map file name
    #[arg(long, default_value = "combined")]
    pub suffix: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Comma separated list of steps, defaults to the full workflow
    #[arg(long, value_delimiter = ',')]
    pub steps: Option<Vec<String>>,

    /// Interpreter used for external script steps
    #[arg(long, default_value = "python")]
    pub interpreter: String,

    /// Directory containing the external scripts
    #[arg(long, default_value = ".")]
    pub scripts_dir: PathBuf,

    /// File receiving the output of every step
    #[arg(long, default_value = "workflow.log")]
    pub log_file: PathBuf,

    #[command(flatten)]
    pub plot: PlotArgs,
}

/// Cli Arguments related to logging
#[derive(clap::Args, Debug)]
pub struct LoggingArgs {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl LoggingArgs {
    /// Installs the tracing subscriber.
    ///
    /// The level comes from `-q`/`-v` when given, otherwise from the
    /// `INSAR_GNSS_LOG` variable, otherwise `info`.
    pub fn initialize_logging(&self) {
        let filter = if self.quiet {
            EnvFilter::new("error")
        } else if self.verbose > 0 {
            EnvFilter::new(if self.verbose == 1 { "debug" } else { "trace" })
        } else {
            EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"))
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Parses the boolean spellings accepted in the environment (`True`, `false`, `1`, `no`...).
pub fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Ok(true),
        "false" | "0" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_accepts_python_spelling() {
        assert_eq!(parse_flag("True"), Ok(true));
        assert_eq!(parse_flag(" false "), Ok(false));
        assert_eq!(parse_flag("0"), Ok(false));
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn parses_run_with_steps_and_flags() {
        let args = Args::try_parse_from([
            "insar-gnss",
            "--data-dir",
            "/tmp/data",
            "run",
            "--steps",
            "a.py,plot-combined",
            "--use-detrended",
            "False",
            "-t",
            "3",
        ])
        .unwrap();

        assert!(!args.global.use_detrended);
        assert_eq!(args.global.data_dir, Some(PathBuf::from("/tmp/data")));
        match args.command {
            Command::Run(run) => {
                assert_eq!(
                    run.steps,
                    Some(vec!["a.py".to_string(), "plot-combined".to_string()])
                );
                assert_eq!(run.plot.threads_num, 3);
                assert_eq!(run.log_file, PathBuf::from("workflow.log"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn reads_parameters_from_environment() {
        let vars = [
            ("DATA_DIR", "/tmp/env-data"),
            ("INSAR_RADIUS", "750"),
            ("USE_DETRENDED", "False"),
            ("MULTI_RESOLUTION", "True"),
            ("GRID_SIZES", "1.0, 2.0"),
        ];
        // SAFETY: other tests give these values as flags, never through the environment.
        unsafe {
            for (key, value) in vars {
                std::env::set_var(key, value);
            }
        }
        let parsed = Args::try_parse_from(["insar-gnss", "grid"]);
        let overridden = Args::try_parse_from(["insar-gnss", "--insar-radius", "100", "grid"]);
        unsafe {
            for (key, _) in vars {
                std::env::remove_var(key);
            }
        }

        let args = parsed.unwrap();
        assert_eq!(args.global.data_dir, Some(PathBuf::from("/tmp/env-data")));
        assert_eq!(args.global.insar_radius, 750);
        assert!(!args.global.use_detrended);
        assert!(args.global.multi_resolution);
        assert_eq!(args.global.grid_sizes, "1.0, 2.0");
        assert!(matches!(args.command, Command::Grid));
        assert_eq!(overridden.unwrap().global.insar_radius, 100);
    }
}
