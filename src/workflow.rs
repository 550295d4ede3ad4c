//! Sequential execution of the processing steps.
//!
//! External steps are scripts run through an interpreter with the workflow
//! configuration exported in their environment. Built-in steps run in
//! process. The output of every step is appended to a log file and the
//! workflow stops at the first failing step.

use crate::analysis::run_plots;
use crate::config::WorkflowConfig;
use crate::error::{Result, WorkflowError};
use crate::grid::run_grid_analysis;
use futures_lite::io::AsyncWriteExt;
use std::{
    fmt,
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::{debug, error, info};

pub const PLOT_COMBINED_STEP: &str = "plot-combined";
pub const GRID_AMPLITUDE_STEP: &str = "grid-amplitude";

/// Steps run when none are given on the command line.
pub const DEFAULT_STEPS: [&str; 6] = [
    "gnss_3d_vels.py",
    "filter_insar_save_parameters.py",
    "fit_plane_correct_insar.py",
    "gnss_los_displ.py",
    PLOT_COMBINED_STEP,
    GRID_AMPLITUDE_STEP,
];

const LOG_SEPARATOR_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    External(String),
    PlotCombined,
    GridAmplitude,
}

impl Step {
    pub fn parse(name: &str) -> Step {
        match name.trim() {
            PLOT_COMBINED_STEP => Step::PlotCombined,
            GRID_AMPLITUDE_STEP => Step::GridAmplitude,
            other => Step::External(other.to_string()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::External(script) => write!(f, "{script}"),
            Step::PlotCombined => write!(f, "{PLOT_COMBINED_STEP}"),
            Step::GridAmplitude => write!(f, "{GRID_AMPLITUDE_STEP}"),
        }
    }
}

/// Captured result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome {
    pub completed: Vec<String>,
    pub failed: Option<String>,
    pub duration: Duration,
}

impl WorkflowOutcome {
    pub fn aborted(&self) -> bool {
        self.failed.is_some()
    }
}

/// Human readable runtime: seconds below one minute, minutes above.
pub fn format_runtime(duration: Duration) -> String {
    let seconds = duration.as_secs_f64();
    if seconds < 60.0 {
        format!("{seconds:.2} seconds")
    } else {
        format!("{:.2} minutes", seconds / 60.0)
    }
}

pub struct WorkflowRunner {
    pub config: WorkflowConfig,
    pub steps: Vec<Step>,
    pub interpreter: String,
    pub scripts_dir: PathBuf,
    pub log_file: PathBuf,
    pub threads: usize,
    pub suffix: String,
}

impl WorkflowRunner {
    async fn run_external(&self, script: &str) -> StepOutput {
        let script_path = self.scripts_dir.join(script);
        debug!(interpreter = %self.interpreter, script = %script_path.display(), "Spawning step");

        let output = smol::process::Command::new(&self.interpreter)
            .arg(&script_path)
            .envs(self.config.env_vars())
            .output()
            .await;

        match output {
            Ok(output) => StepOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => StepOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("Error while executing {script}: {e}\n"),
            },
        }
    }

    async fn run_builtin(&self, step: &Step) -> StepOutput {
        let config = self.config.clone();
        let threads = self.threads;
        let suffix = self.suffix.clone();
        let step = step.clone();

        let result: Result<String> = smol::unblock(move || match step {
            Step::PlotCombined => run_plots(&config, threads, &suffix).map(|summary| {
                let regional = summary
                    .regional_map
                    .as_ref()
                    .map_or_else(|| "skipped".to_string(), |p| p.display().to_string());
                format!(
                    "Plotted {} stations ({} skipped), regional map {}\n",
                    summary.stations.len(),
                    summary.skipped().count(),
                    regional
                )
            }),
            Step::GridAmplitude => run_grid_analysis(&config).map(|outputs| {
                outputs
                    .iter()
                    .map(|o| {
                        format!(
                            "{} km grid: {} cells -> {}\n",
                            o.size_km,
                            o.cells,
                            o.csv_path.display()
                        )
                    })
                    .collect()
            }),
            Step::External(name) => Err(WorkflowError::StepFailed {
                step: name,
                reason: "not a built-in step".to_string(),
            }),
        })
        .await;

        match result {
            Ok(stdout) => StepOutput {
                success: true,
                stdout,
                stderr: String::new(),
            },
            Err(e) => StepOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("{e}\n"),
            },
        }
    }

    pub async fn run_step(&self, step: &Step) -> StepOutput {
        match step {
            Step::External(script) => self.run_external(script).await,
            builtin => self.run_builtin(builtin).await,
        }
    }

    async fn append_log(&self, step: &Step, output: &StepOutput) -> Result<()> {
        let entry = format!(
            "Running {step}...\n{}{}\n{}\n",
            output.stdout,
            output.stderr,
            "-".repeat(LOG_SEPARATOR_WIDTH)
        );
        let mut file = smol::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .await
            .map_err(|e| WorkflowError::io(&self.log_file, e))?;
        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| WorkflowError::io(&self.log_file, e))?;
        file.flush()
            .await
            .map_err(|e| WorkflowError::io(&self.log_file, e))
    }

    /// Runs the steps in order, stopping at the first failure.
    ///
    /// Errors are only returned when the log file cannot be written; step
    /// failures are reported through [`WorkflowOutcome::failed`].
    pub async fn run(&self) -> Result<WorkflowOutcome> {
        let start = Instant::now();
        let mut completed = Vec::new();
        let mut failed = None;

        for step in &self.steps {
            info!(step = %step, "Running step");
            let output = self.run_step(step).await;
            self.append_log(step, &output).await?;

            if output.success {
                println!("✅ {step} executed successfully!");
                completed.push(step.to_string());
            } else {
                error!(step = %step, "Step failed");
                println!("❗ Error in {step}, see {}", self.log_file.display());
                failed = Some(step.to_string());
                break;
            }
        }

        Ok(WorkflowOutcome {
            completed,
            failed,
            duration: start.elapsed(),
        })
    }
}

/// Resolves the step list, defaulting to the full workflow.
pub fn resolve_steps(names: Option<&[String]>) -> Vec<Step> {
    match names {
        Some(names) => names
            .iter()
            .filter(|n| !n.trim().is_empty())
            .map(|n| Step::parse(n))
            .collect(),
        None => DEFAULT_STEPS.iter().map(|n| Step::parse(n)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridSettings;
    use std::{fs, path::Path};
    use tempfile::tempdir;

    fn config(dir: &Path) -> WorkflowConfig {
        WorkflowConfig {
            data_dir: dir.to_path_buf(),
            min_temporal_coherence: 0.7,
            insar_radius: 500.0,
            insar_file: "insar.csv".to_string(),
            stations_file: "stations_list".to_string(),
            grid: GridSettings {
                grid_size_km: 0.5,
                use_detrended: false,
                half_amplitude: true,
                multi_resolution: false,
                grid_sizes: vec![0.5],
            },
        }
    }

    fn runner(dir: &Path, steps: Vec<Step>) -> WorkflowRunner {
        WorkflowRunner {
            config: config(dir),
            steps,
            interpreter: "sh".to_string(),
            scripts_dir: dir.to_path_buf(),
            log_file: dir.join("workflow.log"),
            threads: 2,
            suffix: "combined".to_string(),
        }
    }

    #[test]
    fn parses_builtin_and_external_steps() {
        assert_eq!(Step::parse("plot-combined"), Step::PlotCombined);
        assert_eq!(Step::parse(" grid-amplitude "), Step::GridAmplitude);
        assert_eq!(
            Step::parse("gnss_3d_vels.py"),
            Step::External("gnss_3d_vels.py".to_string())
        );
        assert_eq!(resolve_steps(None).len(), DEFAULT_STEPS.len());
        let custom = vec!["a.py".to_string(), "".to_string()];
        assert_eq!(
            resolve_steps(Some(custom.as_slice())),
            vec![Step::External("a.py".into())]
        );
    }

    #[test]
    fn runtime_switches_to_minutes() {
        assert_eq!(format_runtime(Duration::from_millis(1500)), "1.50 seconds");
        assert_eq!(format_runtime(Duration::from_secs(90)), "1.50 minutes");
    }

    #[cfg(unix)]
    #[test]
    fn stops_at_first_failing_step() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ok.sh"), "echo \"radius=$INSAR_RADIUS\"\n").unwrap();
        fs::write(dir.path().join("fail.sh"), "echo broken >&2\nexit 3\n").unwrap();
        fs::write(dir.path().join("never.sh"), "echo never\n").unwrap();

        let names = vec![
            "ok.sh".to_string(),
            "fail.sh".to_string(),
            "never.sh".to_string(),
        ];
        let runner = runner(dir.path(), resolve_steps(Some(names.as_slice())));
        let outcome = smol::block_on(runner.run()).unwrap();

        assert_eq!(outcome.completed, vec!["ok.sh".to_string()]);
        assert_eq!(outcome.failed.as_deref(), Some("fail.sh"));
        assert!(outcome.aborted());

        let log = fs::read_to_string(dir.path().join("workflow.log")).unwrap();
        assert!(log.contains("Running ok.sh...\nradius=500\n"));
        assert!(log.contains("broken"));
        assert!(!log.contains("never"));
        assert_eq!(log.matches(&"-".repeat(50)).count(), 2);
    }

    #[test]
    fn missing_interpreter_fails_the_step() {
        let dir = tempdir().unwrap();
        let mut runner = runner(dir.path(), vec![Step::External("x.py".to_string())]);
        runner.interpreter = "definitely-not-an-interpreter-7f3a".to_string();

        let outcome = smol::block_on(runner.run()).unwrap();
        assert_eq!(outcome.failed.as_deref(), Some("x.py"));
        let log = fs::read_to_string(dir.path().join("workflow.log")).unwrap();
        assert!(log.contains("Error while executing x.py"));
    }

    #[test]
    fn runs_builtin_grid_step() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("insar.csv"),
            "latitude,longitude,temporal_coherence,20200101,20200201\n45.0,9.0,0.9,0,2\n",
        )
        .unwrap();

        let runner = runner(dir.path(), vec![Step::GridAmplitude]);
        let outcome = smol::block_on(runner.run()).unwrap();
        assert!(!outcome.aborted());
        assert!(dir.path().join("grid_amplitude_0p5km.csv").exists());
    }

    #[test]
    fn builtin_failure_is_logged() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path(), vec![Step::PlotCombined, Step::GridAmplitude]);
        let outcome = smol::block_on(runner.run()).unwrap();
        assert_eq!(outcome.failed.as_deref(), Some("plot-combined"));
        assert!(outcome.completed.is_empty());
        let log = fs::read_to_string(dir.path().join("workflow.log")).unwrap();
        assert!(log.starts_with("Running plot-combined...\n"));
    }
}
