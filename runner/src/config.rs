use crate::job::Job;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::File,
    io::{BufReader, Error},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Executor {0} not supported")]
    UnsupportedExecutor(String),
    #[error("Failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: Error,
    },
    #[error("Failed to parse config")]
    Parse(#[from] serde_yaml::Error),
    #[error("Failed to determine the current {0}")]
    Environment(&'static str, #[source] Error),
    #[error("Config failed the preflight checks, see the log for details")]
    Preflight,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    pub executor: ExecutorConfig,
}

/// Jobs handed to the binary, stands in for the workflow engine
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct JobList {
    pub jobs: Vec<Job>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    // Name of the selected executor, see Executors::load for the selection proccess
    #[serde(default = "default_executor_name")]
    pub name: String,
    // pattern for the name of submitted jobs and their job scripts
    #[serde(default = "default_jobname")]
    pub jobname: String,
    // scratch space and scheduler logs live below this directory
    #[serde(default = "default_control_dir")]
    pub control_dir: PathBuf,
    // initial working directory of the workflow, remote jobs `cd` here
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    // command that executes a single job on the allocated node
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(default = "default_exec_job")]
    pub exec_job: String,
    // custom wrapper script template, falls back to the builtin one
    pub jobscript: Option<PathBuf>,
    // prepended to PATH on the remote side, defaults to the directory of this binary
    pub interpreter_dir: Option<PathBuf>,
    // names of environment variables forwarded to the job
    #[serde(default)]
    pub envvars: Vec<String>,
    #[serde(default = "default_latency_wait")]
    pub latency_wait: u64,
    #[serde(default = "default_status_checks")]
    pub max_status_checks_per_second: f64,
    #[serde(default = "default_status_attempts")]
    pub status_attempts: u32,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub commands: SchedulerCommands,
}

/// Bounds in seconds for every external scheduler call
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    #[serde(default = "default_submit_timeout")]
    pub submit: f64,
    #[serde(default = "default_status_timeout")]
    pub status: f64,
    // a scheduler cycle usually takes around 30 seconds but can be longer in extreme cases
    #[serde(default = "default_cancel_timeout")]
    pub cancel: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerCommands {
    #[serde(default = "default_submit_command")]
    pub submit: String,
    #[serde(default = "default_accounting_command")]
    pub accounting: String,
    #[serde(default = "default_control_command")]
    pub control: String,
    #[serde(default = "default_cancel_command")]
    pub cancel: String,
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }
}

impl JobList {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }
}

impl ExecutorConfig {
    /// pause between two reconciliation sweeps, also the spacing of status queries
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_status_checks_per_second)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeouts.submit)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeouts.status)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeouts.cancel)
    }

    /// directory the scheduler writes job logs to
    pub fn log_dir(&self) -> PathBuf {
        self.control_dir.join("slurm_logs")
    }

    /// Check and normalize the config
    /// Relative paths are resolved against the current directory so that remote jobs see
    /// the same locations.
    pub fn preflight_checks(&mut self) -> Result<(), ConfigErrors> {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.workdir.is_relative() {
            let current = env::current_dir()
                .map_err(|error| ConfigErrors::Environment("working directory", error))?;
            self.workdir = current.join(&self.workdir);
        }

        if self.control_dir.is_relative() {
            self.control_dir = self.workdir.join(&self.control_dir);
        }

        if self.interpreter_dir.is_none() {
            let exe = env::current_exe()
                .map_err(|error| ConfigErrors::Environment("executable", error))?;
            self.interpreter_dir = exe.parent().map(Path::to_path_buf);
        }

        if self.entrypoint.is_empty() {
            error!("executor.entrypoint must name the command that runs a single job");
            contains_error = true;
        }

        if self.jobname.contains(std::path::MAIN_SEPARATOR) {
            error!(
                "executor.jobname ({}) must not contain a path separator",
                self.jobname
            );
            contains_error = true;
        }

        if let Some(ref jobscript) = self.jobscript {
            if !jobscript.is_file() {
                error!(
                    "Failed to find executor.jobscript. Either not a file or not found at {}",
                    jobscript.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if !(self.max_status_checks_per_second.is_finite() && self.max_status_checks_per_second > 0.0)
        {
            error!(
                "executor.max_status_checks_per_second must be a positive number, got {}",
                self.max_status_checks_per_second
            );
            contains_error = true;
        }

        if self.status_attempts == 0 {
            error!("executor.status_attempts cannot be 0, no status could ever be retrieved");
            contains_error = true;
        }

        for (name, value) in [
            ("submit", self.timeouts.submit),
            ("status", self.timeouts.status),
            ("cancel", self.timeouts.cancel),
        ] {
            if !(value.is_finite() && value > 0.0) {
                error!("executor.timeouts.{name} must be a positive number of seconds, got {value}");
                contains_error = true;
            }
        }

        for var in self.envvars.iter() {
            if env::var_os(var).is_none() {
                warn!("Environment variable {var} is not set and won't be forwarded to jobs");
            }
        }

        if contains_error {
            Err(ConfigErrors::Preflight)
        } else {
            Ok(())
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: default_executor_name(),
            jobname: default_jobname(),
            control_dir: default_control_dir(),
            workdir: default_workdir(),
            entrypoint: Vec::new(),
            exec_job: default_exec_job(),
            jobscript: None,
            interpreter_dir: None,
            envvars: Vec::new(),
            latency_wait: default_latency_wait(),
            max_status_checks_per_second: default_status_checks(),
            status_attempts: default_status_attempts(),
            timeouts: TimeoutConfig::default(),
            commands: SchedulerCommands::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            submit: default_submit_timeout(),
            status: default_status_timeout(),
            cancel: default_cancel_timeout(),
        }
    }
}

impl Default for SchedulerCommands {
    fn default() -> Self {
        Self {
            submit: default_submit_command(),
            accounting: default_accounting_command(),
            control: default_control_command(),
            cancel: default_cancel_command(),
        }
    }
}

fn default_executor_name() -> String {
    "slurm".into()
}

fn default_jobname() -> String {
    "slurmjob.{name}.{jobid}.sh".into()
}

fn default_control_dir() -> PathBuf {
    PathBuf::from(".slurmexec")
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_exec_job() -> String {
    "cd {workdir} && {path} {envvars} {entrypoint} {targets} --single-job {jobid} \
     --wildcards {wildcards} --resources {resources} {use_threads} \
     --wait-for-files {wait_for_files} --latency-wait {latency_wait} --cluster-jobstep"
        .into()
}

fn default_latency_wait() -> u64 {
    3
}

fn default_status_checks() -> f64 {
    1.0
}

fn default_status_attempts() -> u32 {
    10
}

fn default_submit_timeout() -> f64 {
    60.0
}

fn default_status_timeout() -> f64 {
    30.0
}

fn default_cancel_timeout() -> f64 {
    60.0
}

fn default_submit_command() -> String {
    "sbatch".into()
}

fn default_accounting_command() -> String {
    "sacct".into()
}

fn default_control_command() -> String {
    "scontrol".into()
}

fn default_cancel_command() -> String {
    "scancel".into()
}
