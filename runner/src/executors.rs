pub mod active;
pub mod command;
pub mod limiter;
pub mod resources;
pub mod script;
pub mod slurm;
pub mod status;
pub mod template;
pub mod workspace;

#[cfg(test)]
mod command_test;
#[cfg(test)]
mod limiter_test;
#[cfg(test)]
mod script_test;
#[cfg(test)]
mod status_test;
#[cfg(test)]
mod template_test;

use crate::{
    config::{ConfigErrors, ExecutorConfig},
    job::{ExternalId, Job},
};
use active::{ErrorCallback, SuccessCallback};
use command::CommandError;
use slurm::{CancelReport, SlurmExecutor};
use status::{FailureReason, JobStatus};
use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Missing job submission key '{key}' for job '{job}'")]
    MissingResourceKey { key: &'static str, job: String },
    #[error("Resource '{key}' of job '{job}' has the invalid value '{value}'")]
    InvalidResourceValue {
        key: &'static str,
        job: String,
        value: String,
    },
    #[error("Error formatting jobscript for job '{job}': {{{placeholder}}} not found")]
    TemplateFormat { placeholder: String, job: String },
    #[error("Path separator found in job name {name} of job '{job}', this is not supported")]
    InvalidJobName { name: String, job: String },
    #[error("Failed to prepare the executor workspace")]
    Workspace(#[source] io::Error),
    #[error("Failed to write job script {path:?}")]
    ScriptWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Submission of job '{job}' failed: {reason}")]
    SubmissionFailed {
        job: String,
        reason: String,
        #[source]
        source: Option<CommandError>,
    },
    #[error("Unable to query the status of job '{job}' (external id {external_id}) after {attempts} attempts")]
    StatusQueryExhausted {
        job: String,
        external_id: ExternalId,
        attempts: u32,
    },
    #[error("Job '{job}' (external id {external_id}) failed with status {status}")]
    TerminalFailureReported {
        job: String,
        external_id: ExternalId,
        status: FailureReason,
    },
    #[error("Failed to start the status poller")]
    PollerSpawn(#[source] io::Error),
    #[error("The status poller panicked")]
    PollerPanicked,
    #[error("Stopped waiting for jobs with {pending} still pending and {cancelled} cancelled")]
    WaitInterrupted { pending: usize, cancelled: usize },
}

/// All supported cluster executors
/// These should be initialized from `Executors::load`
#[derive(Debug)]
pub enum Executors {
    Slurm(SlurmExecutor),
}

impl Executors {
    pub fn load(config: ExecutorConfig) -> Result<Self, ConfigErrors> {
        match config.name.to_lowercase().as_str() {
            "slurm" => Ok(Self::Slurm(SlurmExecutor::load(config)?)),
            _ => Err(ConfigErrors::UnsupportedExecutor(config.name)),
        }
    }

    pub fn submit_jobs<I>(&self, jobs: I, on_success: SuccessCallback, on_error: ErrorCallback) -> usize
    where
        I: IntoIterator<Item = Job>,
    {
        match self {
            Self::Slurm(executor) => executor.submit_jobs(jobs, on_success, on_error),
        }
    }

    pub fn job_status(&self, external_id: &ExternalId) -> Result<JobStatus, ExecutorError> {
        match self {
            Self::Slurm(executor) => executor.job_status(external_id),
        }
    }

    pub fn wait_for_jobs(&self) -> Result<(), ExecutorError> {
        match self {
            Self::Slurm(executor) => executor.wait_for_jobs(),
        }
    }

    pub fn cancel_all(&self) -> CancelReport {
        match self {
            Self::Slurm(executor) => executor.cancel_all(),
        }
    }

    pub fn shutdown(&self) -> Result<(), ExecutorError> {
        match self {
            Self::Slurm(executor) => executor.shutdown(),
        }
    }
}
