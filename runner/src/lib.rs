//! Execute workflow jobs on a SLURM cluster
//!
//! Jobs are turned into `sbatch` submissions, tracked by a background poller and reported
//! back through per-job callbacks.

pub mod config;
pub mod executors;
pub mod job;

#[cfg(test)]
mod config_test;

pub use config::{ConfigErrors, ExecutorConfig, JobList, RunnerConfig};
pub use executors::{
    active::{ErrorCallback, SuccessCallback},
    ExecutorError, Executors,
};
pub use job::{ExternalId, Job, ResourceValue};
