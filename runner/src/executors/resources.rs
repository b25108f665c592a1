use super::ExecutorError;
use crate::job::{Job, ResourceValue};
use tracing::warn;

/// Memory request, the per-cpu variant wins when both are declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    PerCpu(u64),
    Total(u64),
}

/// Single process with a number of threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinaryShape {
    pub cpus_per_task: u64,
}

/// Several tasks started by the MPI launcher, possibly spread over nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpiShape {
    pub tasks: u64,
    pub cpus_per_task: u64,
    pub nodes: Option<u64>,
}

/// A fused group of jobs sharing one node allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupShape {
    pub cpus: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionShape {
    Ordinary(OrdinaryShape),
    Mpi(MpiShape),
    Grouped(GroupShape),
}

impl SubmissionShape {
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Ordinary(shape) => vec![
                "-n".into(),
                "1".into(),
                "-c".into(),
                shape.cpus_per_task.to_string(),
            ],
            Self::Mpi(shape) => {
                let mut args = vec![
                    "-n".into(),
                    shape.tasks.to_string(),
                    "-c".into(),
                    shape.cpus_per_task.to_string(),
                ];
                if let Some(nodes) = shape.nodes {
                    args.push("-N".into());
                    args.push(nodes.to_string());
                }
                args
            }
            Self::Grouped(shape) => vec![
                "-N".into(),
                "1".into(),
                "-c".into(),
                shape.cpus.to_string(),
            ],
        }
    }
}

/// Validated scheduler parameters for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionParams {
    pub account: String,
    pub partition: String,
    pub walltime_minutes: u64,
    pub constraint: Option<String>,
    pub memory: Option<Memory>,
    pub shape: SubmissionShape,
}

impl SubmissionParams {
    pub fn from_job(job: &Job) -> Result<Self, ExecutorError> {
        let account = required(job, "account")?.to_string();
        let partition = required(job, "partition")?.to_string();
        let walltime_minutes = number(job, "walltime_minutes", required(job, "walltime_minutes")?)?;

        let constraint = job
            .resource("constraint")
            .map(ToString::to_string)
            .filter(|constraint| !constraint.is_empty());

        // zero counts as "not given"
        let memory = match (
            optional_number(job, "mem_mb_per_cpu")?.filter(|mb| *mb > 0),
            optional_number(job, "mem_mb")?.filter(|mb| *mb > 0),
        ) {
            (Some(mb), _) => Some(Memory::PerCpu(mb)),
            (None, Some(mb)) => Some(Memory::Total(mb)),
            (None, None) => {
                warn!(
                    job = %job.name,
                    "No job memory information ('mem_mb' or 'mem_mb_per_cpu') is given - submitting without. This might or might not work on your cluster."
                );
                None
            }
        };

        let cores = match optional_number(job, "cores")? {
            Some(cores) => cores,
            None => optional_number(job, "threads")?.unwrap_or(1),
        }
        .max(1);

        let shape = if job.resource("mpi").map_or(false, ResourceValue::is_truthy) {
            SubmissionShape::Mpi(MpiShape {
                tasks: optional_number(job, "tasks")?.unwrap_or(cores).max(1),
                cpus_per_task: optional_number(job, "cpus_per_task")?.unwrap_or(1).max(1),
                nodes: optional_number(job, "nodes")?.filter(|nodes| *nodes > 0),
            })
        } else if job.is_group() {
            SubmissionShape::Grouped(GroupShape { cpus: cores })
        } else {
            SubmissionShape::Ordinary(OrdinaryShape {
                cpus_per_task: cores,
            })
        };

        Ok(Self {
            account,
            partition,
            walltime_minutes,
            constraint,
            memory,
            shape,
        })
    }

    /// scheduler flags derived from the resources, without job name, log or script
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-A".into(),
            self.account.clone(),
            "-p".into(),
            self.partition.clone(),
            "-t".into(),
            self.walltime_minutes.to_string(),
        ];

        if let Some(ref constraint) = self.constraint {
            args.push("-C".into());
            args.push(constraint.clone());
        }

        match self.memory {
            Some(Memory::PerCpu(mb)) => args.push(format!("--mem-per-cpu={mb}")),
            Some(Memory::Total(mb)) => {
                args.push("--mem".into());
                args.push(mb.to_string());
            }
            None => {}
        }

        args.extend(self.shape.args());
        args
    }
}

fn required<'a>(job: &'a Job, key: &'static str) -> Result<&'a ResourceValue, ExecutorError> {
    job.resource(key)
        .ok_or_else(|| ExecutorError::MissingResourceKey {
            key,
            job: job.name.clone(),
        })
}

fn number(job: &Job, key: &'static str, value: &ResourceValue) -> Result<u64, ExecutorError> {
    value
        .as_u64()
        .ok_or_else(|| ExecutorError::InvalidResourceValue {
            key,
            job: job.name.clone(),
            value: value.to_string(),
        })
}

fn optional_number(job: &Job, key: &'static str) -> Result<Option<u64>, ExecutorError> {
    job.resource(key)
        .map(|value| number(job, key, value))
        .transpose()
}
