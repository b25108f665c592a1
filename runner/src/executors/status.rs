use crate::job::ExternalId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, str::FromStr};

/// Terminal states SLURM reports for jobs that did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    BootFail,
    OutOfMemory,
    Cancelled,
    Failed,
    NodeFail,
    Deadline,
    Preempted,
    Timeout,
    Error,
}

impl FailureReason {
    pub const ALL: [FailureReason; 9] = [
        Self::BootFail,
        Self::OutOfMemory,
        Self::Cancelled,
        Self::Failed,
        Self::NodeFail,
        Self::Deadline,
        Self::Preempted,
        Self::Timeout,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BootFail => "BOOT_FAIL",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::NodeFail => "NODE_FAIL",
            Self::Deadline => "DEADLINE",
            Self::Preempted => "PREEMPTED",
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
        }
    }
}

impl FromStr for FailureReason {
    type Err = ();

    fn from_str(status: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == status)
            .ok_or(())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified scheduler status of a single job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Failed(FailureReason),
    /// anything non-terminal (PENDING, RUNNING, COMPLETING, ...), kept verbatim
    Active(String),
}

impl JobStatus {
    /// total over all strings: the failure set, COMPLETED, and everything else
    pub fn classify(status: &str) -> Self {
        let status = status.trim();

        if status == "COMPLETED" {
            Self::Completed
        } else if let Ok(reason) = status.parse() {
            Self::Failed(reason)
        } else {
            Self::Active(status.to_owned())
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("COMPLETED"),
            Self::Failed(reason) => reason.fmt(f),
            Self::Active(status) => f.write_str(status),
        }
    }
}

/// Result of asking one status mechanism once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Success(JobStatus),
    /// the mechanism itself failed (non-zero exit, timeout, spawn error)
    TransientFailure(String),
    /// the mechanism worked but knows nothing about the job (yet)
    Unavailable,
}

/// The two ways of asking SLURM for a job state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMechanism {
    /// `sacct -P -b -j <id> -n`
    Accounting,
    /// `scontrol -o show job <id>`, used when accounting is misconfigured or lagging
    Control,
}

impl StatusMechanism {
    pub const ORDER: [StatusMechanism; 2] = [Self::Accounting, Self::Control];

    pub fn args(&self, external_id: &ExternalId) -> Vec<String> {
        match self {
            Self::Accounting => vec![
                "-P".into(),
                "-b".into(),
                "-j".into(),
                external_id.to_string(),
                "-n".into(),
            ],
            Self::Control => vec![
                "-o".into(),
                "show".into(),
                "job".into(),
                external_id.to_string(),
            ],
        }
    }

    pub fn parse(&self, output: &str, external_id: &ExternalId) -> QueryOutcome {
        let status = match self {
            Self::Accounting => parse_accounting(output, external_id),
            Self::Control => parse_control(output),
        };

        status.map_or(QueryOutcome::Unavailable, |status| {
            QueryOutcome::Success(JobStatus::classify(status))
        })
    }
}

impl fmt::Display for StatusMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accounting => f.write_str("accounting"),
            Self::Control => f.write_str("control"),
        }
    }
}

static JOB_STATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"JobState=(\w+)").unwrap());

/// find the state of the allocation itself in pipe delimited `id|state|...` lines
///
/// Job steps (`12345.batch`) are skipped and trailing annotations like `CANCELLED by 1000`
/// are cut off.
fn parse_accounting<'a>(output: &'a str, external_id: &ExternalId) -> Option<&'a str> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once('|'))
        .find(|(id, _)| *id == external_id.as_str())
        .and_then(|(_, rest)| rest.split('|').next())
        .and_then(|state| state.split_whitespace().next())
}

fn parse_control(output: &str) -> Option<&str> {
    JOB_STATE
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|state| state.as_str())
}
