use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::PathBuf};

/// A single resource value as declared by the workflow engine
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ResourceValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ResourceValue {
    /// interpret the value as a flag, strings like "false" or "0" count as unset
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(flag) => *flag,
            Self::Integer(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::Text(value) => !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "" | "0" | "false" | "no"
            ),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(value) => u64::try_from(*value).ok(),
            Self::Float(value) if value.fract() == 0.0 && *value >= 0.0 => Some(*value as u64),
            Self::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

pub type Resources = BTreeMap<String, ResourceValue>;

/// Read-only view of one unit of work handed over by the workflow engine
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct Job {
    pub name: String,
    pub jobid: u64,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub wildcards: BTreeMap<String, String>,
    // output files the single-job entrypoint should produce
    #[serde(default)]
    pub targets: Vec<String>,
    // set for fused group jobs
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub wait_for_files: Vec<PathBuf>,
}

impl Job {
    pub fn new(name: impl Into<String>, jobid: u64) -> Self {
        Self {
            name: name.into(),
            jobid,
            resources: Resources::new(),
            wildcards: BTreeMap::new(),
            targets: Vec::new(),
            group: None,
            wait_for_files: Vec::new(),
        }
    }

    /// builder style helper, mostly used when jobs are assembled in code
    pub fn with_resource(mut self, key: &str, value: impl Into<ResourceValue>) -> Self {
        self.resources.insert(key.to_owned(), value.into());
        self
    }

    pub fn is_group(&self) -> bool {
        self.group.is_some()
    }

    pub fn resource(&self, key: &str) -> Option<&ResourceValue> {
        self.resources.get(key)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (jobid {})", self.name, self.jobid)
    }
}

impl From<bool> for ResourceValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ResourceValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ResourceValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for ResourceValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ResourceValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ResourceValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Identifier the scheduler assigned to a submitted job, immutable once created
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
