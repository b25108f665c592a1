use super::{
    template::{quote, render, MissingPlaceholder, Quoting, TemplateContext, TemplateValue},
    workspace::Workspace,
    ExecutorError,
};
use crate::{config::ExecutorConfig, job::Job};
use itertools::Itertools;
use serde_json::json;
use std::{
    env,
    fs::{self, Permissions},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// builtin wrapper, the sentinel files signal completion over the shared file system
pub const DEFAULT_JOBSCRIPT: &str = "#!/bin/sh
# properties = {properties}
{exec_job} && touch {jobfinished} || (touch {jobfailed}; exit 1)
";

/// A job script written to the workspace, ready to be submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScript {
    pub jobname: String,
    pub path: PathBuf,
    /// working directory the job is submitted with
    pub chdir: PathBuf,
}

/// format the configured job name pattern for a job
pub fn job_name(pattern: &str, job: &Job) -> Result<String, ExecutorError> {
    let name = render(pattern, &base_context(job), Quoting::None)
        .map_err(|missing| template_error(missing, job))?;

    if name.contains(std::path::MAIN_SEPARATOR) {
        Err(ExecutorError::InvalidJobName {
            name,
            job: job.name.clone(),
        })
    } else {
        Ok(name)
    }
}

/// Render and write the wrapper script for a single job
pub fn materialize(
    config: &ExecutorConfig,
    workspace: &Workspace,
    jobscript: &str,
    job: &Job,
) -> Result<JobScript, ExecutorError> {
    let jobname = job_name(&config.jobname, job)?;
    let dir = workspace.dir().map_err(ExecutorError::Workspace)?;
    let path = dir.join(&jobname);

    let mut context = base_context(job);
    let finished = workspace
        .finished_marker(job.jobid)
        .map_err(ExecutorError::Workspace)?;
    let failed = workspace
        .failed_marker(job.jobid)
        .map_err(ExecutorError::Workspace)?;
    context.insert("jobfinished".into(), text(finished.to_string_lossy()));
    context.insert("jobfailed".into(), text(failed.to_string_lossy()));
    context.extend(execution_context(config, job, dir));

    let exec_job = render(&config.exec_job, &context, Quoting::All)
        .map_err(|missing| template_error(missing, job))?;
    context.insert("exec_job".into(), TemplateValue::Raw(exec_job));
    context.insert("properties".into(), TemplateValue::Raw(properties(job)));

    let content = render(jobscript, &context, Quoting::All)
        .map_err(|missing| template_error(missing, job))?;
    debug!(job = %job.name, "Jobscript:\n{content}");

    write_executable(&path, &content)?;

    Ok(JobScript {
        jobname,
        path,
        chdir: config.workdir.clone(),
    })
}

fn write_executable(path: &Path, content: &str) -> Result<(), ExecutorError> {
    let write_error = |source| ExecutorError::ScriptWrite {
        path: path.to_path_buf(),
        source,
    };

    fs::write(path, content).map_err(write_error)?;
    // rwx for the owner, nothing for anyone else
    fs::set_permissions(path, Permissions::from_mode(0o700)).map_err(write_error)
}

fn template_error(missing: MissingPlaceholder, job: &Job) -> ExecutorError {
    ExecutorError::TemplateFormat {
        placeholder: missing.0,
        job: job.name.clone(),
    }
}

fn text(value: impl Into<String>) -> TemplateValue {
    TemplateValue::Text(value.into())
}

/// values that only depend on the job itself
fn base_context(job: &Job) -> TemplateContext {
    let mut context = TemplateContext::new();

    context.insert("name".into(), text(job.name.as_str()));
    context.insert("jobid".into(), text(job.jobid.to_string()));
    context.insert(
        "wildcards".into(),
        TemplateValue::List(
            job.wildcards
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect(),
        ),
    );
    context.insert(
        "resources".into(),
        TemplateValue::List(
            job.resources
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect(),
        ),
    );

    for (key, value) in job.wildcards.iter() {
        context.insert(format!("wildcards.{key}"), text(value.as_str()));
    }
    for (key, value) in job.resources.iter() {
        context.insert(format!("resources.{key}"), text(value.to_string()));
    }

    context
}

/// values describing how the job is executed on the remote node
fn execution_context(config: &ExecutorConfig, job: &Job, workspace: &Path) -> TemplateContext {
    let mut context = TemplateContext::new();

    // the remote process has to run with the same toolchain as this one
    let path = config
        .interpreter_dir
        .as_ref()
        .map(|dir| format!("PATH={}:$PATH", quote(&dir.to_string_lossy())))
        .unwrap_or_default();

    let envvars = config
        .envvars
        .iter()
        .filter_map(|name| match env::var(name) {
            Ok(value) => Some(format!("{name}={}", quote(&value))),
            Err(_) => {
                warn!(job = %job.name, "Environment variable {name} is not set, not forwarding it");
                None
            }
        })
        .join(" ");

    // only force threads for single jobs, groups need proper process handling
    let use_threads = if job.is_group() {
        ""
    } else {
        "--force-use-threads"
    };

    let wait_for_files = std::iter::once(workspace.to_string_lossy().into_owned())
        .chain(
            job.wait_for_files
                .iter()
                .map(|file| file.to_string_lossy().into_owned()),
        )
        .collect();

    context.insert("workdir".into(), text(config.workdir.to_string_lossy()));
    context.insert("path".into(), TemplateValue::Raw(path));
    context.insert("envvars".into(), TemplateValue::Raw(envvars));
    context.insert(
        "entrypoint".into(),
        TemplateValue::List(config.entrypoint.clone()),
    );
    context.insert("targets".into(), TemplateValue::List(job.targets.clone()));
    context.insert("use_threads".into(), TemplateValue::Raw(use_threads.into()));
    context.insert("wait_for_files".into(), TemplateValue::List(wait_for_files));
    context.insert("latency_wait".into(), text(config.latency_wait.to_string()));

    context
}

/// single line json summary of the job, embedded as a comment in the script
fn properties(job: &Job) -> String {
    let kind = if job.is_group() { "group" } else { "single" };

    json!({
        "type": kind,
        "name": job.name,
        "jobid": job.jobid,
        "group": job.group,
        "wildcards": job.wildcards,
        "resources": job.resources,
        "targets": job.targets,
    })
    .to_string()
}
