use super::{
    script::{job_name, materialize, DEFAULT_JOBSCRIPT},
    workspace::Workspace,
    ExecutorError,
};
use crate::{config::ExecutorConfig, job::Job};
use std::{fs, os::unix::fs::PermissionsExt, path::Path};

fn config(root: &Path) -> ExecutorConfig {
    ExecutorConfig {
        workdir: root.join("project dir"),
        control_dir: root.join("control"),
        entrypoint: vec!["workflow".into(), "--snakefile".into(), "Snakefile".into()],
        interpreter_dir: Some(root.join("env/bin")),
        ..Default::default()
    }
}

fn job() -> Job {
    let mut job = Job::new("map_reads", 17)
        .with_resource("cores", 4)
        .with_resource("mem_mb", 1000);
    job.wildcards.insert("sample".into(), "patient A".into());
    job.targets.push("mapped/patient A.bam".into());
    job
}

#[test]
pub fn script_is_written_and_executable() {
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let workspace = Workspace::new(&config.control_dir, config.log_dir());

    let script = materialize(&config, &workspace, DEFAULT_JOBSCRIPT, &job()).unwrap();

    assert_eq!(script.jobname, "slurmjob.map_reads.17.sh");
    assert_eq!(script.path.parent().unwrap(), workspace.dir().unwrap());
    assert_eq!(script.chdir, config.workdir);

    let mode = fs::metadata(&script.path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);

    let content = fs::read_to_string(&script.path).unwrap();
    let workdir = config.workdir.to_string_lossy();
    let interpreter = config.interpreter_dir.as_ref().unwrap().to_string_lossy();

    assert!(content.starts_with("#!/bin/sh\n# properties = {"));
    assert!(content.contains(r#""name":"map_reads""#));
    assert!(content.contains(&format!("cd '{workdir}' && PATH={interpreter}:$PATH")));
    assert!(content.contains("workflow --snakefile Snakefile 'mapped/patient A.bam'"));
    assert!(content.contains("--single-job 17"));
    assert!(content.contains("--wildcards 'sample=patient A'"));
    assert!(content.contains("--resources cores=4 mem_mb=1000"));
    assert!(content.contains("--force-use-threads"));
    assert!(content.contains("17.jobfinished"));
    assert!(content.contains("17.jobfailed"));
}

#[test]
pub fn group_jobs_do_not_force_threads() {
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let workspace = Workspace::new(&config.control_dir, config.log_dir());
    let mut job = job();
    job.group = Some("g1".into());

    let script = materialize(&config, &workspace, DEFAULT_JOBSCRIPT, &job).unwrap();
    let content = fs::read_to_string(script.path).unwrap();

    assert!(!content.contains("--force-use-threads"));
    assert!(content.contains(r#""type":"group""#));
}

#[test]
pub fn dotted_placeholders_in_custom_templates() {
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let workspace = Workspace::new(&config.control_dir, config.log_dir());

    let script = materialize(
        &config,
        &workspace,
        "#!/bin/bash\necho {wildcards.sample} {resources.cores}\n{exec_job}\n",
        &job(),
    )
    .unwrap();
    let content = fs::read_to_string(script.path).unwrap();

    assert!(content.contains("echo 'patient A' 4\n"));
}

#[test]
pub fn unknown_placeholder_names_the_placeholder() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config(root.path());
    config.exec_job = "{entrypoint} --cores {nonexistent}".into();
    let workspace = Workspace::new(&config.control_dir, config.log_dir());

    match materialize(&config, &workspace, DEFAULT_JOBSCRIPT, &job()) {
        Err(ExecutorError::TemplateFormat { placeholder, job }) => {
            assert_eq!(placeholder, "nonexistent");
            assert_eq!(job, "map_reads");
        }
        other => panic!("expected a template error, got {other:?}"),
    }
}

#[test]
pub fn job_names_with_separators_are_rejected() {
    let job = Job::new("results/out", 1);

    assert!(matches!(
        job_name("{name}.sh", &job),
        Err(ExecutorError::InvalidJobName { .. })
    ));
    assert_eq!(job_name("job.{jobid}.sh", &job).unwrap(), "job.1.sh");
}
