use parking_lot::Mutex;
use slurmexec::{
    executors::{
        command::{CommandError, CommandOutput},
        slurm::SlurmExecutor,
    },
    ConfigErrors, ErrorCallback, ExecutorConfig, ExecutorError, Executors, Job, JobList,
    RunnerConfig, SuccessCallback,
};
use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

#[test]
pub fn unsupported_executor_is_rejected() {
    let config = ExecutorConfig {
        name: "pbs".into(),
        entrypoint: vec!["workflow".into()],
        ..Default::default()
    };

    match Executors::load(config) {
        Err(ConfigErrors::UnsupportedExecutor(name)) => assert_eq!(name, "pbs"),
        other => panic!("expected an unsupported executor, got {other:?}"),
    }
}

#[test]
pub fn demo_files_parse() {
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos");

    let config = RunnerConfig::load(&demos.join("executor.yaml")).unwrap();
    let jobs = JobList::load(&demos.join("jobs.yaml")).unwrap();

    assert_eq!(config.executor.entrypoint[0], "snakemake");
    assert_eq!(jobs.jobs.len(), 2);
    assert!(jobs.jobs[1].is_group());
}

#[test]
pub fn jobs_run_against_a_scripted_scheduler() {
    let root = tempfile::tempdir().unwrap();
    let submitted_scripts = Arc::new(Mutex::new(Vec::new()));
    let runner = {
        let submitted_scripts = submitted_scripts.clone();
        move |program: &str, args: &[String], _: Duration| -> Result<CommandOutput, CommandError> {
            match program {
                "sbatch" => {
                    let script = args.last().cloned().unwrap_or_default();
                    let mut scripts = submitted_scripts.lock();
                    scripts.push(script);
                    Ok(CommandOutput::success(format!("Submitted batch job {}", 100 + scripts.len())))
                }
                // job 101 succeeds, job 102 fails
                "sacct" if args[3] == "101" => Ok(CommandOutput::success("101|COMPLETED|0:0\n")),
                "sacct" => Ok(CommandOutput::success(format!("{}|FAILED|1:0\n", args[3]))),
                _ => Ok(CommandOutput::failure(1, "unexpected")),
            }
        }
    };
    let config = ExecutorConfig {
        workdir: root.path().to_path_buf(),
        control_dir: root.path().join("control"),
        entrypoint: vec!["workflow".into()],
        max_status_checks_per_second: 500.0,
        ..Default::default()
    };
    let executor = SlurmExecutor::with_runner(config, Arc::new(runner)).unwrap();

    let succeeded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(Mutex::new(Vec::new()));
    let on_success: SuccessCallback = {
        let succeeded = succeeded.clone();
        Arc::new(move |_: &Job| {
            succeeded.fetch_add(1, Ordering::SeqCst);
        })
    };
    let on_error: ErrorCallback = {
        let failed = failed.clone();
        Arc::new(move |job: &Job, error: &ExecutorError| {
            failed.lock().push(format!("{}: {error}", job.name))
        })
    };

    let jobs = ["index", "call"].into_iter().enumerate().map(|(jobid, name)| {
        Job::new(name, jobid as u64)
            .with_resource("account", "acct1")
            .with_resource("partition", "batch")
            .with_resource("walltime_minutes", 30)
    });
    assert_eq!(executor.submit_jobs(jobs, on_success, on_error), 2);

    executor.wait_for_jobs().unwrap();

    assert_eq!(succeeded.load(Ordering::SeqCst), 1);
    assert_eq!(
        *failed.lock(),
        ["call: Job 'call' (external id 102) failed with status FAILED"]
    );
    for script in submitted_scripts.lock().iter() {
        let content = fs::read_to_string(script).unwrap();
        assert!(content.starts_with("#!/bin/sh\n"));
        assert!(content.contains("--cluster-jobstep"));
    }
}
