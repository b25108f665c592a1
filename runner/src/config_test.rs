use crate::config::{ConfigErrors, ExecutorConfig, JobList, RunnerConfig};
use std::{path::Path, time::Duration};

#[test]
pub fn minimal_config_gets_defaults() {
    let config: RunnerConfig = serde_yaml::from_str(
        "executor:\n  entrypoint: [workflow]\n  timeouts:\n    cancel: 5\n",
    )
    .unwrap();
    let executor = config.executor;

    assert_eq!(executor.name, "slurm");
    assert_eq!(executor.status_attempts, 10);
    assert_eq!(executor.status_interval(), Duration::from_secs(1));
    assert_eq!(executor.cancel_timeout(), Duration::from_secs(5));
    assert_eq!(executor.submit_timeout(), Duration::from_secs(60));
    assert_eq!(executor.commands.accounting, "sacct");
    assert_eq!(executor.log_dir(), Path::new(".slurmexec/slurm_logs"));
}

#[test]
pub fn unknown_keys_are_rejected() {
    assert!(serde_yaml::from_str::<RunnerConfig>("executor:\n  nmae: slurm\n").is_err());
}

#[test]
pub fn jobs_parse_with_mixed_resources() {
    let jobs: JobList = serde_yaml::from_str(
        "jobs:\n  - name: align\n    jobid: 3\n    resources:\n      account: acct1\n      walltime_minutes: 60\n      mpi: true\n",
    )
    .unwrap();
    let job = &jobs.jobs[0];

    assert_eq!(job.resource("walltime_minutes").and_then(|value| value.as_u64()), Some(60));
    assert!(job.resource("mpi").unwrap().is_truthy());
    assert!(!job.is_group());
}

#[test]
pub fn preflight_resolves_paths_and_reports_errors() {
    let mut config = ExecutorConfig {
        entrypoint: vec!["workflow".into()],
        ..Default::default()
    };
    config.preflight_checks().unwrap();

    assert!(config.workdir.is_absolute());
    assert!(config.control_dir.starts_with(&config.workdir));
    assert!(config.interpreter_dir.is_some());

    let mut broken = ExecutorConfig {
        max_status_checks_per_second: 0.0,
        status_attempts: 0,
        ..Default::default()
    };
    assert!(matches!(
        broken.preflight_checks(),
        Err(ConfigErrors::Preflight)
    ));
}
