use clap::Parser;
use slurmexec::{ErrorCallback, ExecutorError, Executors, Job, JobList, RunnerConfig, SuccessCallback};
use std::{
    path::PathBuf,
    process::exit,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;

/// Submit jobs to a SLURM cluster and wait for them to finish
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// executor configuration (yaml)
    #[arg(short, long)]
    config: PathBuf,
    /// jobs to submit (yaml)
    #[arg(short, long)]
    jobs: PathBuf,
    /// cancel all outstanding jobs if their status can't be tracked anymore
    #[arg(long)]
    cancel_on_error: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = RunnerConfig::load(&cli.config).unwrap_or_log();
    let jobs = JobList::load(&cli.jobs).unwrap_or_log().jobs;
    let executor = Executors::load(config.executor).unwrap_or_log();

    let succeeded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let on_success: SuccessCallback = {
        let succeeded = succeeded.clone();
        Arc::new(move |job: &Job| {
            info!(job = %job.name, "Finished job");
            succeeded.fetch_add(1, Ordering::SeqCst);
        })
    };
    let on_error: ErrorCallback = {
        let failed = failed.clone();
        Arc::new(move |job: &Job, error: &ExecutorError| {
            error!(job = %job.name, "{error}");
            failed.fetch_add(1, Ordering::SeqCst);
        })
    };

    let total = jobs.len();
    let submitted = executor.submit_jobs(jobs, on_success, on_error);
    info!("Submitted {submitted}/{total} jobs");

    if let Err(error) = executor.wait_for_jobs() {
        error!("Lost track of the submitted jobs: {error}");

        if cli.cancel_on_error {
            let report = executor.cancel_all();
            warn!(
                "Cancelled {}/{} jobs ({} timed out, {} rejected)",
                report.cancelled, report.attempted, report.timed_out, report.rejected
            );
        }

        exit(2);
    }

    let failed = failed.load(Ordering::SeqCst);
    info!(
        "Done with {}/{total} jobs, {failed} failed",
        succeeded.load(Ordering::SeqCst)
    );

    if failed > 0 {
        exit(1);
    }
}
