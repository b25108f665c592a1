use super::{
    active::{ActiveJob, ActiveSet, ErrorCallback, SuccessCallback},
    command::{CommandError, CommandRunner, ProcessRunner},
    limiter::RateLimiter,
    resources::SubmissionParams,
    script::{self, JobScript, DEFAULT_JOBSCRIPT},
    status::{JobStatus, QueryOutcome, StatusMechanism},
    workspace::Workspace,
    ExecutorError,
};
use crate::{
    config::{ConfigErrors, ExecutorConfig},
    job::{ExternalId, Job},
};
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use std::{
    fmt, fs,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, error, info, instrument, trace, warn};

/// Counts of one reconciliation sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
}

/// Outcome of a best-effort `cancel_all`
#[derive(Debug, Default)]
pub struct CancelReport {
    pub attempted: usize,
    pub cancelled: usize,
    pub rejected: usize,
    pub timed_out: usize,
    // error the status poller ended with before cancelling started
    pub poller_error: Option<ExecutorError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelOutcome {
    Cancelled,
    Rejected,
    TimedOut,
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }

    fn reset(&self) {
        *self.stopped.lock() = false;
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// sleep for `timeout` unless stopped earlier, returns whether a stop was requested
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.condvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

/// State shared by the submission path and the status poller of one executor
pub struct ExecutorContext {
    config: ExecutorConfig,
    jobscript: String,
    runner: Arc<dyn CommandRunner>,
    active: ActiveSet,
    limiter: RateLimiter,
    workspace: Workspace,
    stop: StopSignal,
}

impl fmt::Debug for ExecutorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorContext")
            .field("config", &self.config)
            .field("active", &self.active)
            .field("limiter", &self.limiter)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

impl ExecutorContext {
    fn new(mut config: ExecutorConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, ConfigErrors> {
        config.preflight_checks()?;

        let jobscript = match config.jobscript {
            Some(ref path) => fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
                path: path.clone(),
                source,
            })?,
            None => DEFAULT_JOBSCRIPT.to_owned(),
        };

        Ok(Self {
            limiter: RateLimiter::per_second(config.max_status_checks_per_second),
            workspace: Workspace::new(&config.control_dir, config.log_dir()),
            active: ActiveSet::new(),
            stop: StopSignal::default(),
            jobscript,
            runner,
            config,
        })
    }

    #[instrument(skip_all, fields(job = %job.name, jobid = job.jobid))]
    fn submit(
        &self,
        job: &Job,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) -> Result<ExternalId, ExecutorError> {
        let params = SubmissionParams::from_job(job)?;
        let script = script::materialize(&self.config, &self.workspace, &self.jobscript, job)?;
        let args = self.submission_args(&params, &script)?;
        let program = &self.config.commands.submit;

        let output = self
            .runner
            .run(program, &args, self.config.submit_timeout())
            .map_err(|source| ExecutorError::SubmissionFailed {
                job: job.name.clone(),
                reason: format!("{program} could not be run"),
                source: Some(source),
            })?;

        if !output.is_success() {
            return Err(ExecutorError::SubmissionFailed {
                job: job.name.clone(),
                reason: format!(
                    "{program} exited with {:?}: {}",
                    output.code,
                    output.stderr.trim()
                ),
                source: None,
            });
        }

        let external_id =
            parse_external_id(&output.stdout).ok_or_else(|| ExecutorError::SubmissionFailed {
                job: job.name.clone(),
                reason: format!("no job id in the output of {program}: {:?}", output.stdout),
                source: None,
            })?;

        info!(external_id = %external_id, "Submitted job");
        self.active.push(ActiveJob::new(
            job.clone(),
            external_id.clone(),
            on_success,
            on_error,
        ));

        Ok(external_id)
    }

    fn submission_args(
        &self,
        params: &SubmissionParams,
        script: &JobScript,
    ) -> Result<Vec<String>, ExecutorError> {
        let log_dir = self.workspace.log_dir().map_err(ExecutorError::Workspace)?;
        let mut args = params.args();

        args.extend([
            "-J".to_owned(),
            script.jobname.clone(),
            "-o".to_owned(),
            log_dir.join("%x_%j.log").to_string_lossy().into_owned(),
            "--export=ALL".to_owned(),
            format!("--chdir={}", script.chdir.to_string_lossy()),
            script.path.to_string_lossy().into_owned(),
        ]);

        Ok(args)
    }

    /// try both status mechanisms until one yields a status or the attempts are used up
    fn query_status(&self, external_id: &ExternalId, job: &str) -> Result<JobStatus, ExecutorError> {
        let attempts = self.config.status_attempts;

        for attempt in 1..=attempts {
            for mechanism in StatusMechanism::ORDER {
                // every single query counts against the shared limit
                self.limiter.acquire();

                match self.query(mechanism, external_id) {
                    QueryOutcome::Success(status) => {
                        trace!(job, external_id = %external_id, status = %status, "Retrieved status via {mechanism}");
                        return Ok(status);
                    }
                    QueryOutcome::TransientFailure(reason) => {
                        warn!(job, external_id = %external_id, attempt, "{mechanism} status query failed: {reason}");
                    }
                    QueryOutcome::Unavailable => {
                        debug!(job, external_id = %external_id, attempt, "No status available via {mechanism}");
                    }
                }
            }
        }

        Err(ExecutorError::StatusQueryExhausted {
            job: job.to_owned(),
            external_id: external_id.clone(),
            attempts,
        })
    }

    fn query(&self, mechanism: StatusMechanism, external_id: &ExternalId) -> QueryOutcome {
        let program = match mechanism {
            StatusMechanism::Accounting => &self.config.commands.accounting,
            StatusMechanism::Control => &self.config.commands.control,
        };

        match self.runner.run(
            program,
            &mechanism.args(external_id),
            self.config.status_timeout(),
        ) {
            Ok(output) if output.is_success() => mechanism.parse(&output.stdout, external_id),
            Ok(output) => QueryOutcome::TransientFailure(format!(
                "{program} exited with {:?}: {}",
                output.code,
                output.stderr.trim()
            )),
            Err(error) => QueryOutcome::TransientFailure(error.to_string()),
        }
    }

    /// Reconcile every active entry once
    ///
    /// With a `stop` signal the sweep ends early once it is raised, the remaining entries
    /// go back to the set untouched.
    #[instrument(skip_all, level = "debug")]
    fn sweep(&self, stop: Option<&StopSignal>) -> Result<SweepReport, ExecutorError> {
        let taken = self.active.take();
        let swept = taken.len();
        let mut report = SweepReport::default();
        let mut still_running = Vec::with_capacity(swept);
        let mut result = Ok(());
        let mut entries = taken.into_iter();

        while let Some(entry) = entries.next() {
            if stop.map_or(false, StopSignal::is_stopped) {
                debug!("Sweep interrupted, {} entries left", entries.len() + 1);
                still_running.push(entry);
                still_running.extend(entries.by_ref());
                break;
            }

            match self.query_status(&entry.external_id, &entry.job.name) {
                Ok(JobStatus::Completed) => {
                    info!(job = %entry.job.name, external_id = %entry.external_id, "Job completed");
                    report.completed += 1;
                    entry.succeed();
                }
                Ok(JobStatus::Failed(status)) => {
                    error!(job = %entry.job.name, external_id = %entry.external_id, "Job failed with status {status}");
                    report.failed += 1;
                    let error = ExecutorError::TerminalFailureReported {
                        job: entry.job.name.clone(),
                        external_id: entry.external_id.clone(),
                        status,
                    };
                    entry.fail(error);
                }
                Ok(JobStatus::Active(status)) => {
                    trace!(job = %entry.job.name, external_id = %entry.external_id, "Job still {status}");
                    report.running += 1;
                    still_running.push(entry);
                }
                Err(error) => {
                    error!(job = %entry.job.name, external_id = %entry.external_id, "Aborting reconciliation: {error}");
                    // keep everything that was not reconciled, nothing may be lost
                    still_running.push(entry);
                    still_running.extend(entries.by_ref());
                    result = Err(error);
                    break;
                }
            }
        }

        self.active.merge(still_running, swept);

        result.map(|()| report)
    }
}

fn parse_external_id(output: &str) -> Option<ExternalId> {
    output.split_whitespace().last().map(ExternalId::new)
}

fn poll(context: Arc<ExecutorContext>) -> Result<(), ExecutorError> {
    let interval = context.config.status_interval();
    debug!(?interval, "Started status poller");

    while !context.stop.is_stopped() {
        context.sweep(Some(&context.stop))?;

        if context.stop.wait(interval) {
            break;
        }
    }

    debug!("Status poller stopped");
    Ok(())
}

/// Executor submitting jobs with `sbatch` and tracking them until they are terminal
#[derive(Debug)]
pub struct SlurmExecutor {
    context: Arc<ExecutorContext>,
    poller: Mutex<Option<JoinHandle<Result<(), ExecutorError>>>>,
}

impl SlurmExecutor {
    /// create a new SlurmExecutor running the real scheduler commands
    pub fn load(config: ExecutorConfig) -> Result<Self, ConfigErrors> {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    pub fn with_runner(
        config: ExecutorConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ConfigErrors> {
        Ok(Self {
            context: Arc::new(ExecutorContext::new(config, runner)?),
            poller: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.context.config
    }

    /// Submit a single job and register it as active
    ///
    /// On error nothing is registered and no callback is invoked, the caller decides.
    pub fn submit(
        &self,
        job: &Job,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) -> Result<ExternalId, ExecutorError> {
        self.context.submit(job, on_success, on_error)
    }

    /// Submit every job, routing per-job failures to `on_error`
    ///
    /// Returns the number of jobs that made it to the scheduler.
    pub fn submit_jobs<I>(&self, jobs: I, on_success: SuccessCallback, on_error: ErrorCallback) -> usize
    where
        I: IntoIterator<Item = Job>,
    {
        let mut submitted = 0;

        for job in jobs {
            match self
                .context
                .submit(&job, on_success.clone(), on_error.clone())
            {
                Ok(_) => submitted += 1,
                Err(error) => {
                    error!(job = %job.name, jobid = job.jobid, "{error}");
                    on_error(&job, &error);
                }
            }
        }

        submitted
    }

    pub fn job_status(&self, external_id: &ExternalId) -> Result<JobStatus, ExecutorError> {
        let job = self
            .context
            .active
            .job_name(external_id)
            .unwrap_or_else(|| "<unknown>".to_owned());

        self.context.query_status(external_id, &job)
    }

    /// run one reconciliation sweep on the calling thread
    pub fn sweep(&self) -> Result<SweepReport, ExecutorError> {
        self.context.sweep(None)
    }

    /// number of submitted jobs that are not terminal yet
    pub fn pending(&self) -> usize {
        self.context.active.pending()
    }

    /// start the background status poller, a running poller is left alone
    pub fn start(&self) -> Result<(), ExecutorError> {
        let mut poller = self.poller.lock();

        if let Some(handle) = poller.take() {
            if !handle.is_finished() {
                *poller = Some(handle);
                return Ok(());
            }

            match handle.join() {
                Ok(Err(error)) => warn!("Previous status poller ended with: {error}"),
                Err(_) => warn!("Previous status poller panicked"),
                Ok(Ok(())) => {}
            }
        }

        self.context.stop.reset();
        let context = self.context.clone();
        let handle = thread::Builder::new()
            .name("status-poller".into())
            .spawn(move || poll(context))
            .map_err(ExecutorError::PollerSpawn)?;
        *poller = Some(handle);

        Ok(())
    }

    /// Block until every submitted job was reported terminal
    ///
    /// Returns early with the poller's error if reconciliation had to be aborted, and with
    /// `WaitInterrupted` if the poller was stopped or jobs were cancelled from elsewhere.
    pub fn wait_for_jobs(&self) -> Result<(), ExecutorError> {
        let dropped_before = self.context.active.dropped();
        self.start()?;
        let pause = self.context.config.status_interval().min(Duration::from_millis(100));

        loop {
            if self.context.active.is_idle() {
                break;
            }

            let poller_finished = self
                .poller
                .lock()
                .as_ref()
                .map_or(true, JoinHandle::is_finished);
            if poller_finished {
                break;
            }

            thread::sleep(pause);
        }

        self.shutdown()?;

        // pending first, a concurrent drain moves entries from one count to the other
        let pending = self.pending();
        let cancelled = self.context.active.dropped() - dropped_before;
        if pending > 0 || cancelled > 0 {
            return Err(ExecutorError::WaitInterrupted { pending, cancelled });
        }

        Ok(())
    }

    /// stop the status poller and surface the error it ended with, if any
    pub fn shutdown(&self) -> Result<(), ExecutorError> {
        self.context.stop.stop();
        let handle = self.poller.lock().take();

        match handle {
            Some(handle) => handle.join().map_err(|_| ExecutorError::PollerPanicked)?,
            None => Ok(()),
        }
    }

    /// Best-effort cancellation of every active job
    ///
    /// The poller is stopped first so that entries of an ongoing sweep are back in the set.
    /// Cancelled jobs leave the set without any callback.
    #[instrument(skip(self), level = "info")]
    pub fn cancel_all(&self) -> CancelReport {
        let poller_error = self.shutdown().err();
        if let Some(ref error) = poller_error {
            warn!("Status poller ended with an error before cancelling: {error}");
        }

        let entries = self.context.active.drain();
        let runner = &self.context.runner;
        let program = &self.context.config.commands.cancel;
        let timeout = self.context.config.cancel_timeout();

        // every cancel runs with its own timeout, a hanging one can't hold up the others
        let outcomes: Vec<CancelOutcome> = entries
            .par_iter()
            .map(|entry| {
                let args = [entry.external_id.to_string()];

                match runner.run(program, &args, timeout) {
                    Ok(output) if output.is_success() => {
                        info!(job = %entry.job.name, external_id = %entry.external_id, "Cancelled job");
                        CancelOutcome::Cancelled
                    }
                    Ok(output) => {
                        warn!(job = %entry.job.name, external_id = %entry.external_id, "{program} exited with {:?}: {}", output.code, output.stderr.trim());
                        CancelOutcome::Rejected
                    }
                    Err(CommandError::Timeout { .. }) => {
                        warn!(job = %entry.job.name, external_id = %entry.external_id, "{program} timed out after {timeout:?}");
                        CancelOutcome::TimedOut
                    }
                    Err(error) => {
                        warn!(job = %entry.job.name, external_id = %entry.external_id, "Failed to cancel: {error}");
                        CancelOutcome::Rejected
                    }
                }
            })
            .collect();

        let count = |wanted: CancelOutcome| outcomes.iter().filter(|outcome| **outcome == wanted).count();

        CancelReport {
            attempted: outcomes.len(),
            cancelled: count(CancelOutcome::Cancelled),
            rejected: count(CancelOutcome::Rejected),
            timed_out: count(CancelOutcome::TimedOut),
            poller_error,
        }
    }
}

impl Drop for SlurmExecutor {
    fn drop(&mut self) {
        // the poller holds its own reference to the context
        self.context.stop.stop();
    }
}
