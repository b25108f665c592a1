use super::ExecutorError;
use crate::job::{ExternalId, Job};
use parking_lot::FairMutex;
use std::{fmt, sync::Arc};

pub type SuccessCallback = Arc<dyn Fn(&Job) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&Job, &ExecutorError) + Send + Sync>;

/// A submitted job the scheduler has not reported as terminal yet
///
/// Finishing consumes the entry, so each of its callbacks can fire at most once.
pub struct ActiveJob {
    pub job: Job,
    pub external_id: ExternalId,
    on_success: SuccessCallback,
    on_error: ErrorCallback,
}

impl ActiveJob {
    pub fn new(
        job: Job,
        external_id: ExternalId,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            job,
            external_id,
            on_success,
            on_error,
        }
    }

    pub fn succeed(self) {
        (self.on_success)(&self.job);
    }

    pub fn fail(self, error: ExecutorError) {
        (self.on_error)(&self.job, &error);
    }
}

impl fmt::Debug for ActiveJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveJob")
            .field("job", &self.job.name)
            .field("external_id", &self.external_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Entries {
    listed: Vec<ActiveJob>,
    // taken by a running sweep and not merged back yet
    in_flight: usize,
    // removed by `drain` without ever being reconciled
    dropped: usize,
}

/// Jobs shared between the submission path and the status poller
///
/// The lock is only held to move entries in and out, never across a scheduler call.
#[derive(Debug, Default)]
pub struct ActiveSet {
    entries: FairMutex<Entries>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: ActiveJob) {
        self.entries.lock().listed.push(job);
    }

    /// snapshot and clear the set for a sweep, the entries count as in flight until `merge`
    pub fn take(&self) -> Vec<ActiveJob> {
        let mut entries = self.entries.lock();
        let taken = std::mem::take(&mut entries.listed);
        entries.in_flight += taken.len();

        taken
    }

    /// return the entries of a finished sweep that are still running
    pub fn merge(&self, still_running: Vec<ActiveJob>, swept: usize) {
        let mut entries = self.entries.lock();
        entries.listed.extend(still_running);
        entries.in_flight = entries.in_flight.saturating_sub(swept);
    }

    /// remove every listed entry without marking it in flight
    pub fn drain(&self) -> Vec<ActiveJob> {
        let mut entries = self.entries.lock();
        let drained = std::mem::take(&mut entries.listed);
        entries.dropped += drained.len();

        drained
    }

    /// total number of entries removed by `drain`
    pub fn dropped(&self) -> usize {
        self.entries.lock().dropped
    }

    /// listed plus in flight entries
    pub fn pending(&self) -> usize {
        let entries = self.entries.lock();
        entries.listed.len() + entries.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn job_name(&self, external_id: &ExternalId) -> Option<String> {
        self.entries
            .lock()
            .listed
            .iter()
            .find(|entry| &entry.external_id == external_id)
            .map(|entry| entry.job.name.clone())
    }
}
