use once_cell::sync::OnceCell;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Private scratch directory of one executor instance
///
/// Holds the generated job scripts and the sentinel paths the remote side touches once a
/// job is done. The directory is created on first use and never removed by the executor.
#[derive(Debug)]
pub struct Workspace {
    control_dir: PathBuf,
    log_dir: PathBuf,
    dir: OnceCell<PathBuf>,
}

impl Workspace {
    pub fn new(control_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            control_dir: control_dir.into(),
            log_dir: log_dir.into(),
            dir: OnceCell::new(),
        }
    }

    /// absolute path of the scratch directory, created on the first call
    pub fn dir(&self) -> io::Result<&Path> {
        self.dir
            .get_or_try_init(|| {
                fs::create_dir_all(&self.control_dir)?;
                let dir = tempfile::Builder::new()
                    .prefix("tmp.")
                    .tempdir_in(&self.control_dir)?
                    .keep();
                let dir = fs::canonicalize(dir)?;
                debug!(path = ?dir, "Created executor workspace");

                Ok(dir)
            })
            .map(PathBuf::as_path)
    }

    /// directory for scheduler logs, the scheduler refuses to start jobs without it
    pub fn log_dir(&self) -> io::Result<&Path> {
        fs::create_dir_all(&self.log_dir)?;
        Ok(&self.log_dir)
    }

    pub fn finished_marker(&self, jobid: u64) -> io::Result<PathBuf> {
        Ok(self.dir()?.join(format!("{jobid}.jobfinished")))
    }

    pub fn failed_marker(&self, jobid: u64) -> io::Result<PathBuf> {
        Ok(self.dir()?.join(format!("{jobid}.jobfailed")))
    }
}
