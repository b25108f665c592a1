use itertools::Itertools;
use std::{
    io::{self, ErrorKind, Read},
    process::{Command, Stdio},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, trace, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for {program}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Output of a finished external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Everything the executor runs against the scheduler goes through this seam
///
/// Implementations must never block longer than `timeout`.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

impl<F> CommandRunner for F
where
    F: Fn(&str, &[String], Duration) -> Result<CommandOutput, CommandError> + Send + Sync,
{
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        self(program, args, timeout)
    }
}

// time the readers get to hand over buffered output once the child exited
const PIPE_GRACE: Duration = Duration::from_millis(100);

/// Runs commands as child processes, killing them once the timeout is hit
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        debug!("Running {program} {}", args.iter().join(" "));
        let started = Instant::now();

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_owned(),
                source,
            })?;

        // drain both pipes concurrently, a full pipe would otherwise stall the child
        let stdout = child.stdout.take().map(read_pipe);
        let stderr = child.stderr.take().map(read_pipe);

        match child
            .wait_timeout(timeout)
            .map_err(|source| CommandError::Wait {
                program: program.to_owned(),
                source,
            })? {
            Some(status) => {
                // a background descendant may keep the pipes open long after the exit
                let deadline = (started + timeout).max(Instant::now() + PIPE_GRACE);
                let output = CommandOutput {
                    code: status.code(),
                    stdout: collect_pipe(program, stdout, deadline),
                    stderr: collect_pipe(program, stderr, deadline),
                };
                trace!(code = ?output.code, stdout = %output.stdout, "{program} finished");

                Ok(output)
            }
            None => {
                // child hasn't exited yet
                if let Err(error) = child.kill() {
                    warn!(error = ?error, "Failed to kill {program} after timeout");
                }
                if let Err(error) = child.wait() {
                    warn!(error = ?error, "Failed to reap {program} after timeout");
                }

                Err(CommandError::Timeout {
                    program: program.to_owned(),
                    timeout,
                })
            }
        }
    }
}

fn read_pipe<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (sender, receiver) = mpsc::channel();

    thread::spawn(move || {
        let mut buffer = [0; 8192];
        loop {
            match pipe.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => {
                    if sender.send(buffer[..read].to_vec()).is_err() {
                        break;
                    }
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => {
                    warn!(error = ?error, "Failed to read output of child process");
                    break;
                }
            }
        }
    });

    receiver
}

/// gather everything read from a pipe until it closes or the deadline passes
fn collect_pipe(program: &str, receiver: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    let mut bytes = Vec::new();

    if let Some(receiver) = receiver {
        loop {
            match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(chunk) => bytes.extend(chunk),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Output of {program} still open after it exited, keeping what was read so far");
                    break;
                }
            }
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}
