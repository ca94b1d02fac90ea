//! Scoped external process invocation: bounded by a timeout, always reaped,
//! with captured output for diagnostics.

use std::{
    ffi::OsStr,
    io::{self, Read},
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, instrument, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed while waiting for {program}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// The tail of stderr, which is where engines report the actual failure.
    #[must_use]
    pub fn diagnostic(&self, limit: usize) -> String {
        truncate_tail(self.stderr.trim_end(), limit)
    }
}

/// Kills and reaps the child unless it was waited on to completion.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(error) = self.child.kill() {
            debug!(?error, "child already gone while cleaning up");
        }
        let _ = self.child.wait();
    }
}

#[instrument(
    skip(args),
    fields(program = %program.display(), timeout_ms = timeout.as_millis() as u64)
)]
pub fn run_command<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
) -> Result<CommandOutput, RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program_name = program.display().to_string();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: program_name.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    let mut guard = ChildGuard {
        child,
        reaped: false,
    };

    let started = Instant::now();
    let status = loop {
        match guard.child.try_wait() {
            Ok(Some(status)) => {
                guard.reaped = true;
                break status;
            }
            Ok(None) if started.elapsed() >= timeout => {
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "process timed out, killing it"
                );
                // Reader threads are left to finish on their own: grandchildren
                // may still hold the pipes open.
                drop(guard);
                return Err(RunError::TimedOut {
                    program: program_name,
                    timeout,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                return Err(RunError::Wait {
                    program: program_name,
                    source,
                });
            }
        }
    };

    let output = CommandOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    };
    debug!(
        status = ?output.status.code(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "process finished"
    );
    Ok(output)
}

#[must_use]
pub fn truncate_tail(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    text.chars().skip(count - limit).collect()
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Err(error) = reader.read_to_end(&mut bytes) {
            debug!(?error, "process pipe closed early");
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|handle| handle.join().unwrap_or_default())
        .unwrap_or_default()
}
