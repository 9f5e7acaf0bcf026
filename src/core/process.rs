//! Scoped external process invocation
//!
//! Every backend call (input generator, per-language evaluator) is a blocking
//! subprocess bounded by a wall-clock deadline. On timeout the child is
//! killed and whatever it already flushed to its output file is salvaged by
//! the caller; temp files clean themselves up on every exit path.

use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use super::pool::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a bounded subprocess run ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Exited on its own within the deadline.
    Completed(ExitStatus),
    /// Deadline passed; the child was killed.
    TimedOut,
    /// Cancellation was requested; the child was killed.
    Cancelled,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ProcessOutcome::Completed(status) if status.success())
    }
}

/// Create a temp file for exchanging JSON with an external driver.
/// Dropping the handle removes the file.
pub fn scratch_file(prefix: &str) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".json")
        .tempfile()
}

/// Spawn `command` and wait for it, polling against `deadline`. A `None`
/// deadline waits forever (modulo cancellation). On timeout or cancellation
/// the child is killed rather than awaited.
pub fn run_with_deadline(
    command: &mut Command,
    deadline: Option<Duration>,
    cancel: &CancelToken,
) -> io::Result<ProcessOutcome> {
    let started = Instant::now();
    let mut child = command.stderr(Stdio::null()).spawn()?;

    loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(ProcessOutcome::Cancelled);
        }

        match child.try_wait()? {
            Some(status) => return Ok(ProcessOutcome::Completed(status)),
            None => {
                if let Some(limit) = deadline {
                    if started.elapsed() >= limit {
                        let _ = child.kill();
                        // Reap, so the salvaged output file is fully flushed
                        // and no zombie lingers.
                        let _ = child.wait();
                        return Ok(ProcessOutcome::TimedOut);
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Interpret a user-facing timeout knob: negative means unbounded.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs < 0.0 {
        None
    } else {
        Some(Duration::from_secs_f64(secs))
    }
}
