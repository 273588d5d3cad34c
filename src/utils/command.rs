//! Child process primitives: bounded waits and captured stdout.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a waited-on child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(ExitStatus),
    /// The deadline passed; the child was killed and reaped.
    TimedOut,
}

/// Wait for a child, optionally bounded by `timeout`.
///
/// Without a timeout this blocks until the child exits. With one the child is
/// polled and killed once the deadline passes. Killing only reaches the direct
/// child; anything it spawned is left alone.
pub fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> io::Result<WaitOutcome> {
    let Some(timeout) = timeout else {
        return child.wait().map(WaitOutcome::Exited);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(WaitOutcome::Exited(status));
        }
        let now = Instant::now();
        if now >= deadline {
            // The child may exit between try_wait and kill.
            let _ = child.kill();
            child.wait()?;
            return Ok(WaitOutcome::TimedOut);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Captured result of [`capture_stdout`].
#[derive(Debug, Clone)]
pub struct CapturedRun {
    pub outcome: WaitOutcome,
    /// Empty when the run timed out.
    pub stdout: String,
}

/// Run `command` with piped stdout and a null stdin/stderr, bounded by `timeout`.
///
/// Stdout is drained on a separate thread so a chatty child cannot stall on a
/// full pipe while being polled. The deadline also covers reading stdout: a
/// background process that inherited the pipe keeps it open after the child
/// exits, and the run is then reported as timed out.
pub fn capture_stdout(mut command: Command, timeout: Duration) -> io::Result<CapturedRun> {
    let deadline = Instant::now() + timeout;
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });

    let timed_out = CapturedRun {
        outcome: WaitOutcome::TimedOut,
        stdout: String::new(),
    };

    let outcome = wait_with_timeout(&mut child, Some(timeout))?;
    if outcome == WaitOutcome::TimedOut {
        // Grandchildren may still hold the pipe open; leave the reader detached.
        return Ok(timed_out);
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(bytes) => Ok(CapturedRun {
            outcome,
            stdout: String::from_utf8_lossy(&bytes).into_owned(),
        }),
        Err(RecvTimeoutError::Timeout) => Ok(timed_out),
        Err(RecvTimeoutError::Disconnected) => {
            Err(io::Error::other("stdout reader thread exited without output"))
        }
    }
}

/// Exit code for reporting; `-1` when the process was ended by a signal.
pub fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
