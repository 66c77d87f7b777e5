//! Command execution with a deadline.
//!
//! Runs a program directly (no shell), captures exit code, stdout and
//! stderr, and kills the child when the deadline passes. Output is passed
//! back without interpretation; callers map exit codes and stderr to
//! `CapabilityError` themselves.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use dialdoc_shared::CapabilityError;

/// Maximum output length to capture per stream
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Full command line, for messages
    pub command: String,
    /// None when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr joined, for tools that split messages oddly
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Non-zero exit as `CommandFailed`
    pub fn into_failure(self) -> CapabilityError {
        CapabilityError::CommandFailed {
            command: self.command,
            exit_code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        }
    }
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` with `args`, bounded by `timeout`
pub fn run(program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput, CapabilityError> {
    execute(program, args, None, timeout)
}

/// Run with `input` written to the child's stdin. The input never appears
/// in the returned command line.
pub fn run_with_input(
    program: &str,
    args: &[&str],
    input: &str,
    timeout: Duration,
) -> Result<CommandOutput, CapabilityError> {
    execute(program, args, Some(input), timeout)
}

fn execute(
    program: &str,
    args: &[&str],
    input: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput, CapabilityError> {
    let command = command_line(program, args);
    let start = Instant::now();
    debug!("Running `{}` (timeout {} ms)", command, timeout.as_millis());

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => CapabilityError::Unavailable(format!("{} is not installed", program)),
            _ => CapabilityError::from(e),
        })?;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        // A child that exits before reading closes the pipe; its exit
        // status tells the story
        if let Err(e) = stdin.write_all(input.as_bytes()) {
            if e.kind() != ErrorKind::BrokenPipe {
                kill(&mut child);
                return Err(e.into());
            }
        }
    }

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = match wait_deadline(&mut child, start + timeout)? {
        Some(status) => status,
        None => {
            warn!("`{}` timed out after {} ms, killed", command, timeout.as_millis());
            kill(&mut child);
            return Err(CapabilityError::Timeout(timeout.as_millis() as u64));
        }
    };

    Ok(CommandOutput {
        command,
        exit_code: status.code(),
        stdout: collect(stdout),
        stderr: collect(stderr),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Exit status, or None when the deadline passed first
fn wait_deadline(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>, CapabilityError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("kill failed: {}", e);
    }
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| truncate_output(&bytes))
        .unwrap_or_default()
}

/// Truncate output to max bytes, converting to string
fn truncate_output(bytes: &[u8]) -> String {
    let slice = if bytes.len() > MAX_OUTPUT_BYTES {
        &bytes[..MAX_OUTPUT_BYTES]
    } else {
        bytes
    };
    String::from_utf8_lossy(slice).to_string()
}
