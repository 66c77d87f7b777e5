//! Logging for dialdoc runs.
//!
//! - `init_tracing`: stderr subscriber, `RUST_LOG` wins over `-v`
//! - `RunLogEntry`: one JSON line per invocation, XDG-compliant path with
//!   a fallback chain
//! - `transcript_callback`: progress lines appended to a file

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::progress::LogCallback;
use crate::workflow::WorkflowResult;

/// Set up the global subscriber on stderr. Calling twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run log entry for each dialdoc invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// ISO 8601 timestamp
    pub ts: String,

    pub run_id: String,

    /// quick, full or sweep
    pub command: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_status: Option<String>,

    #[serde(default)]
    pub ok_count: usize,
    #[serde(default)]
    pub warn_count: usize,
    #[serde(default)]
    pub fail_count: usize,

    pub exit_code: i32,

    pub duration_ms: u64,

    /// Run completed without a fatal error
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunLogEntry {
    pub fn new(command: &str, run_id: &str) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            run_id: run_id.to_string(),
            command: command.to_string(),
            overall_status: None,
            ok_count: 0,
            warn_count: 0,
            fail_count: 0,
            exit_code: 0,
            duration_ms: 0,
            ok: true,
            error: None,
        }
    }

    /// Entry for a completed workflow
    pub fn from_result(command: &str, result: &WorkflowResult, exit_code: i32) -> Self {
        let summary = result.summary();
        Self {
            overall_status: Some(summary.overall_status.as_str().to_string()),
            ok_count: summary.counts.ok,
            warn_count: summary.counts.warn,
            fail_count: summary.counts.fail,
            exit_code,
            duration_ms: result.duration_ms().max(0) as u64,
            ..Self::new(command, &result.run_id)
        }
    }

    /// Discover log file path with fallback chain
    ///
    /// Priority:
    /// 1. $DIALDOC_LOG_FILE (explicit override)
    /// 2. $XDG_STATE_HOME/dialdoc/runs.jsonl
    /// 3. ~/.local/state/dialdoc/runs.jsonl
    pub fn discover_log_path() -> Option<PathBuf> {
        Self::discover_with(|key| std::env::var(key).ok())
    }

    fn discover_with(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        let set = |key: &str| env(key).filter(|v| !v.is_empty());
        if let Some(path) = set("DIALDOC_LOG_FILE") {
            return Some(PathBuf::from(path));
        }
        if let Some(state) = set("XDG_STATE_HOME") {
            return Some(Path::new(&state).join("dialdoc/runs.jsonl"));
        }
        set("HOME").map(|home| Path::new(&home).join(".local/state/dialdoc/runs.jsonl"))
    }

    /// Append to the discovered log file. Failures are logged at debug and
    /// otherwise ignored: stdout may carry JSON output.
    pub fn write(&self) {
        let Some(path) = Self::discover_log_path() else {
            debug!("No run log path available");
            return;
        };
        if let Err(e) = self.write_to(&path) {
            debug!("Cannot write run log {}: {}", path.display(), e);
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// Progress callback appending each line, timestamped, to `path`
pub fn transcript_callback(path: &Path) -> Result<LogCallback, std::io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(move |line: &str| -> Result<(), String> {
        writeln!(
            file,
            "{} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            line
        )
        .map_err(|e| e.to_string())
    }))
}
