//! Progress reporting to the caller's `write_log` callback.
//!
//! The callback is optional. When present, every line also goes to
//! `tracing` at info level. A callback that returns an error or panics is a
//! caller contract violation: the sink remembers the first one, stops
//! calling the callback, and the pipeline turns it into
//! `DialdocError::CallerContractViolation` after the current stage.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use tracing::info;

use dialdoc_shared::redact::{contains_sensitive, redact};

/// Caller-supplied progress callback
pub type LogCallback = Box<dyn FnMut(&str) -> Result<(), String>>;

pub struct ProgressSink {
    callback: RefCell<Option<LogCallback>>,
    violation: RefCell<Option<String>>,
}

impl ProgressSink {
    pub fn new(callback: Option<LogCallback>) -> Self {
        Self {
            callback: RefCell::new(callback),
            violation: RefCell::new(None),
        }
    }

    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn line(&self, message: impl AsRef<str>) {
        let raw = message.as_ref();
        let scrubbed;
        let message = if contains_sensitive(raw) {
            scrubbed = redact(raw);
            scrubbed.as_str()
        } else {
            raw
        };
        info!("{}", message);

        if self.violation.borrow().is_some() {
            return;
        }
        let mut slot = self.callback.borrow_mut();
        let Some(callback) = slot.as_mut() else {
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(message)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("log callback returned an error: {}", e)),
            Err(payload) => Some(format!(
                "log callback panicked: {}",
                panic_message(payload.as_ref())
            )),
        };

        if let Some(reason) = failure {
            *slot = None;
            *self.violation.borrow_mut() = Some(reason);
        }
    }

    /// First contract violation seen, if any
    pub fn violation(&self) -> Option<String> {
        self.violation.borrow().clone()
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::silent()
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
