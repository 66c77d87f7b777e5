//! Path helpers for dialdoc state.
//!
//! Root runs keep state under /var/lib/dialdoc so every invocation sees
//! the same toggle records; user runs fall back to the XDG state dir.

use std::path::PathBuf;

use dialdoc_shared::{STATE_DIR, TOGGLE_RECORD_DIR};

fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Base state directory
///
/// Priority:
/// 1. $DIALDOC_STATE_DIR (explicit override)
/// 2. /var/lib/dialdoc when running as root
/// 3. $XDG_STATE_HOME/dialdoc (or ~/.local/state/dialdoc)
/// 4. /tmp/dialdoc-$UID
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DIALDOC_STATE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if is_root() {
        return PathBuf::from(STATE_DIR);
    }

    if let Some(state) = dirs::state_dir() {
        return state.join("dialdoc");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".local/state/dialdoc");
    }

    PathBuf::from(format!("/tmp/dialdoc-{}", nix::unistd::geteuid()))
}

/// Directory holding adapter toggle records
pub fn toggle_record_dir() -> PathBuf {
    state_dir().join(TOGGLE_RECORD_DIR)
}
