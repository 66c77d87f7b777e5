//! Adapter toggle guard.
//!
//! Disables interfering adapters for the duration of a run and guarantees
//! they are enabled again: explicitly via `restore()`, on drop if the run
//! unwinds or returns early, and on a later run via `sweep_orphans()` if
//! the process died in between.
//!
//! Every adapter the guard disables is written to a per-run record file
//! before `disable_all` returns. The record is removed only once restore
//! succeeded for every name in it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use dialdoc_shared::{AdapterInfo, AdapterProvider, AdapterStatus, DialdocError};

// =============================================================================
// Persisted record
// =============================================================================

/// Adapters one run disabled and therefore owes restoration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterToggleRecord {
    pub run_id: String,
    pub created: DateTime<Utc>,
    pub adapter_names: BTreeSet<String>,
}

impl AdapterToggleRecord {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            created: Utc::now(),
            adapter_names: BTreeSet::new(),
        }
    }
}

/// Directory of toggle records, one JSON file per run
#[derive(Debug, Clone)]
pub struct ToggleRecordStore {
    dir: PathBuf,
}

impl ToggleRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    /// Write the record atomically (temp file + rename)
    pub fn save(&self, record: &AdapterToggleRecord) -> Result<(), DialdocError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&record.run_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn clear(&self, run_id: &str) -> Result<(), DialdocError> {
        let path = self.path_for(run_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All readable records. Unreadable or malformed files are logged and
    /// left in place for inspection.
    pub fn load_all(&self) -> Vec<AdapterToggleRecord> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot read toggle record dir {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(DialdocError::from)
                .and_then(|c| serde_json::from_str::<AdapterToggleRecord>(&c).map_err(Into::into))
            {
                Ok(record) => records.push(record),
                Err(e) => error!("Unusable toggle record {}: {}", path.display(), e),
            }
        }
        records.sort_by(|a, b| a.created.cmp(&b.created));
        records
    }
}

// =============================================================================
// Restore
// =============================================================================

/// Per-name outcome of a restore pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub restored: Vec<String>,
    /// Adapters that no longer exist: nothing to restore
    pub missing: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RestoreOutcome {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.failed.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Re-enable every named adapter. Absent or empty input is a no-op.
pub fn restore_adapters(provider: &dyn AdapterProvider, names: Option<&[String]>) -> RestoreOutcome {
    let mut outcome = RestoreOutcome::default();
    let Some(names) = names else {
        return outcome;
    };

    for name in names {
        match provider.set_adapter_enabled(name, true) {
            Ok(()) => {
                info!("Re-enabled adapter {}", name);
                outcome.restored.push(name.clone());
            }
            Err(e) if e.is_not_found() => {
                debug!("Adapter {} is gone, nothing to restore", name);
                outcome.missing.push(name.clone());
            }
            Err(e) => {
                error!("Failed to re-enable adapter {}: {}", name, e);
                outcome.failed.push((name.clone(), e.to_string()));
            }
        }
    }
    outcome
}

/// Re-enable every named adapter; true when none failed
pub fn restore_all(provider: &dyn AdapterProvider, names: Option<&[String]>) -> bool {
    restore_adapters(provider, names).success()
}

/// Names from `names` that are still administratively down
pub fn still_disabled(provider: &dyn AdapterProvider, names: &[String]) -> Vec<String> {
    match provider.list_adapters() {
        Ok(adapters) => names
            .iter()
            .filter(|n| {
                adapters
                    .iter()
                    .any(|a| &a.name == *n && a.status == AdapterStatus::Down)
            })
            .cloned()
            .collect(),
        Err(e) => {
            warn!("Cannot verify adapter restore: {}", e);
            Vec::new()
        }
    }
}

/// Restore adapters recorded by earlier runs that never cleaned up.
/// Returns the number of adapters re-enabled.
pub fn sweep_orphans(provider: &dyn AdapterProvider, store: &ToggleRecordStore) -> usize {
    let mut count = 0;

    for mut record in store.load_all() {
        let names: Vec<String> = record.adapter_names.iter().cloned().collect();
        warn!(
            "Found toggle record from run {} ({}), restoring {} adapter(s)",
            record.run_id,
            record.created.to_rfc3339(),
            names.len()
        );

        let outcome = restore_adapters(provider, Some(&names));
        count += outcome.restored.len();

        if outcome.success() {
            if let Err(e) = store.clear(&record.run_id) {
                error!("Cannot clear toggle record {}: {}", record.run_id, e);
            }
        } else {
            record.adapter_names = outcome.failed_names().into_iter().collect();
            if let Err(e) = store.save(&record) {
                error!("Cannot update toggle record {}: {}", record.run_id, e);
            }
        }
    }

    count
}

// =============================================================================
// Guard
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleState {
    Idle,
    Disabling,
    Disabled,
    Restoring,
}

/// Scoped adapter disable with guaranteed restore
pub struct AdapterToggleGuard<'a> {
    provider: &'a dyn AdapterProvider,
    store: ToggleRecordStore,
    record: AdapterToggleRecord,
    disabled: Vec<String>,
    state: ToggleState,
}

impl<'a> AdapterToggleGuard<'a> {
    pub fn new(provider: &'a dyn AdapterProvider, store: ToggleRecordStore, run_id: &str) -> Self {
        Self {
            provider,
            store,
            record: AdapterToggleRecord::new(run_id),
            disabled: Vec::new(),
            state: ToggleState::Idle,
        }
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    /// True while adapters disabled by this guard are not yet re-enabled,
    /// including after a `disable_all` that was cut short by a panic
    fn owes_restore(&self) -> bool {
        matches!(self.state, ToggleState::Disabling | ToggleState::Disabled)
            && !self.record.adapter_names.is_empty()
    }

    /// Names disabled by this guard, in the order they were disabled
    pub fn disabled(&self) -> &[String] {
        &self.disabled
    }

    /// Disable every active adapter in `candidates`. Inactive ones are left
    /// alone. Individual failures are logged and skipped. Returns the names
    /// disabled by this call.
    pub fn disable_all(&mut self, candidates: &[AdapterInfo]) -> Vec<String> {
        self.state = ToggleState::Disabling;
        let mut newly = Vec::new();

        for adapter in candidates {
            if !adapter.status.is_active() {
                debug!("Adapter {} is {}, leaving it", adapter.name, adapter.status.as_str());
                continue;
            }
            if self.disabled.contains(&adapter.name) {
                continue;
            }

            match self.provider.set_adapter_enabled(&adapter.name, false) {
                Ok(()) => {
                    info!("Disabled adapter {}", adapter.name);
                    self.disabled.push(adapter.name.clone());
                    self.record.adapter_names.insert(adapter.name.clone());
                    if let Err(e) = self.store.save(&self.record) {
                        error!(
                            "Cannot persist toggle record for {}: {} (restore still runs at end of run)",
                            adapter.name, e
                        );
                    }
                    newly.push(adapter.name.clone());
                }
                Err(e) => warn!("Could not disable adapter {}: {}", adapter.name, e),
            }
        }

        self.state = if self.disabled.is_empty() {
            ToggleState::Idle
        } else {
            ToggleState::Disabled
        };
        newly
    }

    /// Re-enable everything this guard disabled. Safe to call repeatedly;
    /// after the first successful call it is a no-op.
    pub fn restore(&mut self) -> RestoreOutcome {
        if !self.owes_restore() {
            return RestoreOutcome::default();
        }
        self.state = ToggleState::Restoring;

        let pending: Vec<String> = self.record.adapter_names.iter().cloned().collect();
        let outcome = restore_adapters(self.provider, Some(&pending));

        if outcome.success() {
            if let Err(e) = self.store.clear(&self.record.run_id) {
                error!("Cannot clear toggle record {}: {}", self.record.run_id, e);
            }
            self.record.adapter_names.clear();
        } else {
            // Keep only what is still owed; the next run's sweep retries it
            self.record.adapter_names = outcome.failed_names().into_iter().collect();
            error!(
                "Adapter restore incomplete, left for next run: {}",
                outcome.failed_names().join(", ")
            );
            if let Err(e) = self.store.save(&self.record) {
                error!("Cannot update toggle record {}: {}", self.record.run_id, e);
            }
        }

        self.state = ToggleState::Idle;
        outcome
    }
}

impl Drop for AdapterToggleGuard<'_> {
    fn drop(&mut self) {
        if self.owes_restore() {
            warn!("Toggle guard dropped with adapters disabled, restoring now");
            self.restore();
        }
    }
}
