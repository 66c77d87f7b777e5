//! Health ledger: ordered, append-only record of diagnostic outcomes.
//!
//! Every check stage appends `HealthRecord`s; nothing is ever rewritten.
//! Records are kept sorted by rank (ties keep insertion order) so the
//! report can be rendered straight from iteration order.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::HealthError;

// =============================================================================
// Status
// =============================================================================

/// Outcome of a single check. Ordering is severity: `Ok < Warn < Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Warn,
    Fail,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Warn => "WARN",
            HealthStatus::Fail => "FAIL",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "[OK]",
            HealthStatus::Warn => "[WARN]",
            HealthStatus::Fail => "[FAIL]",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Records
// =============================================================================

/// A single diagnostic outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub label: String,
    pub status: HealthStatus,
    pub detail: String,
    /// Display ordering key, not a control-flow input
    pub rank: i32,
}

impl HealthRecord {
    pub fn format_summary(&self) -> String {
        if self.detail.is_empty() {
            format!("{} {}", self.status.symbol(), self.label)
        } else {
            format!("{} {} - {}", self.status.symbol(), self.label, self.detail)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerEntry {
    key: String,
    #[serde(flatten)]
    record: HealthRecord,
}

/// Build the storage key for a record: `<zero-padded rank>_<label>`.
pub fn storage_key(rank: i32, label: &str) -> String {
    format!("{:04}_{}", rank, label.trim())
}

// =============================================================================
// Ledger
// =============================================================================

/// Insertion-ordered, rank-sorted collection of health records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthLedger {
    entries: Vec<LedgerEntry>,
}

impl HealthLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. An empty label is rejected and the ledger is left
    /// unchanged. A second record with the same rank and label is stored
    /// under a suffixed key (`<key>#2`, ...) instead of replacing the first.
    pub fn add(
        &mut self,
        label: &str,
        status: HealthStatus,
        detail: &str,
        rank: i32,
    ) -> Result<&HealthRecord, HealthError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(HealthError::InvalidRecord(
                "label must not be empty".to_string(),
            ));
        }

        let base_key = storage_key(rank, label);
        let mut key = base_key.clone();
        let mut n = 1;
        while self.get(&key).is_some() {
            n += 1;
            key = format!("{}#{}", base_key, n);
        }

        // After every entry with rank <= ours: ties keep insertion order
        let pos = self.entries.partition_point(|e| e.record.rank <= rank);
        self.entries.insert(
            pos,
            LedgerEntry {
                key,
                record: HealthRecord {
                    label: label.to_string(),
                    status,
                    detail: detail.to_string(),
                    rank,
                },
            },
        );
        Ok(&self.entries[pos].record)
    }

    /// `add` with the default rank of 0
    pub fn add_default(
        &mut self,
        label: &str,
        status: HealthStatus,
        detail: &str,
    ) -> Result<&HealthRecord, HealthError> {
        self.add(label, status, detail, 0)
    }

    /// Append a record, logging and dropping it if invalid. Stages use this
    /// so a bad label never interrupts a run.
    pub fn note(&mut self, rank: i32, label: &str, status: HealthStatus, detail: impl AsRef<str>) {
        if let Err(e) = self.add(label, status, detail.as_ref(), rank) {
            warn!("Dropping health record at rank {}: {}", rank, e);
        }
    }

    pub fn ok(&mut self, rank: i32, label: &str, detail: impl AsRef<str>) {
        self.note(rank, label, HealthStatus::Ok, detail);
    }

    pub fn warn(&mut self, rank: i32, label: &str, detail: impl AsRef<str>) {
        self.note(rank, label, HealthStatus::Warn, detail);
    }

    pub fn fail(&mut self, rank: i32, label: &str, detail: impl AsRef<str>) {
        self.note(rank, label, HealthStatus::Fail, detail);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&HealthRecord> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.record)
    }

    /// Storage keys in display order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Records in display order (rank, then insertion)
    pub fn records(&self) -> impl Iterator<Item = &HealthRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn find_label(&self, label: &str) -> Option<&HealthRecord> {
        self.records().find(|r| r.label == label)
    }

    /// Most severe status present; an empty ledger is `Ok`
    pub fn overall_status(&self) -> HealthStatus {
        self.records()
            .map(|r| r.status)
            .max()
            .unwrap_or(HealthStatus::Ok)
    }

    /// True when every record of `prior` is present here, unchanged, under
    /// the same key. This is the append-only contract for a stage.
    pub fn extends(&self, prior: &HealthLedger) -> bool {
        self.len() >= prior.len()
            && prior
                .entries
                .iter()
                .all(|p| self.get(&p.key) == Some(&p.record))
    }

    pub fn summarize(&self) -> HealthSummary {
        let mut counts = StatusCounts::default();
        for record in self.records() {
            match record.status {
                HealthStatus::Ok => counts.ok += 1,
                HealthStatus::Warn => counts.warn += 1,
                HealthStatus::Fail => counts.fail += 1,
            }
        }

        HealthSummary {
            overall_status: self.overall_status(),
            counts,
            records: self.records().cloned().collect(),
        }
    }
}

/// Count of records per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub warn: usize,
    pub fail: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.ok + self.warn + self.fail
    }
}

/// Severity rollup plus display-ordered records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub overall_status: HealthStatus,
    pub counts: StatusCounts,
    pub records: Vec<HealthRecord>,
}
