//! Check pipeline: runs stages in order and keeps the ledger well-formed.
//!
//! A stage receives the ledger by value and hands back a `StageReport`.
//! Before anything downstream reads a report, the pipeline checks it:
//!
//! - a stage that panics keeps the prior ledger and gets a FAIL record
//! - a returned ledger that does not extend its input (records dropped or
//!   rewritten) is discarded in favour of the prior ledger, plus FAIL
//! - a missing output is recorded as FAIL and passed on as absent
//!
//! Downstream stages call `expect_input` on their predecessor's output; an
//! absent predecessor yields a FAIL record and a neutral default, and the
//! run carries on.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, warn};

use dialdoc_shared::{DialdocError, HealthLedger};

use crate::progress::{panic_message, ProgressSink};

/// What a stage hands back: the updated ledger plus its output
#[derive(Debug, Clone)]
pub struct StageReport<T> {
    pub ledger: HealthLedger,
    pub output: Option<T>,
}

impl<T> StageReport<T> {
    pub fn done(ledger: HealthLedger, output: T) -> Self {
        Self {
            ledger,
            output: Some(output),
        }
    }

    /// Report with no usable output
    pub fn empty(ledger: HealthLedger) -> Self {
        Self {
            ledger,
            output: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFaultKind {
    Crashed,
    LedgerRewritten,
    NoOutput,
    MissingInput,
}

/// A stage-shape violation the pipeline absorbed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFault {
    pub stage: String,
    pub kind: StageFaultKind,
    pub detail: String,
}

pub struct Pipeline<'p> {
    ledger: HealthLedger,
    progress: &'p ProgressSink,
    faults: Vec<StageFault>,
}

impl<'p> Pipeline<'p> {
    pub fn new(progress: &'p ProgressSink) -> Self {
        Self::with_ledger(HealthLedger::new(), progress)
    }

    pub fn with_ledger(ledger: HealthLedger, progress: &'p ProgressSink) -> Self {
        Self {
            ledger,
            progress,
            faults: Vec::new(),
        }
    }

    pub fn ledger(&self) -> &HealthLedger {
        &self.ledger
    }

    /// Direct access for driver-level records (toggle, restore)
    pub fn ledger_mut(&mut self) -> &mut HealthLedger {
        &mut self.ledger
    }

    pub fn progress(&self) -> &ProgressSink {
        self.progress
    }

    pub fn faults(&self) -> &[StageFault] {
        &self.faults
    }

    pub fn into_parts(self) -> (HealthLedger, Vec<StageFault>) {
        (self.ledger, self.faults)
    }

    /// Run one stage and commit its report if well-formed. Only a caller
    /// contract violation (failing log callback) is returned as an error.
    pub fn run_stage<T>(
        &mut self,
        name: &str,
        rank: i32,
        stage: impl FnOnce(HealthLedger) -> StageReport<T>,
    ) -> Result<Option<T>, DialdocError> {
        self.progress.line(format!("Checking {}...", name));

        let prior = self.ledger.clone();
        let input = prior.clone();
        let output = match panic::catch_unwind(AssertUnwindSafe(move || stage(input))) {
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.fault(
                    name,
                    rank,
                    StageFaultKind::Crashed,
                    format!("{} check crashed: {}", name, message),
                );
                None
            }
            Ok(report) => {
                if report.ledger.extends(&prior) {
                    self.ledger = report.ledger;
                } else {
                    self.fault(
                        name,
                        rank,
                        StageFaultKind::LedgerRewritten,
                        format!("{} check discarded or changed earlier results", name),
                    );
                }
                if report.output.is_none() {
                    self.fault(
                        name,
                        rank,
                        StageFaultKind::NoOutput,
                        format!("{} check produced no result", name),
                    );
                }
                report.output
            }
        };

        self.check_caller()?;
        Ok(output)
    }

    /// Unwrap a predecessor's output, substituting the neutral default and
    /// recording a FAIL when it is absent.
    pub fn expect_input<T: Default>(
        &mut self,
        stage: &str,
        rank: i32,
        predecessor: &str,
        input: Option<T>,
    ) -> T {
        match input {
            Some(value) => value,
            None => {
                self.fault(
                    stage,
                    rank,
                    StageFaultKind::MissingInput,
                    format!("no result from {} check, continuing without it", predecessor),
                );
                T::default()
            }
        }
    }

    pub fn check_caller(&self) -> Result<(), DialdocError> {
        match self.progress.violation() {
            Some(reason) => Err(DialdocError::CallerContractViolation(reason)),
            None => Ok(()),
        }
    }

    fn fault(&mut self, stage: &str, rank: i32, kind: StageFaultKind, detail: String) {
        if kind == StageFaultKind::Crashed {
            error!("{}", detail);
        } else {
            warn!("{}", detail);
        }
        self.ledger.fail(rank, stage, &detail);
        self.faults.push(StageFault {
            stage: stage.to_string(),
            kind,
            detail,
        });
    }
}
