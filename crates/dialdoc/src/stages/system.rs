//! Basic system checks: platform and version facts, privileges.

use dialdoc_shared::{HealthLedger, HostFacts};

use super::{rank, StageContext};
use crate::pipeline::StageReport;

#[derive(Debug, Clone, Default)]
pub struct SystemOutput {
    pub facts: Option<HostFacts>,
}

pub fn check_system(mut ledger: HealthLedger, ctx: &StageContext<'_>) -> StageReport<SystemOutput> {
    let facts = match ctx.caps.facts.collect() {
        Ok(facts) => facts,
        Err(e) => {
            ledger.warn(rank::SYSTEM, "System", format!("could not read system facts: {}", e));
            return StageReport::done(ledger, SystemOutput::default());
        }
    };

    let os = match (&facts.os_name, &facts.os_version) {
        (Some(name), Some(version)) => format!("{} {}", name, version),
        (Some(name), None) => name.clone(),
        _ => "unknown OS".to_string(),
    };
    let kernel = facts
        .kernel_version
        .as_deref()
        .map(|k| format!(", kernel {}", k))
        .unwrap_or_default();
    let host = facts
        .hostname
        .as_deref()
        .map(|h| format!(" on {}", h))
        .unwrap_or_default();
    ctx.progress.line(format!("System: {}{}{}", os, kernel, host));
    ledger.ok(rank::SYSTEM, "System", format!("{}{}{}", os, kernel, host));

    if facts.privileged {
        ledger.ok(rank::SYSTEM, "Privileges", "running as root");
    } else {
        ledger.warn(
            rank::SYSTEM,
            "Privileges",
            "not running as root; adapter toggling, dialing and route changes may fail",
        );
    }

    StageReport::done(ledger, SystemOutput { facts: Some(facts) })
}
