//! Network adapter checks: pick the adapter carrying the WAN link and test
//! its link state.

use dialdoc_shared::{AdapterInfo, AdapterStatus, HealthLedger};

use super::{rank, StageContext};
use crate::pipeline::StageReport;

#[derive(Debug, Clone, Default)]
pub struct AdapterSelection {
    /// Adapter chosen for the test, absent when none qualifies
    pub adapter: Option<AdapterInfo>,
    /// Every adapter seen at selection time
    pub adapters: Vec<AdapterInfo>,
}

/// Pick the adapter to test: the requested one by name, else the best
/// Ethernet adapter (Up before Disconnected before anything else).
pub fn select_adapter<'a>(adapters: &'a [AdapterInfo], target: Option<&str>) -> Option<&'a AdapterInfo> {
    if let Some(target) = target.filter(|t| !t.trim().is_empty()) {
        return adapters
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(target.trim()));
    }

    let preference = |a: &AdapterInfo| match a.status {
        AdapterStatus::Up => 0,
        AdapterStatus::Disconnected => 1,
        AdapterStatus::Unknown => 2,
        AdapterStatus::Down => 3,
    };
    adapters
        .iter()
        .filter(|a| a.is_ethernet())
        .min_by_key(|a| preference(a))
}

pub fn check_adapters(mut ledger: HealthLedger, ctx: &StageContext<'_>) -> StageReport<AdapterSelection> {
    let adapters = match ctx.caps.adapters.list_adapters() {
        Ok(adapters) => adapters,
        Err(e) => {
            ledger.fail(rank::ADAPTER, "Network adapter", format!("could not list adapters: {}", e));
            return StageReport::done(ledger, AdapterSelection::default());
        }
    };

    let target = ctx.options.target_adapter.as_deref();
    let Some(selected) = select_adapter(&adapters, target).cloned() else {
        let available: Vec<&str> = adapters.iter().map(|a| a.name.as_str()).collect();
        let detail = match target {
            Some(t) => format!(
                "adapter '{}' not found (available: {})",
                t,
                if available.is_empty() { "none".to_string() } else { available.join(", ") }
            ),
            None => "no Ethernet adapter found".to_string(),
        };
        ledger.fail(rank::ADAPTER, "Network adapter", detail);
        return StageReport::done(
            ledger,
            AdapterSelection {
                adapter: None,
                adapters,
            },
        );
    };

    ctx.progress.line(format!("Selected adapter {}", selected.name));
    let mac = selected
        .mac_address
        .as_deref()
        .map(|m| format!(", {}", m))
        .unwrap_or_default();
    ledger.ok(
        rank::ADAPTER,
        "Network adapter",
        format!("{} ({}{})", selected.name, selected.media_type.as_str(), mac),
    );

    match selected.status {
        AdapterStatus::Up => ledger.ok(rank::LINK, "Link state", format!("{} link is up", selected.name)),
        AdapterStatus::Disconnected => ledger.fail(
            rank::LINK,
            "Link state",
            format!("{} has no carrier (cable unplugged or modem off)", selected.name),
        ),
        AdapterStatus::Down => ledger.fail(
            rank::LINK,
            "Link state",
            format!("{} is disabled", selected.name),
        ),
        AdapterStatus::Unknown => ledger.warn(
            rank::LINK,
            "Link state",
            format!("{} link state unknown", selected.name),
        ),
    }

    StageReport::done(
        ledger,
        AdapterSelection {
            adapter: Some(selected),
            adapters,
        },
    )
}
