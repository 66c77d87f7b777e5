//! Connectivity checks: DNS resolution, ping, quick reachability.

use dialdoc_shared::{CapabilityError, HealthLedger, PingOutcome};

use super::{rank, ratio, PppDiscovery, StageContext};
use crate::pipeline::StageReport;

#[derive(Debug, Clone, Default)]
pub struct ConnectivityOutput {
    pub dns_resolved: Vec<String>,
    pub dns_failed: Vec<String>,
    /// Ping to the primary target
    pub ping: Option<PingOutcome>,
    /// Targets that answered at least one echo
    pub reachable: Vec<String>,
}

pub(crate) fn describe_ping(outcome: &PingOutcome) -> String {
    let avg = outcome
        .average_ms()
        .map(|ms| format!(", avg {:.1} ms", ms))
        .unwrap_or_default();
    format!(
        "{}: {}/{} replies{}",
        outcome.target, outcome.received, outcome.sent, avg
    )
}

pub(crate) fn describe_error(target: &str, err: &CapabilityError) -> String {
    if err.is_timeout() {
        format!("{}: timed out", target)
    } else {
        format!("{}: {}", target, err)
    }
}

pub fn check_connectivity(
    mut ledger: HealthLedger,
    ctx: &StageContext<'_>,
    ppp: &PppDiscovery,
) -> StageReport<ConnectivityOutput> {
    let probes = &ctx.options.probes;
    let timeout = probes.timeout();
    let mut out = ConnectivityOutput::default();

    // DNS
    for name in &probes.dns_names {
        match ctx.caps.probe.resolve_dns(name, timeout) {
            Ok(true) => out.dns_resolved.push(name.clone()),
            Ok(false) => out.dns_failed.push(name.clone()),
            Err(e) => {
                tracing::debug!("{}", describe_error(name, &e));
                out.dns_failed.push(name.clone());
            }
        }
    }
    let total = probes.dns_names.len();
    if total == 0 {
        ledger.warn(rank::DNS, "DNS resolution", "no names configured");
    } else if out.dns_failed.is_empty() {
        ledger.ok(
            rank::DNS,
            "DNS resolution",
            format!("{} names resolved", ratio(total, total)),
        );
    } else if out.dns_resolved.is_empty() {
        ledger.fail(
            rank::DNS,
            "DNS resolution",
            format!("no names resolved ({})", out.dns_failed.join(", ")),
        );
    } else {
        ledger.warn(
            rank::DNS,
            "DNS resolution",
            format!(
                "{} names resolved, failed: {}",
                ratio(out.dns_resolved.len(), total),
                out.dns_failed.join(", ")
            ),
        );
    }
    ctx.progress.line(format!(
        "DNS: {} names resolved",
        ratio(out.dns_resolved.len(), total)
    ));

    // Ping to the primary target
    let Some((primary, others)) = probes.ping_targets.split_first() else {
        ledger.warn(rank::PING, "Ping", "no ping targets configured");
        ledger.warn(rank::REACHABILITY, "Internet reachability", "no targets configured");
        return StageReport::done(ledger, out);
    };

    match ctx.caps.probe.ping(primary, probes.ping_count, timeout) {
        Ok(outcome) => {
            let detail = describe_ping(&outcome);
            if !outcome.success() {
                ledger.fail(rank::PING, "Ping", detail);
            } else if outcome.received < outcome.sent {
                ledger.warn(rank::PING, "Ping", detail);
            } else {
                ledger.ok(rank::PING, "Ping", detail);
            }
            ctx.progress.line(format!("Ping {}", describe_ping(&outcome)));
            if outcome.success() {
                out.reachable.push(primary.clone());
            }
            out.ping = Some(outcome);
        }
        Err(e) => ledger.fail(rank::PING, "Ping", describe_error(primary, &e)),
    }

    // One echo to each remaining target
    for target in others {
        match ctx.caps.probe.ping(target, 1, timeout) {
            Ok(outcome) if outcome.success() => out.reachable.push(target.clone()),
            Ok(_) => {}
            Err(e) => tracing::debug!("{}", describe_error(target, &e)),
        }
    }

    let targets = probes.ping_targets.len();
    let via = match (&ppp.interface, &ppp.default_route) {
        (Some(iface), Some(route)) if route.interface == iface.name => format!(" via {}", iface.name),
        _ => String::new(),
    };
    if out.reachable.is_empty() {
        ledger.fail(
            rank::REACHABILITY,
            "Internet reachability",
            format!("none of {} targets reachable", targets),
        );
    } else {
        ledger.ok(
            rank::REACHABILITY,
            "Internet reachability",
            format!(
                "{} targets reachable{} ({})",
                ratio(out.reachable.len(), targets),
                via,
                out.reachable.join(", ")
            ),
        );
    }

    StageReport::done(ledger, out)
}
