//! Advanced connectivity (full workflow): packet loss, jitter,
//! multi-destination reachability and traceroute.
//!
//! Multi-destination probes run on a rayon pool of
//! `max_parallel_probes` threads. Their results reach the ledger only
//! after every probe of the stage has finished.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::warn;

use dialdoc_shared::{HealthLedger, NetProbe, PingOutcome, TraceHop};

use super::connectivity::{describe_error, describe_ping, ConnectivityOutput};
use super::{rank, ratio, StageContext};
use crate::pipeline::StageReport;
use crate::progress::panic_message;

// =============================================================================
// Path quality
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationResult {
    pub target: String,
    pub reachable: bool,
    pub average_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PathQuality {
    /// Long ping used for loss and jitter
    pub loss_sample: Option<PingOutcome>,
    pub destinations: Vec<DestinationResult>,
}

fn probe_destination(probe: &dyn NetProbe, target: &str, count: u32, timeout: Duration) -> DestinationResult {
    match probe.ping(target, count, timeout) {
        Ok(outcome) => DestinationResult {
            target: target.to_string(),
            reachable: outcome.success(),
            average_ms: outcome.average_ms(),
            error: None,
        },
        Err(e) => DestinationResult {
            target: target.to_string(),
            reachable: false,
            average_ms: None,
            error: Some(describe_error(target, &e)),
        },
    }
}

/// A probe that panics becomes an unreachable result instead of taking
/// the pool down
fn guarded_destination(
    probe: &dyn NetProbe,
    target: &str,
    count: u32,
    timeout: Duration,
) -> DestinationResult {
    panic::catch_unwind(AssertUnwindSafe(|| probe_destination(probe, target, count, timeout)))
        .unwrap_or_else(|payload| DestinationResult {
            target: target.to_string(),
            reachable: false,
            average_ms: None,
            error: Some(format!(
                "{}: probe crashed: {}",
                target,
                panic_message(payload.as_ref())
            )),
        })
}

/// Ping every target on a pool of `parallel` threads. Order of the result
/// follows `targets`.
pub fn probe_destinations(
    probe: &dyn NetProbe,
    targets: &[String],
    count: u32,
    timeout: Duration,
    parallel: usize,
) -> Vec<DestinationResult> {
    let pool = match ThreadPoolBuilder::new()
        .num_threads(parallel.max(1))
        .thread_name(|i| format!("dialdoc-probe-{}", i))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            warn!("Cannot start probe pool, probing sequentially: {}", e);
            return targets
                .iter()
                .map(|t| guarded_destination(probe, t, count, timeout))
                .collect();
        }
    };

    pool.install(|| {
        targets
            .par_iter()
            .map(|t| guarded_destination(probe, t, count, timeout))
            .collect()
    })
}

pub fn check_path_quality(
    mut ledger: HealthLedger,
    ctx: &StageContext<'_>,
    connectivity: &ConnectivityOutput,
) -> StageReport<PathQuality> {
    let probes = &ctx.options.probes;
    let timeout = probes.timeout();
    let mut out = PathQuality::default();

    if connectivity.reachable.is_empty() {
        ledger.fail(rank::PACKET_LOSS, "Packet loss", "skipped, no target reachable");
        ledger.fail(
            rank::MULTI_DESTINATION,
            "Multi-destination",
            "skipped, no target reachable",
        );
        return StageReport::done(ledger, out);
    }

    // Loss and jitter against the first target that answered
    let primary = &connectivity.reachable[0];
    ctx.progress.line(format!(
        "Measuring packet loss to {} ({} samples)...",
        primary, probes.loss_samples
    ));
    match ctx.caps.probe.ping(primary, probes.loss_samples.max(1), timeout) {
        Ok(sample) => {
            let loss = sample.loss_percent();
            let detail = format!("{:.1}% loss, {}", loss, describe_ping(&sample));
            if loss >= probes.loss_fail_percent {
                ledger.fail(rank::PACKET_LOSS, "Packet loss", detail);
            } else if loss >= probes.loss_warn_percent {
                ledger.warn(rank::PACKET_LOSS, "Packet loss", detail);
            } else {
                ledger.ok(rank::PACKET_LOSS, "Packet loss", detail);
            }

            match sample.jitter_ms() {
                Some(jitter) if jitter > probes.jitter_warn_ms => ledger.warn(
                    rank::PACKET_LOSS,
                    "Jitter",
                    format!("{:.1} ms (threshold {:.0} ms)", jitter, probes.jitter_warn_ms),
                ),
                Some(jitter) => ledger.ok(rank::PACKET_LOSS, "Jitter", format!("{:.1} ms", jitter)),
                None => ledger.warn(rank::PACKET_LOSS, "Jitter", "not enough replies to measure"),
            }
            out.loss_sample = Some(sample);
        }
        Err(e) => ledger.fail(rank::PACKET_LOSS, "Packet loss", describe_error(primary, &e)),
    }

    // Multi-destination
    out.destinations = probe_destinations(
        ctx.caps.probe,
        &probes.ping_targets,
        probes.ping_count,
        timeout,
        probes.max_parallel_probes,
    );
    let total = out.destinations.len();
    let (up, down): (Vec<&DestinationResult>, Vec<&DestinationResult>) =
        out.destinations.iter().partition(|d| d.reachable);
    let names = |list: &[&DestinationResult]| {
        list.iter().map(|d| d.target.as_str()).collect::<Vec<_>>().join(", ")
    };
    if down.is_empty() {
        ledger.ok(
            rank::MULTI_DESTINATION,
            "Multi-destination",
            format!("{} destinations reachable", ratio(total, total)),
        );
    } else if up.is_empty() {
        ledger.fail(
            rank::MULTI_DESTINATION,
            "Multi-destination",
            format!("no destination reachable ({})", names(&down)),
        );
    } else {
        ledger.warn(
            rank::MULTI_DESTINATION,
            "Multi-destination",
            format!(
                "{} destinations reachable, unreachable: {}",
                ratio(up.len(), total),
                names(&down)
            ),
        );
    }

    StageReport::done(ledger, out)
}

// =============================================================================
// Traceroute
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct TraceSummary {
    pub target: String,
    pub hops: Vec<TraceHop>,
    pub reached: bool,
}

impl TraceSummary {
    pub fn silent_hops(&self) -> usize {
        self.hops.iter().filter(|h| h.address.is_none()).count()
    }

    pub fn last_responder(&self) -> Option<&TraceHop> {
        self.hops.iter().rev().find(|h| h.address.is_some())
    }
}

pub fn check_traceroute(mut ledger: HealthLedger, ctx: &StageContext<'_>) -> StageReport<TraceSummary> {
    let probes = &ctx.options.probes;
    let target = probes.traceroute_target.clone();
    ctx.progress.line(format!("Tracing route to {}...", target));

    let hops = match ctx
        .caps
        .probe
        .traceroute(&target, probes.traceroute_max_hops, probes.timeout())
    {
        Ok(hops) => hops,
        Err(e) => {
            ledger.warn(rank::TRACEROUTE, "Traceroute", describe_error(&target, &e));
            return StageReport::done(
                ledger,
                TraceSummary {
                    target,
                    ..TraceSummary::default()
                },
            );
        }
    };

    let target_ip: Option<IpAddr> = target.parse().ok();
    let reached = match target_ip {
        Some(ip) => hops.iter().any(|h| h.address == Some(ip)),
        None => hops.last().is_some_and(|h| h.address.is_some()),
    };
    let summary = TraceSummary {
        target,
        hops,
        reached,
    };

    if summary.hops.is_empty() {
        ledger.fail(
            rank::TRACEROUTE,
            "Traceroute",
            format!("{}: no hops answered", summary.target),
        );
    } else if summary.reached {
        ledger.ok(
            rank::TRACEROUTE,
            "Traceroute",
            format!(
                "reached {} in {} hops ({} silent)",
                summary.target,
                summary.hops.len(),
                summary.silent_hops()
            ),
        );
    } else {
        let last = summary
            .last_responder()
            .and_then(|h| h.address.map(|a| format!(", last reply from {} at hop {}", a, h.hop)))
            .unwrap_or_default();
        ledger.warn(
            rank::TRACEROUTE,
            "Traceroute",
            format!(
                "did not reach {} within {} hops{}",
                summary.target,
                summary.hops.len(),
                last
            ),
        );
    }

    StageReport::done(ledger, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialdoc_shared::CapabilityError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl NetProbe for CountingProbe {
        fn ping(&self, target: &str, count: u32, _timeout: Duration) -> Result<PingOutcome, CapabilityError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if target == "boom" {
                panic!("probe blew up");
            }
            if target == "slow" {
                return Err(CapabilityError::Timeout(1000));
            }
            Ok(PingOutcome {
                target: target.to_string(),
                sent: count,
                received: count,
                latencies_ms: vec![5.0; count as usize],
            })
        }

        fn resolve_dns(&self, _name: &str, _timeout: Duration) -> Result<bool, CapabilityError> {
            Ok(true)
        }

        fn traceroute(&self, _target: &str, _max_hops: u32, _timeout: Duration) -> Result<Vec<TraceHop>, CapabilityError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_probe_destinations_bounded_and_ordered() {
        let probe = CountingProbe {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let targets: Vec<String> = ["a", "slow", "boom", "b", "c"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let results = probe_destinations(&probe, &targets, 2, Duration::from_secs(1), 2);

        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
        let order: Vec<&str> = results.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(order, vec!["a", "slow", "boom", "b", "c"]);
        assert!(results[0].reachable);
        assert!(results[1].error.as_deref().unwrap().contains("timed out"));
        assert!(results[2].error.as_deref().unwrap().contains("probe blew up"));
        assert!(results[3].reachable, "a crash does not stop later targets");
    }

    #[test]
    fn test_probe_destinations_single_thread() {
        let probe = CountingProbe {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let targets: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let results = probe_destinations(&probe, &targets, 1, Duration::from_secs(1), 0);

        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.reachable));
    }

    #[test]
    fn test_trace_summary_helpers() {
        let summary = TraceSummary {
            target: "1.1.1.1".to_string(),
            hops: vec![
                TraceHop { hop: 1, address: Some("192.0.2.1".parse().unwrap()), rtt_ms: Some(1.0) },
                TraceHop { hop: 2, address: None, rtt_ms: None },
            ],
            reached: false,
        };
        assert_eq!(summary.silent_hops(), 1);
        assert_eq!(summary.last_responder().unwrap().hop, 1);
    }
}
