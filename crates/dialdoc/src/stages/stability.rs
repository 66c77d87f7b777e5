//! Stability test (full workflow, opt-in): repeated single pings over a
//! short window.

use std::thread;
use std::time::Duration;

use dialdoc_shared::HealthLedger;

use super::connectivity::ConnectivityOutput;
use super::{rank, ratio, StageContext};
use crate::pipeline::StageReport;

#[derive(Debug, Clone, Default)]
pub struct StabilityOutput {
    pub target: Option<String>,
    /// One entry per sample: the round trip, or None when lost
    pub samples: Vec<Option<f64>>,
}

impl StabilityOutput {
    pub fn answered(&self) -> usize {
        self.samples.iter().filter(|s| s.is_some()).count()
    }

    pub fn loss_percent(&self) -> f64 {
        if self.samples.is_empty() {
            return 100.0;
        }
        let lost = self.samples.len() - self.answered();
        lost as f64 * 100.0 / self.samples.len() as f64
    }

    /// Longest run of consecutive lost samples
    pub fn longest_outage(&self) -> usize {
        self.samples
            .iter()
            .fold((0, 0), |(best, current), s| match s {
                Some(_) => (best, 0),
                None => (best.max(current + 1), current + 1),
            })
            .0
    }
}

pub fn check_stability(
    mut ledger: HealthLedger,
    ctx: &StageContext<'_>,
    connectivity: &ConnectivityOutput,
) -> StageReport<StabilityOutput> {
    let config = &ctx.options.stability;
    let probes = &ctx.options.probes;

    let Some(target) = connectivity
        .reachable
        .first()
        .or_else(|| probes.ping_targets.first())
        .cloned()
    else {
        ledger.warn(rank::STABILITY, "Stability", "no target configured");
        return StageReport::done(ledger, StabilityOutput::default());
    };

    let count = config.samples.max(1);
    ctx.progress.line(format!(
        "Stability test: {} samples to {} every {} ms...",
        count, target, config.interval_ms
    ));

    let mut out = StabilityOutput {
        target: Some(target.clone()),
        samples: Vec::with_capacity(count as usize),
    };
    for i in 0..count {
        if i > 0 {
            thread::sleep(Duration::from_millis(config.interval_ms));
        }
        let sample = match ctx.caps.probe.ping(&target, 1, probes.timeout()) {
            Ok(outcome) => outcome.latencies_ms.first().copied().filter(|_| outcome.success()),
            Err(_) => None,
        };
        out.samples.push(sample);
    }

    let answered = out.answered();
    let detail = format!(
        "{} samples answered, longest outage {} samples",
        ratio(answered, out.samples.len()),
        out.longest_outage()
    );
    let loss = out.loss_percent();
    if answered == 0 || loss >= probes.loss_fail_percent {
        ledger.fail(rank::STABILITY, "Stability", detail);
    } else if loss >= probes.loss_warn_percent {
        ledger.warn(rank::STABILITY, "Stability", detail);
    } else {
        ledger.ok(rank::STABILITY, "Stability", detail);
    }

    StageReport::done(ledger, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outage_and_loss() {
        let out = StabilityOutput {
            target: Some("1.1.1.1".to_string()),
            samples: vec![Some(10.0), None, None, Some(11.0), None, Some(9.0)],
        };
        assert_eq!(out.answered(), 3);
        assert_eq!(out.longest_outage(), 2);
        assert_eq!(out.loss_percent(), 50.0);
        assert_eq!(StabilityOutput::default().loss_percent(), 100.0);
    }
}
