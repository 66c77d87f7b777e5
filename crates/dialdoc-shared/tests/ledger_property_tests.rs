//! Property tests for the health ledger.
//!
//! Randomized `add` sequences generated with a small xorshift RNG so the
//! runs are reproducible without extra crates.
//!
//! ## Properties
//!
//! - Records come back in non-decreasing rank order
//! - Equal ranks keep insertion order
//! - Overall status is FAIL iff any FAIL, WARN iff any WARN and no FAIL
//! - Counts add up to the number of accepted records
//! - Every prefix of the run is extended by the final ledger

use dialdoc_shared::{HealthLedger, HealthStatus};

struct TestRng {
    state: u64,
}

impl TestRng {
    fn new(seed: u64) -> Self {
        Self { state: if seed == 0 { 1 } else { seed } }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }
}

fn random_status(rng: &mut TestRng) -> HealthStatus {
    match rng.next_range(0, 3) {
        0 => HealthStatus::Ok,
        1 => HealthStatus::Warn,
        _ => HealthStatus::Fail,
    }
}

const LABELS: &[&str] = &["System", "Adapter", "Link", "PPP", "DNS", "Ping", "", "  "];

#[test]
fn prop_rank_order_and_rollup() {
    for seed in 1..200u64 {
        let mut rng = TestRng::new(seed);
        let mut ledger = HealthLedger::new();
        let mut accepted: Vec<(i32, usize, HealthStatus)> = Vec::new();
        let mut snapshots = Vec::new();

        let count = rng.next_range(0, 30);
        for i in 0..count {
            let rank = rng.next_range(0, 12) as i32 - 3;
            let label = LABELS[rng.next_range(0, LABELS.len() as u64) as usize];
            let status = random_status(&mut rng);
            let detail = format!("step {}", i);

            if ledger.add(label, status, &detail, rank).is_ok() {
                accepted.push((rank, i as usize, status));
            } else {
                assert!(label.trim().is_empty(), "seed {}: valid label rejected", seed);
            }
            snapshots.push(ledger.clone());
        }

        let summary = ledger.summarize();
        assert_eq!(summary.records.len(), accepted.len(), "seed {}", seed);

        // Non-decreasing rank
        for pair in summary.records.windows(2) {
            assert!(pair[0].rank <= pair[1].rank, "seed {}: rank order", seed);
        }

        // Stable within rank: details carry the insertion index
        let mut expected = accepted.clone();
        expected.sort_by_key(|(rank, idx, _)| (*rank, *idx));
        let got: Vec<String> = summary.records.iter().map(|r| r.detail.clone()).collect();
        let want: Vec<String> = expected
            .iter()
            .map(|(_, idx, _)| format!("step {}", idx))
            .collect();
        assert_eq!(got, want, "seed {}: insertion order within rank", seed);

        let any_fail = accepted.iter().any(|(_, _, s)| *s == HealthStatus::Fail);
        let any_warn = accepted.iter().any(|(_, _, s)| *s == HealthStatus::Warn);
        let expected_overall = if any_fail {
            HealthStatus::Fail
        } else if any_warn {
            HealthStatus::Warn
        } else {
            HealthStatus::Ok
        };
        assert_eq!(summary.overall_status, expected_overall, "seed {}", seed);
        assert_eq!(summary.counts.total(), accepted.len(), "seed {}", seed);

        for snapshot in &snapshots {
            assert!(ledger.extends(snapshot), "seed {}: append-only", seed);
        }
    }
}

#[test]
fn prop_keys_unique() {
    for seed in 1..50u64 {
        let mut rng = TestRng::new(seed);
        let mut ledger = HealthLedger::new();
        for _ in 0..40 {
            let rank = rng.next_range(0, 3) as i32;
            ledger.ok(rank, "Same", "x");
        }
        let mut keys: Vec<&str> = ledger.keys().collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before, "seed {}", seed);
    }
}
