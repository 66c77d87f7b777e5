//! Reachability probes through ping, getent and traceroute.

use std::net::IpAddr;
use std::time::Duration;

use dialdoc_shared::{CapabilityError, NetProbe, PingOutcome, TraceHop};

use super::command;

/// Slack on top of the per-reply wait for process startup and DNS
const PROCESS_SLACK: Duration = Duration::from_secs(2);

/// Latencies from `time=X ms` lines plus the statistics line
/// `4 packets transmitted, 3 received, 25% packet loss, time 3004ms`
pub fn parse_ping(target: &str, output: &str) -> Option<PingOutcome> {
    let latencies_ms: Vec<f64> = output
        .lines()
        .filter_map(|l| l.split("time=").nth(1))
        .filter_map(|t| t.split_whitespace().next())
        .filter_map(|t| t.trim_end_matches("ms").parse().ok())
        .collect();

    let stats = output.lines().find(|l| l.contains("packets transmitted"))?;
    let number_before = |word: &str| {
        stats.split(',').find(|part| part.contains(word)).and_then(|part| {
            part.split_whitespace().next().and_then(|n| n.parse::<u32>().ok())
        })
    };

    Some(PingOutcome {
        target: target.to_string(),
        sent: number_before("transmitted")?,
        received: number_before("received")?,
        latencies_ms,
    })
}

/// Hops from `traceroute -n -q 1` output; the header line is skipped
pub fn parse_traceroute(output: &str) -> Vec<TraceHop> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let hop = tokens.next()?.parse::<u32>().ok()?;
            let rest: Vec<&str> = tokens.collect();
            let address = rest.first().and_then(|a| a.parse::<IpAddr>().ok());
            let rtt_ms = rest
                .iter()
                .position(|t| *t == "ms")
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| rest[i].parse().ok());
            Some(TraceHop {
                hop,
                address,
                rtt_ms: address.and(rtt_ms),
            })
        })
        .collect()
}

fn wait_secs(timeout: Duration) -> String {
    timeout.as_secs().max(1).to_string()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxProbe;

impl NetProbe for LinuxProbe {
    /// `timeout` bounds the wait for each reply
    fn ping(&self, target: &str, count: u32, timeout: Duration) -> Result<PingOutcome, CapabilityError> {
        let count = count.max(1);
        let count_arg = count.to_string();
        let wait = wait_secs(timeout);
        // ping paces echoes one second apart
        let deadline = Duration::from_secs(u64::from(count)) + timeout + PROCESS_SLACK;

        let out = command::run("ping", &["-n", "-c", &count_arg, "-W", &wait, target], deadline)?;
        // Exit 1 means no reply; the statistics line is still there
        match parse_ping(target, &out.stdout) {
            Some(outcome) => Ok(outcome),
            None if out.exit_code == Some(1) => Ok(PingOutcome {
                target: target.to_string(),
                sent: count,
                received: 0,
                latencies_ms: Vec::new(),
            }),
            None => Err(out.into_failure()),
        }
    }

    fn resolve_dns(&self, name: &str, timeout: Duration) -> Result<bool, CapabilityError> {
        let out = command::run("getent", &["hosts", name], timeout + PROCESS_SLACK)?;
        match out.exit_code {
            Some(0) => Ok(!out.stdout.trim().is_empty()),
            // getent: key not found
            Some(2) => Ok(false),
            _ => Err(out.into_failure()),
        }
    }

    fn traceroute(&self, target: &str, max_hops: u32, timeout: Duration) -> Result<Vec<TraceHop>, CapabilityError> {
        let hops = max_hops.max(1);
        let hops_arg = hops.to_string();
        let wait = wait_secs(timeout);
        let deadline = timeout * hops + PROCESS_SLACK;

        let out = command::run(
            "traceroute",
            &["-n", "-q", "1", "-m", &hops_arg, "-w", &wait, target],
            deadline,
        )?;
        if !out.success() {
            return Err(out.into_failure());
        }
        Ok(parse_traceroute(&out.stdout))
    }
}
