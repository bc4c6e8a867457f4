//! ICMP echo through the system `ping` tool.
//!
//! Raw ICMP sockets need elevated privileges, the setuid `ping` binary
//! does not. Any non-zero exit or unparsable output is a failure.

use std::process::Output;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::validate_ping_samples;
use crate::error::ProbeError;

/// Extra time granted to the process on top of its own reply deadline
const PROCESS_GRACE: Duration = Duration::from_millis(500);

/// Interval between echoes in multi-sample mode, in seconds
const SAMPLE_INTERVAL: &str = "0.2";

/// Common initial TTL values, smallest first
const INITIAL_TTLS: [u16; 3] = [64, 128, 255];

/// Aggregate of a multi-sample ping run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    pub sent: u32,
    pub received: u32,
    pub loss_percent: f64,
    pub avg_ms: Option<f64>,
    pub ttl: Option<u8>,
    /// Hops estimated from the reply TTL
    pub hops: Option<u8>,
}

/// Echo probe
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { program: "ping".to_string(), timeout }
    }

    /// Use a different ping binary (e.g. `ping6` or an absolute path)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Single echo; returns the reported round-trip time
    pub async fn probe(&self, host: &str) -> Result<u64, ProbeError> {
        let output = self.run(host, 1, self.timeout + PROCESS_GRACE).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            return Err(classify_failure(output.status.code(), &output));
        }

        parse_reply_time(&stdout)
            .map(|ms| ms.round() as u64)
            .ok_or_else(|| ProbeError::Probe("unparsable ping output".to_string()))
    }

    /// Multi-sample diagnostic run: loss, average RTT and hop estimate.
    /// Not part of the reachability path.
    pub async fn diagnose(&self, host: &str, samples: u32) -> Result<PingStats, ProbeError> {
        validate_ping_samples(samples).map_err(|e| ProbeError::Probe(e.to_string()))?;

        let budget = self.timeout * samples + PROCESS_GRACE;
        let output = self.run(host, samples, budget).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match parse_stats(&stdout) {
            Some(stats) => Ok(stats),
            None if !output.status.success() => Err(classify_failure(output.status.code(), &output)),
            None => Err(ProbeError::Probe("unparsable ping output".to_string())),
        }
    }

    async fn run(&self, host: &str, count: u32, budget: Duration) -> Result<Output, ProbeError> {
        let wait_secs = self.timeout.as_secs().max(1);

        let mut command = Command::new(&self.program);
        command.arg("-n").arg("-c").arg(count.to_string()).arg("-W").arg(wait_secs.to_string());
        if count > 1 {
            command.arg("-i").arg(SAMPLE_INTERVAL);
        }
        command.arg(host).kill_on_drop(true);

        timeout(budget, command.output())
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(|e| ProbeError::Probe(format!("failed to run {}: {e}", self.program)))
    }
}

fn classify_failure(code: Option<i32>, output: &Output) -> ProbeError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        let classified = ProbeError::from_message(&stderr);
        if !matches!(classified, ProbeError::Probe(_)) {
            return classified;
        }
    }

    match code {
        // exit 1: no reply within the deadline
        Some(1) => ProbeError::Timeout,
        Some(code) => ProbeError::Probe(format!("ping exited with status {code}: {}", stderr.trim())),
        None => ProbeError::Probe("ping terminated by signal".to_string()),
    }
}

/// `time=12.3 ms` from a reply line
pub fn parse_reply_time(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let idx = line.find("time=").or_else(|| line.find("time<"))?;
        leading_number(&line[idx + 5..])
    })
}

/// Parse the statistics block printed at the end of a ping run
pub fn parse_stats(output: &str) -> Option<PingStats> {
    let summary = output.lines().find(|line| line.contains("packets transmitted"))?;
    let mut parts = summary.split(',');
    let sent = leading_number(parts.next()?.trim())? as u32;
    let received = leading_number(parts.next()?.trim())? as u32;

    let loss_percent =
        if sent == 0 { 100.0 } else { f64::from(sent - received.min(sent)) * 100.0 / f64::from(sent) };

    // "rtt min/avg/max/mdev = 1.1/2.2/3.3/0.4 ms" or "round-trip min/avg/max/stddev = ..."
    let avg_ms = output
        .lines()
        .find(|line| line.contains("min/avg/max"))
        .and_then(|line| line.split('=').nth(1))
        .and_then(|values| values.trim().split('/').nth(1))
        .and_then(|avg| avg.trim().parse::<f64>().ok());

    let ttl = output.lines().find_map(|line| {
        let idx = line.find("ttl=")?;
        leading_number(&line[idx + 4..]).map(|v| v as u8)
    });

    Some(PingStats { sent, received, loss_percent, avg_ms, ttl, hops: ttl.and_then(estimate_hops) })
}

/// Hops between us and the replying host, assuming it started from the
/// nearest common initial TTL
pub fn estimate_hops(ttl: u8) -> Option<u8> {
    let ttl = u16::from(ttl);
    let initial = INITIAL_TTLS.into_iter().find(|initial| *initial >= ttl)?;
    u8::try_from(initial - ttl).ok()
}

fn leading_number(text: &str) -> Option<f64> {
    let end = text.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(text.len());
    text[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = "PING example.org (93.184.216.34) 56(84) bytes of data.
64 bytes from 93.184.216.34: icmp_seq=1 ttl=54 time=41.7 ms

--- example.org ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
rtt min/avg/max/mdev = 41.700/41.700/41.700/0.000 ms
";

    const MULTI_LOSSY: &str = "PING 192.0.2.9 (192.0.2.9) 56(84) bytes of data.
64 bytes from 192.0.2.9: icmp_seq=1 ttl=118 time=20.1 ms
64 bytes from 192.0.2.9: icmp_seq=3 ttl=118 time=22.3 ms

--- 192.0.2.9 ping statistics ---
4 packets transmitted, 2 received, 50% packet loss, time 612ms
rtt min/avg/max/mdev = 20.100/21.200/22.300/1.100 ms
";

    #[test]
    fn parses_reply_time() {
        assert_eq!(parse_reply_time(SINGLE), Some(41.7));
        assert_eq!(parse_reply_time("reply from 10.0.0.1: bytes=32 time<1ms TTL=64"), Some(1.0));
        assert_eq!(parse_reply_time("Request timeout for icmp_seq 0"), None);
    }

    #[test]
    fn parses_multi_sample_statistics() {
        let stats = parse_stats(MULTI_LOSSY).unwrap();
        assert_eq!(stats.sent, 4);
        assert_eq!(stats.received, 2);
        assert_eq!(stats.loss_percent, 50.0);
        assert_eq!(stats.avg_ms, Some(21.2));
        assert_eq!(stats.ttl, Some(118));
        assert_eq!(stats.hops, Some(10));
    }

    #[test]
    fn hop_estimate_uses_nearest_initial_ttl() {
        assert_eq!(estimate_hops(54), Some(10));
        assert_eq!(estimate_hops(64), Some(0));
        assert_eq!(estimate_hops(250), Some(5));
    }

    #[test]
    fn statistics_without_replies() {
        let output = "--- 192.0.2.1 ping statistics ---
3 packets transmitted, 0 received, 100% packet loss, time 2040ms
";
        let stats = parse_stats(output).unwrap();
        assert_eq!(stats.received, 0);
        assert_eq!(stats.loss_percent, 100.0);
        assert_eq!(stats.avg_ms, None);
        assert_eq!(stats.hops, None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_probe_failure() {
        let probe = PingProbe::new(Duration::from_millis(500)).with_program("definitely-not-a-ping-binary");
        let result = probe.probe("127.0.0.1").await;
        assert!(matches!(result, Err(ProbeError::Probe(_))));
    }

    #[tokio::test]
    async fn rejects_out_of_range_sample_counts() {
        let probe = PingProbe::new(Duration::from_millis(500));
        assert!(probe.diagnose("127.0.0.1", 0).await.is_err());
    }
}
