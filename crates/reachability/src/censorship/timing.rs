//! Comparative timing: a TCP connect far slower than ICMP to the same host
//! suggests a middlebox holding the handshake.

use std::time::{Duration, Instant};

use super::{CensorshipProbeKind, CensorshipProbeResult, CensorshipTarget, Warning};
use crate::probe::{elapsed_ms, tcp};

/// Connect/ping ratio above which timing counts as anomalous
pub const ANOMALY_RATIO: f64 = 10.0;

/// `connect / max(ping, 1)`
pub fn ratio(ping_ms: u64, connect_ms: u64) -> f64 {
    connect_ms as f64 / ping_ms.max(1) as f64
}

pub fn classify(ping_ms: Option<u64>, connect_ms: u64) -> CensorshipProbeResult {
    let kind = CensorshipProbeKind::ComparativeTiming;
    let Some(ping_ms) = ping_ms else {
        return CensorshipProbeResult::clean(kind, "no baseline");
    };

    let ratio = ratio(ping_ms, connect_ms);
    let detail = format!("connect {connect_ms}ms vs ping {ping_ms}ms (x{ratio:.1})");
    let result = if ratio > ANOMALY_RATIO {
        CensorshipProbeResult::clean(kind, "").flagged(Warning::Anomaly, detail)
    } else {
        CensorshipProbeResult::clean(kind, detail)
    };
    CensorshipProbeResult { timing_ratio: Some(ratio), ..result }
}

pub async fn probe(target: &CensorshipTarget, connect_timeout: Duration) -> CensorshipProbeResult {
    let kind = CensorshipProbeKind::ComparativeTiming;
    if target.ping_ms.is_none() {
        return CensorshipProbeResult::clean(kind, "no baseline");
    }

    let start = Instant::now();
    match tcp::connect(&target.connect_host, target.port, connect_timeout).await {
        Ok(_stream) => classify(target.ping_ms, elapsed_ms(start)),
        Err(e) => CensorshipProbeResult::from_error(kind, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_timings_are_normal() {
        let result = classify(Some(20), 25);
        assert_eq!(result.warning, Warning::None);
        assert_eq!(result.timing_ratio, Some(1.25));
    }

    #[test]
    fn slow_connect_is_an_anomaly() {
        let result = classify(Some(20), 300);
        assert_eq!(result.warning, Warning::Anomaly);
        assert!(result.is_blocking);
        assert_eq!(result.timing_ratio, Some(15.0));
    }

    #[test]
    fn zero_ping_is_clamped() {
        assert_eq!(ratio(0, 5), 5.0);
        assert_eq!(classify(Some(0), 11).warning, Warning::Anomaly);
    }

    #[test]
    fn missing_baseline_is_not_judged() {
        let result = classify(None, 5000);
        assert_eq!(result.warning, Warning::None);
        assert_eq!(result.detail, "no baseline");
        assert_eq!(result.timing_ratio, None);
    }
}
