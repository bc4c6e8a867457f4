//! Field-wise "keep success" merge of target results.
//!
//! Re-running checks can never turn a confirmed success back into a
//! failure: a success on either side survives, and between two
//! successes the fresh measurement wins.

use crate::check::{CheckKind, Latency};
use crate::result::{CumulativeEndpointResult, TargetResult};

/// Merge one latency slot
pub fn merge_latency(previous: Latency, fresh: Latency) -> Latency {
    match (previous, fresh) {
        (_, Latency::Millis(ms)) => Latency::Millis(ms),
        (Latency::Millis(ms), _) => Latency::Millis(ms),
        (_, Latency::Failed) => Latency::Failed,
        (Latency::Failed, Latency::NotAttempted) => Latency::Failed,
        (Latency::NotAttempted, Latency::NotAttempted) => Latency::NotAttempted,
    }
}

/// Merge a fresh result over the prior result for the same target
pub fn merge(previous: Option<&TargetResult>, fresh: TargetResult) -> TargetResult {
    let Some(previous) = previous else {
        return fresh;
    };

    let mut merged = fresh.clone();
    for kind in CheckKind::ALL {
        merged.set_latency(kind, merge_latency(previous.latency(kind), fresh.latency(kind)));
    }

    // set_error drops the reason once any success survived the merge
    merged.set_error(fresh.error().or(previous.error()).map(str::to_string));
    merged.set_checked_at(fresh.checked_at().max(previous.checked_at()));
    merged
}

/// Merge a whole endpoint entry. Fallbacks pair up by target string;
/// prior fallbacks not probed this pass are kept after the fresh ones.
pub fn merge_cumulative(
    previous: Option<&CumulativeEndpointResult>,
    fresh: CumulativeEndpointResult,
) -> CumulativeEndpointResult {
    let Some(previous) = previous else {
        return fresh;
    };

    let primary = merge(Some(&previous.primary), fresh.primary);

    let mut fallbacks: Vec<TargetResult> = fresh
        .fallbacks
        .into_iter()
        .map(|result| {
            let prior = previous.fallback(result.target());
            merge(prior, result)
        })
        .collect();

    for prior in &previous.fallbacks {
        if !fallbacks.iter().any(|r| r.target() == prior.target()) {
            fallbacks.push(prior.clone());
        }
    }

    CumulativeEndpointResult { key: fresh.key, primary, fallbacks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use chrono::Utc;

    const STATES: [Latency; 4] = [Latency::NotAttempted, Latency::Failed, Latency::Millis(0), Latency::Millis(90)];

    #[test]
    fn merge_never_regresses_a_success() {
        for previous in STATES {
            for fresh in STATES {
                let merged = merge_latency(previous, fresh);
                if previous.is_success() || fresh.is_success() {
                    assert!(merged.is_success(), "{previous:?} + {fresh:?} lost success");
                }
                if fresh.is_success() {
                    assert_eq!(merged, fresh);
                }
            }
        }
    }

    #[test]
    fn failure_marker_is_kept_when_not_retried() {
        assert_eq!(merge_latency(Latency::Failed, Latency::NotAttempted), Latency::Failed);
        assert_eq!(merge_latency(Latency::NotAttempted, Latency::Failed), Latency::Failed);
        assert_eq!(merge_latency(Latency::NotAttempted, Latency::NotAttempted), Latency::NotAttempted);
    }

    #[test]
    fn merged_result_availability_is_or_of_inputs() {
        let mut previous = TargetResult::primary("tls://a:1").with_latency(CheckKind::Ping, Latency::Millis(40));
        previous.finalize(&[], Utc::now());

        let mut fresh = TargetResult::primary("tls://a:1").with_latency(CheckKind::PortDefault, Latency::Failed);
        fresh.finalize(&[ProbeError::ConnectionRefused], Utc::now());
        assert!(fresh.error().is_some());

        let merged = merge(Some(&previous), fresh);
        assert!(merged.is_available());
        assert_eq!(merged.latency(CheckKind::Ping), Latency::Millis(40));
        assert_eq!(merged.latency(CheckKind::PortDefault), Latency::Failed);
        assert_eq!(merged.error(), None);
    }

    #[test]
    fn failed_merge_keeps_fresh_error() {
        let mut previous = TargetResult::primary("tcp://a:1").with_latency(CheckKind::Ping, Latency::Failed);
        previous.finalize(&[ProbeError::NoSuchHost], Utc::now());
        let mut fresh = TargetResult::primary("tcp://a:1").with_latency(CheckKind::Ping, Latency::Failed);
        fresh.finalize(&[ProbeError::Timeout], Utc::now());

        let merged = merge(Some(&previous), fresh);
        assert!(!merged.is_available());
        assert_eq!(merged.error(), Some("all checks failed: timeout"));
    }

    #[test]
    fn cumulative_merge_pairs_fallbacks_by_target() {
        let mut previous = CumulativeEndpointResult::new("tcp://a:1", TargetResult::primary("tcp://a:1"));
        previous.fallbacks = vec![
            TargetResult::fallback("tcp://192.0.2.1:1").with_latency(CheckKind::OverlayRtt, Latency::Millis(10)),
            TargetResult::fallback("tcp://192.0.2.2:1").with_latency(CheckKind::OverlayRtt, Latency::Failed),
        ];

        let mut fresh = CumulativeEndpointResult::new("tcp://a:1", TargetResult::primary("tcp://a:1"));
        fresh.fallbacks =
            vec![TargetResult::fallback("tcp://192.0.2.1:1").with_latency(CheckKind::OverlayRtt, Latency::Failed)];

        let merged = merge_cumulative(Some(&previous), fresh);
        assert_eq!(merged.fallbacks.len(), 2);
        assert_eq!(merged.fallbacks[0].latency(CheckKind::OverlayRtt), Latency::Millis(10));
        assert_eq!(merged.fallbacks[1].target(), "tcp://192.0.2.2:1");
        assert!(merged.is_available());
    }
}
