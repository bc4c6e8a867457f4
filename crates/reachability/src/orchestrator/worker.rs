use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::TargetOutcome;
use crate::censorship::{CensorshipSuite, CensorshipTarget};
use crate::check::{CheckKind, CheckSet, Latency};
use crate::config::RunConfig;
use crate::endpoint::EndpointDescriptor;
use crate::merger::merge;
use crate::planner::{PlannedTarget, applies_to};
use crate::probe::{ProbeTarget, Prober, guarded};
use crate::result::{CumulativeEndpointResult, TargetResult};

/// Probes one endpoint: primary target, then fallbacks when called for
#[derive(Clone)]
pub(crate) struct TargetWorker {
    pub prober: Arc<dyn Prober>,
    pub config: Arc<RunConfig>,
    pub censorship: Option<Arc<CensorshipSuite>>,
    pub cancel: CancellationToken,
}

/// Fresh result for one concrete target plus the kinds its protocol
/// cannot support
struct Measured {
    result: TargetResult,
    unsupported: Vec<CheckKind>,
}

impl TargetWorker {
    /// `None` when cancellation was observed before the result could be
    /// published
    pub async fn run(&self, planned: PlannedTarget, prior_primary: Option<TargetResult>) -> Option<TargetOutcome> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let PlannedTarget { endpoint, kinds } = planned;
        let primary_kinds: Vec<CheckKind> =
            kinds.iter().copied().filter(|kind| applies_to(*kind, &endpoint)).collect();

        let primary = self.measure(&ProbeTarget::primary(&endpoint), &primary_kinds).await;
        let merged_primary = merge(prior_primary.as_ref(), primary.result.clone());

        let mut fallbacks = Vec::new();
        if self.config.always_check_fallbacks || !merged_primary.is_available() {
            let kinds = self.fallback_kinds(&kinds, &primary.unsupported);
            if !kinds.is_empty() {
                fallbacks = self.probe_fallbacks(&endpoint, &kinds).await;
            }
        }

        let interference = match &self.censorship {
            Some(suite) if !self.cancel.is_cancelled() => {
                let ping_ms = merged_primary.latency(CheckKind::Ping).millis();
                let target = CensorshipTarget::new(endpoint.address(), endpoint.port()).with_ping(ping_ms);
                suite.run(&target).await
            }
            _ => Vec::new(),
        };

        if self.cancel.is_cancelled() {
            debug!(key = endpoint.key(), "cancelled, discarding result");
            return None;
        }

        let fresh = CumulativeEndpointResult { key: endpoint.key().to_string(), primary: primary.result, fallbacks };
        Some(TargetOutcome { fresh, interference })
    }

    /// The planned kinds plus overlay RTT, which always applies once the
    /// literal IP is substituted into the connection string
    fn fallback_kinds(&self, planned: &CheckSet, unsupported: &[CheckKind]) -> Vec<CheckKind> {
        let mut kinds = planned.clone();
        if self.config.enabled_checks.contains(&CheckKind::OverlayRtt) {
            kinds.insert(CheckKind::OverlayRtt);
        }
        kinds.into_iter().filter(|kind| !unsupported.contains(kind)).collect()
    }

    async fn probe_fallbacks(&self, endpoint: &EndpointDescriptor, kinds: &[CheckKind]) -> Vec<TargetResult> {
        let stop_after_first = self.config.fast_mode && !self.config.always_check_fallbacks;
        let mut results = Vec::new();

        for ip in endpoint.alternates() {
            if self.cancel.is_cancelled() {
                break;
            }
            if ip.to_string() == endpoint.address() {
                continue;
            }

            let measured = self.measure(&ProbeTarget::fallback(endpoint, *ip), kinds).await;
            let found = measured.result.is_available();
            results.push(measured.result);

            if found && stop_after_first {
                debug!(key = endpoint.key(), %ip, "fallback reachable, skipping the rest");
                break;
            }
        }

        results
    }

    /// Run kinds in order against one target. In fast mode the first
    /// success ends the pass and the rest stay not-attempted.
    async fn measure(&self, target: &ProbeTarget, kinds: &[CheckKind]) -> Measured {
        let mut result =
            if target.is_primary { TargetResult::primary(&target.key) } else { TargetResult::fallback(&target.key) };
        let mut failures = Vec::new();
        let mut unsupported = Vec::new();

        for &kind in kinds {
            match guarded(self.prober.probe(kind, target)).await {
                Ok(latency_ms) => {
                    result.set_latency(kind, Latency::Millis(latency_ms));
                    if self.config.fast_mode {
                        break;
                    }
                }
                Err(err) => {
                    debug!(key = %target.key, %kind, error = %err, "check failed");
                    if err.is_unsupported() {
                        unsupported.push(kind);
                    }
                    result.set_latency(kind, Latency::Failed);
                    failures.push(err);
                }
            }
        }

        result.finalize(&failures, Utc::now());
        Measured { result, unsupported }
    }
}
