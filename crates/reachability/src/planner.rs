//! Work planning for incremental re-runs.
//!
//! Pure function of the endpoint list, the enabled check kinds and the
//! prior result table. A kind that already succeeded for an endpoint's
//! primary target is never scheduled again; failed kinds are retried.

use crate::check::{CheckKind, CheckSet};
use crate::endpoint::EndpointDescriptor;
use crate::result::ResultTable;

/// One endpoint that still needs work, with the kinds left to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTarget {
    pub endpoint: EndpointDescriptor,
    pub kinds: CheckSet,
}

/// Output of a planning step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub work: Vec<PlannedTarget>,
    /// Keys of endpoints excluded because they are already fully known
    pub skipped: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.work.is_empty()
    }
}

/// Whether a check kind means anything for an endpoint's primary target
pub fn applies_to(kind: CheckKind, endpoint: &EndpointDescriptor) -> bool {
    match kind {
        CheckKind::OverlayRtt => endpoint.protocol_class().is_overlay(),
        _ => true,
    }
}

/// Reduce the endpoint list to the targets and kinds still missing a success
pub fn plan(endpoints: &[EndpointDescriptor], enabled: &CheckSet, prior: &ResultTable) -> Plan {
    let mut result = Plan::default();

    for endpoint in endpoints {
        let Some(previous) = prior.get(endpoint.key()) else {
            result.work.push(PlannedTarget { endpoint: endpoint.clone(), kinds: enabled.clone() });
            continue;
        };

        let missing: CheckSet = enabled
            .iter()
            .copied()
            .filter(|kind| applies_to(*kind, endpoint))
            .filter(|kind| !previous.primary.latency(*kind).is_success())
            .collect();

        if missing.is_empty() {
            result.skipped.push(endpoint.key().to_string());
        } else {
            result.work.push(PlannedTarget { endpoint: endpoint.clone(), kinds: missing });
        }
    }

    result
}
