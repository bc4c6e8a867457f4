use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::check::{CheckKind, Latency};
use crate::error::ProbeError;

/// Reason reported when a target had no successful check
pub const ALL_CHECKS_FAILED: &str = "all checks failed";

/// One measurement record for one concrete network target
///
/// `available` is kept equal to "some check holds a latency" by every
/// constructor and mutator, and is recomputed when a stored record is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredTargetResult")]
pub struct TargetResult {
    target: String,
    is_primary: bool,
    ping: Latency,
    overlay_rtt: Latency,
    port_default: Latency,
    port_80: Latency,
    port_443: Latency,
    available: bool,
    error: Option<String>,
    checked_at: Option<DateTime<Utc>>,
}

/// Stored form of a [`TargetResult`]. The stored `available` flag is not
/// trusted; it is derived again from the latencies.
#[derive(Deserialize)]
struct StoredTargetResult {
    target: String,
    is_primary: bool,
    #[serde(default)]
    ping: Latency,
    #[serde(default)]
    overlay_rtt: Latency,
    #[serde(default)]
    port_default: Latency,
    #[serde(default)]
    port_80: Latency,
    #[serde(default)]
    port_443: Latency,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    checked_at: Option<DateTime<Utc>>,
}

impl From<StoredTargetResult> for TargetResult {
    fn from(stored: StoredTargetResult) -> Self {
        let mut result = Self {
            target: stored.target,
            is_primary: stored.is_primary,
            ping: stored.ping,
            overlay_rtt: stored.overlay_rtt,
            port_default: stored.port_default,
            port_80: stored.port_80,
            port_443: stored.port_443,
            available: false,
            error: stored.error,
            checked_at: stored.checked_at,
        };
        result.refresh_availability();
        result
    }
}

impl TargetResult {
    /// Fresh record with every check not attempted
    pub fn new(target: impl Into<String>, is_primary: bool) -> Self {
        Self {
            target: target.into(),
            is_primary,
            ping: Latency::NotAttempted,
            overlay_rtt: Latency::NotAttempted,
            port_default: Latency::NotAttempted,
            port_80: Latency::NotAttempted,
            port_443: Latency::NotAttempted,
            available: false,
            error: None,
            checked_at: None,
        }
    }

    pub fn primary(target: impl Into<String>) -> Self {
        Self::new(target, true)
    }

    pub fn fallback(target: impl Into<String>) -> Self {
        Self::new(target, false)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn checked_at(&self) -> Option<DateTime<Utc>> {
        self.checked_at
    }

    pub fn latency(&self, kind: CheckKind) -> Latency {
        match kind {
            CheckKind::Ping => self.ping,
            CheckKind::OverlayRtt => self.overlay_rtt,
            CheckKind::PortDefault => self.port_default,
            CheckKind::Port80 => self.port_80,
            CheckKind::Port443 => self.port_443,
        }
    }

    pub fn set_latency(&mut self, kind: CheckKind, latency: Latency) {
        let slot = match kind {
            CheckKind::Ping => &mut self.ping,
            CheckKind::OverlayRtt => &mut self.overlay_rtt,
            CheckKind::PortDefault => &mut self.port_default,
            CheckKind::Port80 => &mut self.port_80,
            CheckKind::Port443 => &mut self.port_443,
        };
        *slot = latency;
        self.refresh_availability();
    }

    /// Builder form of [`TargetResult::set_latency`]
    pub fn with_latency(mut self, kind: CheckKind, latency: Latency) -> Self {
        self.set_latency(kind, latency);
        self
    }

    pub fn with_checked_at(mut self, at: DateTime<Utc>) -> Self {
        self.checked_at = Some(at);
        self
    }

    /// Every check paired with its latency, in run order
    pub fn latencies(&self) -> impl Iterator<Item = (CheckKind, Latency)> + '_ {
        CheckKind::ALL.into_iter().map(|kind| (kind, self.latency(kind)))
    }

    /// Check kinds that hold a successful latency
    pub fn successful_kinds(&self) -> impl Iterator<Item = CheckKind> + '_ {
        self.latencies().filter(|(_, l)| l.is_success()).map(|(kind, _)| kind)
    }

    /// Whether any check ran at all, successfully or not
    pub fn was_attempted(&self) -> bool {
        self.latencies().any(|(_, l)| l.is_attempted())
    }

    /// Lowest successful latency across all checks
    pub fn best_latency(&self) -> Option<u64> {
        self.latencies().filter_map(|(_, l)| l.millis()).min()
    }

    /// Close out a probing pass: stamp the time and pick the error reason.
    ///
    /// A result with any success carries no error, and neither does one
    /// where no check ran. Otherwise the most specific failure reason is
    /// reported.
    pub fn finalize(&mut self, failures: &[ProbeError], at: DateTime<Utc>) {
        self.refresh_availability();
        self.checked_at = Some(at);
        self.error = if self.available || !self.was_attempted() {
            None
        } else {
            Some(failure_reason(failures))
        };
    }

    pub(crate) fn set_error(&mut self, error: Option<String>) {
        self.error = if self.available { None } else { error };
    }

    pub(crate) fn set_checked_at(&mut self, at: Option<DateTime<Utc>>) {
        self.checked_at = at;
    }

    fn refresh_availability(&mut self) {
        let available = self.latencies().any(|(_, l)| l.is_success());
        self.available = available;
        if available {
            self.error = None;
        }
    }
}

/// Error string for a target whose checks all failed
pub fn failure_reason(failures: &[ProbeError]) -> String {
    match failures.iter().max_by_key(|e| e.specificity()) {
        Some(err) => format!("{ALL_CHECKS_FAILED}: {}", err.reason()),
        None => ALL_CHECKS_FAILED.to_string(),
    }
}

/// Primary result plus fallback results for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeEndpointResult {
    pub key: String,
    pub primary: TargetResult,
    #[serde(default)]
    pub fallbacks: Vec<TargetResult>,
}

impl CumulativeEndpointResult {
    pub fn new(key: impl Into<String>, primary: TargetResult) -> Self {
        Self { key: key.into(), primary, fallbacks: Vec::new() }
    }

    /// Reachable through the primary target or any fallback
    pub fn is_available(&self) -> bool {
        self.primary.is_available() || self.fallbacks.iter().any(TargetResult::is_available)
    }

    pub fn fallback(&self, target: &str) -> Option<&TargetResult> {
        self.fallbacks.iter().find(|r| r.target() == target)
    }

    /// Whether any check ran on the primary target or a fallback
    pub fn was_attempted(&self) -> bool {
        self.primary.was_attempted() || self.fallbacks.iter().any(TargetResult::was_attempted)
    }

    /// First available fallback, in probe order
    pub fn working_fallback(&self) -> Option<&TargetResult> {
        self.fallbacks.iter().find(|r| r.is_available())
    }
}

/// Results keyed by the endpoint's raw target string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTable {
    entries: BTreeMap<String, CumulativeEndpointResult>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CumulativeEndpointResult> {
        self.entries.get(key)
    }

    /// Insert or replace an entry, returning the previous one
    pub fn insert(&mut self, result: CumulativeEndpointResult) -> Option<CumulativeEndpointResult> {
        self.entries.insert(result.key.clone(), result)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CumulativeEndpointResult> {
        self.entries.values()
    }

    pub fn available_count(&self) -> usize {
        self.iter().filter(|r| r.is_available()).count()
    }
}

impl FromIterator<CumulativeEndpointResult> for ResultTable {
    fn from_iter<I: IntoIterator<Item = CumulativeEndpointResult>>(iter: I) -> Self {
        let mut table = ResultTable::new();
        for result in iter {
            table.insert(result);
        }
        table
    }
}

impl IntoIterator for ResultTable {
    type Item = CumulativeEndpointResult;
    type IntoIter = std::collections::btree_map::IntoValues<String, CumulativeEndpointResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_follows_latencies() {
        let mut result = TargetResult::primary("tcp://a:1");
        assert!(!result.is_available());

        result.set_latency(CheckKind::Ping, Latency::Failed);
        assert!(!result.is_available());

        result.set_latency(CheckKind::Port80, Latency::Millis(12));
        assert!(result.is_available());
        assert_eq!(result.best_latency(), Some(12));
    }

    #[test]
    fn finalize_picks_most_specific_reason() {
        let mut result = TargetResult::primary("tcp://a:1").with_latency(CheckKind::Ping, Latency::Failed);
        result.finalize(&[ProbeError::NoSuchHost, ProbeError::Timeout], Utc::now());
        assert_eq!(result.error(), Some("all checks failed: timeout"));

        let mut bare = TargetResult::primary("tcp://a:1").with_latency(CheckKind::Ping, Latency::Failed);
        bare.finalize(&[], Utc::now());
        assert_eq!(bare.error(), Some(ALL_CHECKS_FAILED));
    }

    #[test]
    fn nothing_attempted_has_no_error() {
        let mut idle = TargetResult::primary("sni://a.example");
        idle.finalize(&[], Utc::now());
        assert!(!idle.was_attempted());
        assert!(!idle.is_available());
        assert_eq!(idle.error(), None);
        assert!(idle.checked_at().is_some());
    }

    #[test]
    fn loading_recomputes_availability() {
        let claims_up = r#"{"target":"tcp://a:1","is_primary":false,"ping":-2,"overlay_rtt":-2,
            "port_default":-1,"port_80":-1,"port_443":-1,"available":true,"error":null,"checked_at":null}"#;
        let result: TargetResult = serde_json::from_str(claims_up).unwrap();
        assert!(!result.is_available());

        let claims_down = r#"{"target":"tcp://a:1","is_primary":true,"ping":12,"overlay_rtt":-1,
            "port_default":-1,"port_80":-1,"port_443":-1,"available":false,"error":"all checks failed",
            "checked_at":null}"#;
        let result: TargetResult = serde_json::from_str(claims_down).unwrap();
        assert!(result.is_available());
        assert_eq!(result.error(), None);
        assert_eq!(result.successful_kinds().collect::<Vec<_>>(), vec![CheckKind::Ping]);
    }

    #[test]
    fn stored_results_read_back_equal() {
        let result = TargetResult::fallback("tcp://192.0.2.1:1")
            .with_latency(CheckKind::Port80, Latency::Millis(31))
            .with_latency(CheckKind::Ping, Latency::Failed)
            .with_checked_at(Utc::now());
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(serde_json::from_str::<TargetResult>(&json).unwrap(), result);
    }

    #[test]
    fn partial_success_has_no_error() {
        let mut result = TargetResult::primary("tcp://a:1")
            .with_latency(CheckKind::Ping, Latency::Failed)
            .with_latency(CheckKind::PortDefault, Latency::Millis(30));
        result.finalize(&[ProbeError::Timeout], Utc::now());
        assert!(result.is_available());
        assert_eq!(result.error(), None);
    }

    #[test]
    fn cumulative_is_available_through_fallback() {
        let mut entry = CumulativeEndpointResult::new(
            "tcp://a:1",
            TargetResult::primary("tcp://a:1").with_latency(CheckKind::Ping, Latency::Failed),
        );
        assert!(!entry.is_available());

        entry.fallbacks.push(
            TargetResult::fallback("tcp://192.0.2.1:1").with_latency(CheckKind::OverlayRtt, Latency::Millis(80)),
        );
        assert!(entry.is_available());
        assert_eq!(entry.working_fallback().map(|r| r.target()), Some("tcp://192.0.2.1:1"));
    }
}
