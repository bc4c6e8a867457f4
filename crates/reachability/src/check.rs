use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of reachability check run against a target
///
/// Declaration order is the order checks run in for a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    Ping,
    OverlayRtt,
    PortDefault,
    #[serde(rename = "port-80")]
    Port80,
    #[serde(rename = "port-443")]
    Port443,
}

/// Ordered set of check kinds
pub type CheckSet = BTreeSet<CheckKind>;

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::Ping,
        CheckKind::OverlayRtt,
        CheckKind::PortDefault,
        CheckKind::Port80,
        CheckKind::Port443,
    ];

    /// Every check kind
    pub fn all() -> CheckSet {
        Self::ALL.into_iter().collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Ping => "ping",
            CheckKind::OverlayRtt => "overlay-rtt",
            CheckKind::PortDefault => "port-default",
            CheckKind::Port80 => "port-80",
            CheckKind::Port443 => "port-443",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ping" => Ok(CheckKind::Ping),
            "overlay-rtt" | "rtt" => Ok(CheckKind::OverlayRtt),
            "port-default" | "port" => Ok(CheckKind::PortDefault),
            "port-80" | "80" => Ok(CheckKind::Port80),
            "port-443" | "443" => Ok(CheckKind::Port443),
            other => Err(format!("unknown check kind: {other}")),
        }
    }
}

/// Tri-state outcome of one check
///
/// Exported as an `i64`: [`Latency::NOT_ATTEMPTED`], [`Latency::FAILED`]
/// or a non-negative number of milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Latency {
    #[default]
    NotAttempted,
    Failed,
    Millis(u64),
}

impl Latency {
    pub const NOT_ATTEMPTED: i64 = -1;
    pub const FAILED: i64 = -2;

    pub fn is_success(&self) -> bool {
        matches!(self, Latency::Millis(_))
    }

    pub fn is_attempted(&self) -> bool {
        !matches!(self, Latency::NotAttempted)
    }

    pub fn millis(&self) -> Option<u64> {
        match self {
            Latency::Millis(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Latency::NotAttempted => Self::NOT_ATTEMPTED,
            Latency::Failed => Self::FAILED,
            Latency::Millis(ms) => i64::try_from(ms).unwrap_or(i64::MAX),
        }
    }

    /// Any negative value other than the not-attempted sentinel reads as failed.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            Self::NOT_ATTEMPTED => Latency::NotAttempted,
            ms if ms >= 0 => Latency::Millis(ms as u64),
            _ => Latency::Failed,
        }
    }
}

impl From<i64> for Latency {
    fn from(raw: i64) -> Self {
        Latency::from_raw(raw)
    }
}

impl From<Latency> for i64 {
    fn from(latency: Latency) -> Self {
        latency.to_raw()
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Latency::NotAttempted => write!(f, "-"),
            Latency::Failed => write!(f, "fail"),
            Latency::Millis(ms) => write!(f, "{ms}ms"),
        }
    }
}
