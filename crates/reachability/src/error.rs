//! Error taxonomy for probes, configuration and endpoint parsing.
//!
//! Probe errors never escape a worker task: they are folded into a
//! failed latency marker plus a short reason string. They still carry
//! enough structure to pick the most specific reason for a target.

use std::io;

use thiserror::Error;

/// Failure of a single probe invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("timeout")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("network unreachable")]
    Unreachable,

    #[error("no such host")]
    NoSuchHost,

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("{0}")]
    Probe(String),
}

impl ProbeError {
    /// Classify an I/O error by kind first, then by its message text.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => return Self::Timeout,
            io::ErrorKind::ConnectionRefused => return Self::ConnectionRefused,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                return Self::Unreachable;
            }
            _ => {}
        }

        Self::from_message(&err.to_string())
    }

    /// Classify a free-text error message from a socket layer or tool.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout
        } else if lower.contains("refused") {
            Self::ConnectionRefused
        } else if lower.contains("unreachable") || lower.contains("no route to host") {
            Self::Unreachable
        } else if lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
            || lower.contains("nodename nor servname")
            || lower.contains("no address associated")
            || lower.contains("unknown host")
            || lower.contains("temporary failure in name resolution")
        {
            Self::NoSuchHost
        } else {
            Self::Probe(message.to_string())
        }
    }

    /// Rank used to surface the most specific reason for a failed target.
    ///
    /// Higher wins: timeout > refused/unreachable > no such host >
    /// unsupported protocol > anything else.
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Timeout => 5,
            Self::ConnectionRefused | Self::Unreachable => 4,
            Self::NoSuchHost => 3,
            Self::UnsupportedProtocol(_) => 2,
            Self::Tls(_) | Self::Http(_) => 1,
            Self::Probe(_) => 0,
        }
    }

    /// Short reason string shown next to an unavailable target
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedProtocol(_))
    }
}

/// Invalid run configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("concurrency width {0} out of range (1..=30)")]
    Concurrency(usize),

    #[error("{name} timeout {value} ms out of range (100..=60000)")]
    Timeout { name: &'static str, value: u64 },

    #[error("no check kinds enabled")]
    NoChecksEnabled,

    #[error("ping sample count {0} out of range (1..=20)")]
    PingSamples(u32),
}

/// Target strings the descriptor layer cannot interpret
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("invalid target string {target:?}: {reason}")]
    Invalid { target: String, reason: String },

    #[error("unknown scheme {0:?}")]
    UnknownScheme(String),

    #[error("target {0:?} has no port and its protocol has no default")]
    MissingPort(String),
}

/// Failures setting up an orchestrator, before any run starts
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not build the interference probe client: {0}")]
    Client(ProbeError),
}
