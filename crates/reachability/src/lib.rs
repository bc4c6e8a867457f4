//! Reachability - concurrent reachability and interference probing
//!
//! Given a list of endpoints (overlay peers and generic TLS/SNI hosts),
//! the engine runs a configurable battery of checks per target under
//! bounded concurrency, falls back to alternate addresses when the
//! primary target fails, and merges results with the previous pass so a
//! confirmed success is never lost. An optional suite of active probes
//! tells "host down" apart from "traffic interfered with".

pub mod censorship;
pub mod check;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod merger;
pub mod orchestrator;
pub mod planner;
pub mod probe;
pub mod result;

// Re-export main types
pub use censorship::{CensorshipProbeKind, CensorshipProbeResult, CensorshipSuite, CensorshipTarget, Warning};
pub use check::{CheckKind, CheckSet, Latency};
pub use config::{ProbeTimeouts, RunConfig};
pub use endpoint::{AddressResolver, EndpointDescriptor, ProtocolClass, StaticResolver, TargetAddress};
pub use error::{ConfigError, EndpointError, ProbeError, RunError};
pub use orchestrator::{CheckOrchestrator, RunEvent, RunPhase, RunProgress, RunStatus, RunSummary};
pub use planner::{Plan, PlannedTarget};
pub use probe::{NetworkProber, ProbeTarget, Prober};
pub use result::{CumulativeEndpointResult, ResultTable, TargetResult};

/// Cancellation handle accepted by [`CheckOrchestrator::run`]
pub use tokio_util::sync::CancellationToken;
