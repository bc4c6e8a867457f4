//! Timeout-bounded check primitives.
//!
//! Each probe resolves to a latency in milliseconds or a [`ProbeError`];
//! none of them hang past their configured timeout. The [`Prober`] trait
//! is the seam the orchestrator drives, [`NetworkProber`] is the real
//! implementation over sockets and the system `ping` tool.

pub mod overlay;
pub mod ping;
pub mod tcp;
pub mod tls;

use std::any::Any;
use std::future::Future;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use tracing::debug;

pub use overlay::OverlayConnectProbe;
pub use ping::{PingProbe, PingStats};
pub use tcp::TcpPortProbe;
pub use tls::{TlsHandshake, TlsSniProbe};

use crate::check::CheckKind;
use crate::config::ProbeTimeouts;
use crate::endpoint::{EndpointDescriptor, ProtocolClass, TargetAddress};
use crate::error::ProbeError;

/// Concrete network target for one probe invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Result key: the raw string for a primary target, the rebuilt
    /// string for a fallback
    pub key: String,
    pub address: TargetAddress,
    /// Name presented through SNI, always the endpoint's original host
    pub server_name: String,
    pub port: u16,
    pub class: ProtocolClass,
    pub is_primary: bool,
}

impl ProbeTarget {
    pub fn primary(endpoint: &EndpointDescriptor) -> Self {
        Self {
            key: endpoint.key().to_string(),
            address: endpoint.target().clone(),
            server_name: endpoint.address().to_string(),
            port: endpoint.port(),
            class: endpoint.protocol_class(),
            is_primary: true,
        }
    }

    pub fn fallback(endpoint: &EndpointDescriptor, ip: IpAddr) -> Self {
        let address = endpoint.fallback_target(ip);
        Self {
            key: address.to_string(),
            address,
            server_name: endpoint.address().to_string(),
            port: endpoint.port(),
            class: endpoint.protocol_class(),
            is_primary: false,
        }
    }

    /// Host to connect to (a literal IP for fallbacks)
    pub fn host(&self) -> &str {
        &self.address.host
    }
}

/// Runs one check kind against one target
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Latency in milliseconds on success
    async fn probe(&self, kind: CheckKind, target: &ProbeTarget) -> Result<u64, ProbeError>;
}

/// Prober backed by real sockets
pub struct NetworkProber {
    ping: PingProbe,
    tcp: TcpPortProbe,
    tls: TlsSniProbe,
    overlay: OverlayConnectProbe,
}

impl NetworkProber {
    pub fn new(timeouts: &ProbeTimeouts) -> Self {
        Self {
            ping: PingProbe::new(timeouts.ping()),
            tcp: TcpPortProbe::new(timeouts.connect()),
            tls: TlsSniProbe::new(timeouts.connect(), timeouts.tls()),
            overlay: OverlayConnectProbe::new(timeouts),
        }
    }

    pub fn ping(&self) -> &PingProbe {
        &self.ping
    }

    /// Port check: TLS/SNI handshake for generic TLS hosts, bare TCP otherwise
    async fn port(&self, target: &ProbeTarget, port: u16) -> Result<u64, ProbeError> {
        match target.class {
            ProtocolClass::GenericTls | ProtocolClass::GenericSni => {
                self.tls.probe(target.host(), &target.server_name, port).await
            }
            _ => self.tcp.probe(target.host(), port).await,
        }
    }
}

#[async_trait::async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, kind: CheckKind, target: &ProbeTarget) -> Result<u64, ProbeError> {
        let result = match kind {
            CheckKind::Ping => self.ping.probe(target.host()).await,
            CheckKind::OverlayRtt => self.overlay.probe(target).await,
            CheckKind::PortDefault => self.port(target, target.port).await,
            CheckKind::Port80 => self.tcp.probe(target.host(), 80).await,
            CheckKind::Port443 => self.port(target, 443).await,
        };

        debug!(key = %target.key, kind = %kind, ?result, "probe finished");
        result
    }
}

/// Run a probe future, turning a panic inside it into a probe failure
pub async fn guarded<F>(probe: F) -> Result<u64, ProbeError>
where
    F: Future<Output = Result<u64, ProbeError>>,
{
    match AssertUnwindSafe(probe).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ProbeError::Probe(format!("probe panicked: {}", panic_message(payload.as_ref())))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Milliseconds elapsed since `start`
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
