use crate::config::ProbeTimeouts;
use crate::endpoint::ProtocolClass;
use crate::error::ProbeError;

use super::{ProbeTarget, TcpPortProbe, TlsSniProbe};

/// Best-effort connect-and-measure probe for overlay peers
///
/// `tcp`/`ws` peers get a bare TCP connect, `tls`/`wss` peers a TLS
/// handshake without validation (peers use self-issued certificates).
/// QUIC is not supported and fails with a distinct reason.
#[derive(Clone)]
pub struct OverlayConnectProbe {
    tcp: TcpPortProbe,
    tls: TlsSniProbe,
}

impl OverlayConnectProbe {
    pub fn new(timeouts: &ProbeTimeouts) -> Self {
        Self {
            tcp: TcpPortProbe::new(timeouts.connect()),
            tls: TlsSniProbe::new(timeouts.connect(), timeouts.tls()),
        }
    }

    pub async fn probe(&self, target: &ProbeTarget) -> Result<u64, ProbeError> {
        match target.class {
            ProtocolClass::OverlayQuic => Err(ProbeError::UnsupportedProtocol("quic".to_string())),
            class if class.uses_tls() => self.tls.probe(target.host(), &target.server_name, target.port).await,
            _ => self.tcp.probe(target.host(), target.port).await,
        }
    }
}
