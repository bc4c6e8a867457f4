//! TLS handshake probe presenting the target hostname through SNI.
//!
//! Certificate validation is disabled on purpose: the probe measures
//! reachability, and substituted certificates are judged separately by
//! the certificate probe of the censorship suite.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::{ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::{self, Certificate, ClientConfig, ServerName};

use super::{elapsed_ms, tcp};
use crate::error::ProbeError;

/// Accepts whatever certificate the server presents
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Client config that skips certificate validation
pub fn insecure_client_config() -> Arc<ClientConfig> {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    Arc::new(config)
}

/// Outcome of a completed handshake
#[derive(Debug, Clone)]
pub struct TlsHandshake {
    /// Connect plus handshake time
    pub latency_ms: u64,
    /// Presented chain, leaf first
    pub peer_certificates: Vec<Certificate>,
}

/// TCP connect followed by a TLS handshake
#[derive(Clone)]
pub struct TlsSniProbe {
    connector: TlsConnector,
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl TlsSniProbe {
    pub fn new(connect_timeout: Duration, handshake_timeout: Duration) -> Self {
        Self { connector: TlsConnector::from(insecure_client_config()), connect_timeout, handshake_timeout }
    }

    /// Time to completed handshake
    pub async fn probe(&self, host: &str, server_name: &str, port: u16) -> Result<u64, ProbeError> {
        self.handshake(host, server_name, port).await.map(|h| h.latency_ms)
    }

    /// Connect to `host:port` and handshake presenting `server_name`
    pub async fn handshake(
        &self,
        host: &str,
        server_name: &str,
        port: u16,
    ) -> Result<TlsHandshake, ProbeError> {
        let name = server_name_for(server_name, host)?;

        let start = Instant::now();
        let stream = tcp::connect(host, port, self.connect_timeout).await?;

        let tls_stream = timeout(self.handshake_timeout, self.connector.connect(name, stream))
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(|e| match ProbeError::from_io(&e) {
                ProbeError::Probe(message) => ProbeError::Tls(message),
                classified => classified,
            })?;
        let latency_ms = elapsed_ms(start);

        let (_, connection) = tls_stream.get_ref();
        let peer_certificates = connection.peer_certificates().map(<[Certificate]>::to_vec).unwrap_or_default();

        Ok(TlsHandshake { latency_ms, peer_certificates })
    }
}

/// SNI name for the handshake, falling back to the connect host when the
/// configured name is not a valid DNS name
fn server_name_for(server_name: &str, host: &str) -> Result<ServerName, ProbeError> {
    ServerName::try_from(server_name)
        .or_else(|_| ServerName::try_from(host))
        .map_err(|e| ProbeError::Tls(format!("invalid server name {server_name:?}: {e}")))
}
