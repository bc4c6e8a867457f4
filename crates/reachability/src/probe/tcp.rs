use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;

use super::elapsed_ms;
use crate::error::ProbeError;

/// Raw TCP connect probe
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    timeout: Duration,
}

impl TcpPortProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Time to connection establishment
    pub async fn probe(&self, host: &str, port: u16) -> Result<u64, ProbeError> {
        let start = Instant::now();
        let _stream = connect(host, port, self.timeout).await?;
        Ok(elapsed_ms(start))
    }
}

/// Open a stream, mapping an elapsed deadline to [`ProbeError::Timeout`]
pub(crate) async fn connect(host: &str, port: u16, limit: Duration) -> Result<TcpStream, ProbeError> {
    timeout(limit, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ProbeError::Timeout)?
        .map_err(|e| ProbeError::from_io(&e))
}

/// First address `host` resolves to, bounded by `limit`
pub(crate) async fn resolve(host: &str, port: u16, limit: Duration) -> Result<SocketAddr, ProbeError> {
    timeout(limit, lookup_host((host, port)))
        .await
        .map_err(|_| ProbeError::Timeout)?
        .map_err(|e| ProbeError::from_io(&e))?
        .next()
        .ok_or(ProbeError::NoSuchHost)
}
