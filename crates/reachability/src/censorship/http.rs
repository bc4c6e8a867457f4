//! Minimal HTTP/1.1 GET over a raw socket.
//!
//! Used where the exact bytes a middlebox injects matter more than a
//! conforming client: nothing is normalised, redirects are not followed and
//! reading stops at a byte limit.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::ProbeError;
use crate::probe::tcp;

pub const USER_AGENT: &str = concat!("prober/", env!("CARGO_PKG_VERSION"));

/// Bytes captured from a raw GET
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub bytes: Vec<u8>,
}

impl RawResponse {
    pub fn status_line(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.bytes);
        text.lines().next().map(|line| line.trim_end().to_string()).filter(|line| !line.is_empty())
    }

    pub fn status(&self) -> Option<u16> {
        self.status_line().as_deref().and_then(parse_status_line)
    }

    /// Bytes after the header block, or nothing if the head never ended
    pub fn body(&self) -> &[u8] {
        self.bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|at| &self.bytes[at + 4..])
            .unwrap_or_default()
    }
}

/// `HTTP/1.1 451 Unavailable For Legal Reasons` -> `451`
pub fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}

/// Map a client error onto the probe taxonomy
pub fn client_error(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        return ProbeError::Timeout;
    }
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    match ProbeError::from_message(&message) {
        ProbeError::Probe(_) => ProbeError::Http(message),
        classified => classified,
    }
}

fn host_header(host: &str, port: u16) -> String {
    let host = if host.contains(':') { format!("[{host}]") } else { host.to_string() };
    if port == 80 { host } else { format!("{host}:{port}") }
}

/// Send `GET /` for `host` to `connect_host:port` and read at most `limit`
/// bytes. Partial data read before the deadline is returned as-is.
pub async fn raw_get(
    connect_host: &str,
    host: &str,
    port: u16,
    limit: usize,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<RawResponse, ProbeError> {
    let mut stream = tcp::connect(connect_host, port, connect_timeout).await?;

    let request = format!(
        "GET / HTTP/1.1\r\nHost: {}\r\nUser-Agent: {USER_AGENT}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
        host_header(host, port)
    );
    stream.write_all(request.as_bytes()).await.map_err(|e| ProbeError::from_io(&e))?;

    let mut bytes = Vec::with_capacity(limit.min(16 * 1024));
    let mut chunk = [0u8; 2048];
    let read_all = async {
        while bytes.len() < limit {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            let take = n.min(limit - bytes.len());
            bytes.extend_from_slice(&chunk[..take]);
        }
        Ok::<(), std::io::Error>(())
    };

    let outcome = timeout(read_timeout, read_all).await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) if bytes.is_empty() => return Err(ProbeError::from_io(&e)),
        Ok(Err(_)) => {}
        Err(_) if bytes.is_empty() => return Err(ProbeError::Timeout),
        Err(_) => {}
    }

    Ok(RawResponse { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn parses_status_lines() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK"), Some(200));
        assert_eq!(parse_status_line("HTTP/1.0 451 Unavailable For Legal Reasons"), Some(451));
        assert_eq!(parse_status_line("HTTP/2 403"), Some(403));
        assert_eq!(parse_status_line("SSH-2.0-OpenSSH_9.6"), None);
        assert_eq!(parse_status_line("HTTP/1.1 20 OK"), None);
        assert_eq!(parse_status_line(""), None);
    }

    #[test]
    fn splits_head_from_body() {
        let response = RawResponse { bytes: b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nhello".to_vec() };
        assert_eq!(response.status(), Some(200));
        assert_eq!(response.body(), b"hello");

        let truncated = RawResponse { bytes: b"HTTP/1.1 200 OK\r\nA: b".to_vec() };
        assert!(truncated.body().is_empty());
    }

    #[test]
    fn host_header_brackets_ipv6_and_keeps_odd_ports() {
        assert_eq!(host_header("example.org", 80), "example.org");
        assert_eq!(host_header("example.org", 8080), "example.org:8080");
        assert_eq!(host_header("::1", 80), "[::1]");
    }

    #[tokio::test]
    async fn reads_up_to_the_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let body = "x".repeat(4096);
            let response = format!("HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\n{body}");
            let _ = socket.write_all(response.as_bytes()).await;
        });

        let response =
            raw_get("127.0.0.1", "example.org", port, 512, Duration::from_secs(2), Duration::from_secs(2))
                .await
                .unwrap();
        assert_eq!(response.bytes.len(), 512);
        assert_eq!(response.status(), Some(200));
    }
}
