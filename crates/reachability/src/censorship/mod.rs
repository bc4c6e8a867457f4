//! Active interference probes.
//!
//! Each probe inspects content rather than timing alone, to tell "host
//! down" apart from "traffic interfered with". Results are advisory: they
//! annotate a target for display and never change its reachability.

pub mod certificate;
pub mod dictionary;
pub mod fingerprint;
pub mod http;
pub mod http_status;
pub mod redirect;
pub mod response_size;
pub mod timing;

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use certificate::CertificateInfo;

use crate::config::ProbeTimeouts;
use crate::error::ProbeError;
use crate::probe::{TlsSniProbe, tcp};

/// Which interference probe produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CensorshipProbeKind {
    Fingerprint,
    Certificate,
    HttpStatus,
    ComparativeTiming,
    RedirectChain,
    ResponseSize,
}

impl fmt::Display for CensorshipProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CensorshipProbeKind::Fingerprint => "fingerprint",
            CensorshipProbeKind::Certificate => "certificate",
            CensorshipProbeKind::HttpStatus => "http-status",
            CensorshipProbeKind::ComparativeTiming => "comparative-timing",
            CensorshipProbeKind::RedirectChain => "redirect-chain",
            CensorshipProbeKind::ResponseSize => "response-size",
        };
        f.write_str(name)
    }
}

/// Interference classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Warning {
    #[default]
    None,
    Blocked,
    CertMismatch,
    Anomaly,
    Timeout,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Warning::None => "none",
            Warning::Blocked => "blocked",
            Warning::CertMismatch => "cert-mismatch",
            Warning::Anomaly => "anomaly",
            Warning::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Outcome of one interference probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensorshipProbeResult {
    pub kind: CensorshipProbeKind,
    pub warning: Warning,
    pub detail: String,
    pub is_blocking: bool,
    pub status_code: Option<u16>,
    pub redirect_target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_chain: Vec<String>,
    pub byte_count: Option<usize>,
    pub matched_phrase: Option<String>,
    pub certificate: Option<CertificateInfo>,
    pub timing_ratio: Option<f64>,
}

impl CensorshipProbeResult {
    /// Result with no warning
    pub fn clean(kind: CensorshipProbeKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            warning: Warning::None,
            detail: detail.into(),
            is_blocking: false,
            status_code: None,
            redirect_target: None,
            redirect_chain: Vec::new(),
            byte_count: None,
            matched_phrase: None,
            certificate: None,
            timing_ratio: None,
        }
    }

    /// Probe that could not complete. Only a timeout carries a warning.
    pub fn from_error(kind: CensorshipProbeKind, err: &ProbeError) -> Self {
        let mut result = Self::clean(kind, format!("probe failed: {err}"));
        if err.is_timeout() {
            result.warning = Warning::Timeout;
        }
        result
    }

    pub fn blocked(mut self, detail: impl Into<String>) -> Self {
        self.warning = Warning::Blocked;
        self.is_blocking = true;
        self.detail = detail.into();
        self
    }

    pub fn flagged(mut self, warning: Warning, detail: impl Into<String>) -> Self {
        self.warning = warning;
        self.is_blocking = true;
        self.detail = detail.into();
        self
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status_code = status;
        self
    }

    pub fn with_phrase(mut self, phrase: Option<&str>) -> Self {
        self.matched_phrase = phrase.map(str::to_string);
        self
    }

    pub fn with_byte_count(mut self, count: usize) -> Self {
        self.byte_count = Some(count);
        self
    }
}

/// Host under test for the interference suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensorshipTarget {
    /// Name used for SNI, the Host header and certificate matching
    pub host: String,
    /// Address actually connected to; usually the same as `host`
    pub connect_host: String,
    pub port: u16,
    /// Previously measured ICMP latency, the comparative-timing baseline
    pub ping_ms: Option<u64>,
}

impl CensorshipTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self { connect_host: host.clone(), host, port, ping_ms: None }
    }

    /// Connect somewhere else while still presenting `host`. HTTP requests
    /// keep `host` in the URL and Host header but are sent to this address.
    pub fn via(mut self, connect_host: impl Into<String>) -> Self {
        self.connect_host = connect_host.into();
        self
    }

    pub fn with_ping(mut self, ping_ms: Option<u64>) -> Self {
        self.ping_ms = ping_ms;
        self
    }

    /// `http://host[:port]/`, or `https://` on port 443. A literal-IP host
    /// names nothing to present, so the URL carries the connect address.
    pub fn base_url(&self) -> String {
        let host = if self.host.parse::<IpAddr>().is_ok() { &self.connect_host } else { &self.host };
        let host = if host.contains(':') { format!("[{host}]") } else { host.clone() };
        match self.port {
            443 => format!("https://{host}/"),
            80 => format!("http://{host}/"),
            port => format!("http://{host}:{port}/"),
        }
    }
}

/// Runs every interference probe against one target
pub struct CensorshipSuite {
    timeouts: ProbeTimeouts,
    tls: TlsSniProbe,
    http: reqwest::Client,
}

impl CensorshipSuite {
    pub fn new(timeouts: ProbeTimeouts) -> Result<Self, ProbeError> {
        let http = client_builder(&timeouts).build().map_err(|e| ProbeError::Http(e.to_string()))?;
        Ok(Self { timeouts, tls: TlsSniProbe::new(timeouts.connect(), timeouts.tls()), http })
    }

    /// Client that sends requests for `target.host` to `target.connect_host`
    async fn client_for(&self, target: &CensorshipTarget) -> Result<reqwest::Client, ProbeError> {
        if target.connect_host == target.host || target.host.parse::<IpAddr>().is_ok() {
            return Ok(self.http.clone());
        }

        let addr = tcp::resolve(&target.connect_host, target.port, self.timeouts.connect()).await?;
        client_builder(&self.timeouts)
            .resolve(&target.host, addr)
            .build()
            .map_err(|e| ProbeError::Http(e.to_string()))
    }

    pub async fn fingerprint(&self, target: &CensorshipTarget) -> CensorshipProbeResult {
        fingerprint::probe(target, &self.timeouts).await
    }

    pub async fn certificate(&self, target: &CensorshipTarget) -> CensorshipProbeResult {
        certificate::probe(&self.tls, target).await
    }

    pub async fn http_status(&self, target: &CensorshipTarget) -> CensorshipProbeResult {
        match self.client_for(target).await {
            Ok(client) => http_status::probe(&client, target, &self.timeouts).await,
            Err(e) => CensorshipProbeResult::from_error(CensorshipProbeKind::HttpStatus, &e),
        }
    }

    pub async fn comparative_timing(&self, target: &CensorshipTarget) -> CensorshipProbeResult {
        timing::probe(target, self.timeouts.connect()).await
    }

    pub async fn redirect_chain(&self, target: &CensorshipTarget) -> CensorshipProbeResult {
        match self.client_for(target).await {
            Ok(client) => redirect::probe(&client, target).await,
            Err(e) => CensorshipProbeResult::from_error(CensorshipProbeKind::RedirectChain, &e),
        }
    }

    pub async fn response_size(&self, target: &CensorshipTarget) -> CensorshipProbeResult {
        match self.client_for(target).await {
            Ok(client) => response_size::probe(&client, target).await,
            Err(e) => CensorshipProbeResult::from_error(CensorshipProbeKind::ResponseSize, &e),
        }
    }

    /// All six probes, concurrently, in a fixed result order
    pub async fn run(&self, target: &CensorshipTarget) -> Vec<CensorshipProbeResult> {
        let (fingerprint, certificate, status, timing, redirect, size) = futures::join!(
            self.fingerprint(target),
            self.certificate(target),
            self.http_status(target),
            self.comparative_timing(target),
            self.redirect_chain(target),
            self.response_size(target),
        );

        let results = vec![fingerprint, certificate, status, timing, redirect, size];
        debug!(
            host = %target.host,
            port = target.port,
            blocking = results.iter().filter(|r| r.is_blocking).count(),
            "interference probes finished"
        );
        results
    }
}

fn client_builder(timeouts: &ProbeTimeouts) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .timeout(timeouts.http())
        .connect_timeout(timeouts.connect())
        .user_agent(http::USER_AGENT)
}

/// Whether any result in a batch signals interference
pub fn is_interfered(results: &[CensorshipProbeResult]) -> bool {
    results.iter().any(|r| r.is_blocking)
}
