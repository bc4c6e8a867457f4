//! Certificate probe: handshake presenting the target name and check that
//! the leaf certificate actually covers it. A substituted certificate is
//! the signature of TLS-intercepting middleboxes.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use super::{CensorshipProbeKind, CensorshipProbeResult, CensorshipTarget, Warning};
use crate::error::ProbeError;
use crate::probe::TlsSniProbe;

/// Hex characters kept from the SHA-256 fingerprint
pub const FINGERPRINT_HEX_LEN: usize = 16;

/// Identity fields of a leaf certificate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub common_name: Option<String>,
    pub subject_alt_names: Vec<String>,
    pub issuer: Option<String>,
    /// Truncated SHA-256 over the DER encoding
    pub fingerprint: String,
}

impl CertificateInfo {
    pub fn from_der(der: &[u8]) -> Result<Self, ProbeError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ProbeError::Tls(format!("unparseable certificate: {e}")))?;

        let common_name = first_common_name(cert.subject());
        let issuer = first_common_name(cert.issuer()).or_else(|| Some(cert.issuer().to_string()));

        let mut subject_alt_names = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => subject_alt_names.push(dns.to_string()),
                        GeneralName::IPAddress(raw) => {
                            if let Some(ip) = ip_from_bytes(raw) {
                                subject_alt_names.push(ip.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        let mut fingerprint = hex::encode(Sha256::digest(der));
        fingerprint.truncate(FINGERPRINT_HEX_LEN);

        Ok(Self { common_name, subject_alt_names, issuer, fingerprint })
    }

    /// Whether the certificate names `host`, through a SAN or the CN
    pub fn covers(&self, host: &str) -> bool {
        if self.subject_alt_names.iter().any(|name| hostname_matches(host, name)) {
            return true;
        }
        self.common_name.as_deref().is_some_and(|cn| hostname_matches(host, cn))
    }
}

fn first_common_name(name: &X509Name<'_>) -> Option<String> {
    name.iter_common_name().next().and_then(|cn| cn.as_str().ok()).map(str::to_string)
}

fn ip_from_bytes(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => <[u8; 4]>::try_from(raw).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(raw).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Case-insensitive name match; `*.` matches exactly one leftmost label
pub fn hostname_matches(host: &str, pattern: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(suffix) => match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        },
        None => host == pattern,
    }
}

/// Judge a presented leaf against the name that was asked for
pub fn evaluate(host: &str, info: CertificateInfo) -> CensorshipProbeResult {
    let base = CensorshipProbeResult::clean(CensorshipProbeKind::Certificate, "");
    let issuer = info.issuer.clone().unwrap_or_else(|| "unknown issuer".to_string());

    let result = if host.trim_matches(['[', ']']).parse::<IpAddr>().is_ok() {
        CensorshipProbeResult {
            detail: format!("literal IP target, name check skipped (issuer {issuer})"),
            ..base
        }
    } else if info.covers(host) {
        CensorshipProbeResult { detail: format!("certificate covers {host} (issuer {issuer})"), ..base }
    } else {
        let presented = info
            .common_name
            .clone()
            .or_else(|| info.subject_alt_names.first().cloned())
            .unwrap_or_else(|| "no name".to_string());
        base.flagged(
            Warning::CertMismatch,
            format!("certificate for {presented} presented for {host} (issuer {issuer})"),
        )
    };

    CensorshipProbeResult { certificate: Some(info), ..result }
}

pub async fn probe(tls: &TlsSniProbe, target: &CensorshipTarget) -> CensorshipProbeResult {
    let kind = CensorshipProbeKind::Certificate;
    let handshake = match tls.handshake(&target.connect_host, &target.host, target.port).await {
        Ok(handshake) => handshake,
        Err(e) => return CensorshipProbeResult::from_error(kind, &e),
    };

    let Some(leaf) = handshake.peer_certificates.first() else {
        return CensorshipProbeResult::clean(kind, "no certificate presented");
    };

    match CertificateInfo::from_der(&leaf.0) {
        Ok(info) => evaluate(&target.host, info),
        Err(e) => CensorshipProbeResult::from_error(kind, &e),
    }
}
