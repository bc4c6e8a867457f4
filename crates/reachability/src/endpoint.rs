//! Endpoint descriptors and structured target addresses.
//!
//! A descriptor is built once by the catalog side and never mutated by
//! the engine. Fallback targets are derived by rebuilding the structured
//! address with a literal IP as host, never by patching the raw string.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::EndpointError;

/// Maximum number of alternate addresses kept per endpoint
pub const MAX_ALTERNATES: usize = 5;

/// How a target accepts connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolClass {
    OverlayTcp,
    OverlayTls,
    OverlayQuic,
    OverlayWs,
    OverlayWss,
    GenericTcp,
    GenericTls,
    GenericSni,
}

impl ProtocolClass {
    pub fn from_scheme(scheme: &str) -> Result<Self, EndpointError> {
        match scheme.to_lowercase().as_str() {
            "tcp" => Ok(ProtocolClass::OverlayTcp),
            "tls" => Ok(ProtocolClass::OverlayTls),
            "quic" => Ok(ProtocolClass::OverlayQuic),
            "ws" => Ok(ProtocolClass::OverlayWs),
            "wss" => Ok(ProtocolClass::OverlayWss),
            "http" => Ok(ProtocolClass::GenericTcp),
            "https" => Ok(ProtocolClass::GenericTls),
            "sni" => Ok(ProtocolClass::GenericSni),
            other => Err(EndpointError::UnknownScheme(other.to_string())),
        }
    }

    pub fn is_overlay(&self) -> bool {
        matches!(
            self,
            ProtocolClass::OverlayTcp
                | ProtocolClass::OverlayTls
                | ProtocolClass::OverlayQuic
                | ProtocolClass::OverlayWs
                | ProtocolClass::OverlayWss
        )
    }

    /// Whether a connection of this class completes a TLS handshake
    pub fn uses_tls(&self) -> bool {
        matches!(
            self,
            ProtocolClass::OverlayTls
                | ProtocolClass::OverlayWss
                | ProtocolClass::GenericTls
                | ProtocolClass::GenericSni
        )
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            ProtocolClass::OverlayWs | ProtocolClass::GenericTcp => Some(80),
            ProtocolClass::OverlayWss | ProtocolClass::GenericTls | ProtocolClass::GenericSni => {
                Some(443)
            }
            ProtocolClass::OverlayTcp | ProtocolClass::OverlayTls | ProtocolClass::OverlayQuic => {
                None
            }
        }
    }
}

impl fmt::Display for ProtocolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolClass::OverlayTcp => "overlay-tcp",
            ProtocolClass::OverlayTls => "overlay-tls",
            ProtocolClass::OverlayQuic => "overlay-quic",
            ProtocolClass::OverlayWs => "overlay-ws",
            ProtocolClass::OverlayWss => "overlay-wss",
            ProtocolClass::GenericTcp => "generic-tcp",
            ProtocolClass::GenericTls => "generic-tls",
            ProtocolClass::GenericSni => "generic-sni",
        };
        f.write_str(name)
    }
}

/// Structured form of a URL-like target string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetAddress {
    pub scheme: String,
    /// Hostname or literal IP; IPv6 is stored without brackets
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
}

impl TargetAddress {
    /// Parse `scheme://host[:port][/path][?query]`. A string without a
    /// scheme is read as an SNI host.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let trimmed = raw.trim();
        let with_scheme =
            if trimmed.contains("://") { trimmed.to_string() } else { format!("sni://{trimmed}") };

        let url = Url::parse(&with_scheme).map_err(|e| EndpointError::Invalid {
            target: raw.to_string(),
            reason: e.to_string(),
        })?;

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => {
                return Err(EndpointError::Invalid {
                    target: raw.to_string(),
                    reason: "missing host".to_string(),
                });
            }
        };

        Ok(Self {
            scheme: url.scheme().to_lowercase(),
            host,
            port: url.port(),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
        })
    }

    /// Same target with the host replaced by a literal IP
    pub fn with_host(&self, ip: IpAddr) -> Self {
        Self { host: ip.to_string(), ..self.clone() }
    }

    pub fn host_is_ip(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if self.path != "/" {
            f.write_str(&self.path)?;
        }
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

/// Immutable description of one checkable target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    raw: String,
    target: TargetAddress,
    class: ProtocolClass,
    port: u16,
    alternates: Vec<IpAddr>,
}

impl EndpointDescriptor {
    /// Build a descriptor from the catalog's raw target string
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let target = TargetAddress::parse(raw)?;
        let class = ProtocolClass::from_scheme(&target.scheme)?;
        let port = target
            .port
            .or_else(|| class.default_port())
            .ok_or_else(|| EndpointError::MissingPort(raw.to_string()))?;

        Ok(Self { raw: raw.trim().to_string(), target, class, port, alternates: Vec::new() })
    }

    /// Attach alternate addresses, keeping list order. Duplicates and the
    /// primary host itself are dropped, and at most [`MAX_ALTERNATES`] stay.
    pub fn with_alternates(mut self, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        let primary = self.target.host.parse::<IpAddr>().ok();
        let mut alternates: Vec<IpAddr> = Vec::with_capacity(MAX_ALTERNATES);
        for ip in addresses {
            if Some(ip) == primary || alternates.contains(&ip) {
                continue;
            }
            alternates.push(ip);
            if alternates.len() == MAX_ALTERNATES {
                break;
            }
        }
        self.alternates = alternates;
        self
    }

    /// Attach whatever alternates the resolver knows for this endpoint
    pub fn resolved_with(self, resolver: &dyn AddressResolver) -> Self {
        let addresses = resolver.alternates(&self);
        self.with_alternates(addresses)
    }

    /// Key of this endpoint in the result table
    pub fn key(&self) -> &str {
        &self.raw
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Hostname or literal IP of the primary target
    pub fn address(&self) -> &str {
        &self.target.host
    }

    /// Effective port (explicit, or the protocol default)
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol_class(&self) -> ProtocolClass {
        self.class
    }

    pub fn target(&self) -> &TargetAddress {
        &self.target
    }

    pub fn alternates(&self) -> &[IpAddr] {
        &self.alternates
    }

    /// Target string for a fallback address
    pub fn fallback_target(&self, ip: IpAddr) -> TargetAddress {
        self.target.with_host(ip)
    }
}

/// Supplies alternate IPs for an endpoint
///
/// Resolution itself happens outside the engine; implementations hand
/// back cached results.
pub trait AddressResolver: Send + Sync {
    fn alternates(&self, endpoint: &EndpointDescriptor) -> Vec<IpAddr>;
}

/// Resolver backed by a hostname -> addresses map
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, host: impl Into<String>, addresses: Vec<IpAddr>) {
        self.entries.insert(host.into().to_lowercase(), addresses);
    }
}

impl AddressResolver for StaticResolver {
    fn alternates(&self, endpoint: &EndpointDescriptor) -> Vec<IpAddr> {
        self.entries.get(&endpoint.address().to_lowercase()).cloned().unwrap_or_default()
    }
}
