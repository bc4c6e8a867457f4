//! Endpoint catalog files.
//!
//! Either a bare JSON array of target strings, or an object carrying the
//! targets plus cached DNS answers used as fallback addresses:
//!
//! ```json
//! {
//!   "endpoints": ["tls://peer.example.net:17121", "sni://cdn.example.org"],
//!   "resolved": { "peer.example.net": ["192.0.2.10", "192.0.2.11"] }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use anyhow::Context;
use reachability::{EndpointDescriptor, StaticResolver};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<String>),
    Full {
        endpoints: Vec<String>,
        #[serde(default)]
        resolved: HashMap<String, Vec<IpAddr>>,
    },
}

/// Parsed endpoints, fallbacks attached
#[derive(Debug, Default)]
pub struct Catalog {
    pub endpoints: Vec<EndpointDescriptor>,
    /// Entries that did not parse
    pub rejected: usize,
}

impl Catalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing catalog {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let (targets, resolved) = match serde_json::from_str(raw)? {
            CatalogFile::List(targets) => (targets, HashMap::new()),
            CatalogFile::Full { endpoints, resolved } => (endpoints, resolved),
        };

        let mut resolver = StaticResolver::new();
        for (host, addresses) in resolved {
            resolver.insert(host, addresses);
        }

        let mut catalog = Catalog::default();
        for target in &targets {
            match EndpointDescriptor::parse(target) {
                Ok(endpoint) => catalog.endpoints.push(endpoint.resolved_with(&resolver)),
                Err(error) => {
                    warn!(%target, %error, "skipping catalog entry");
                    catalog.rejected += 1;
                }
            }
        }

        Ok(catalog)
    }
}
