//! Status-code probe: 403 and 451 from a reachable host are treated as
//! blocking. Port 443 goes through an HTTPS client, any other port through
//! a raw GET so injected replies are seen unmodified.

use super::fingerprint::FINGERPRINT_BYTES;
use super::{CensorshipProbeKind, CensorshipProbeResult, CensorshipTarget, http};
use crate::config::ProbeTimeouts;
use crate::error::ProbeError;

/// Status codes that signal a deliberate refusal
pub const BLOCKING_STATUSES: [u16; 2] = [403, 451];

pub fn classify(status: u16) -> CensorshipProbeResult {
    let base = CensorshipProbeResult::clean(CensorshipProbeKind::HttpStatus, format!("HTTP {status}"))
        .with_status(Some(status));
    if BLOCKING_STATUSES.contains(&status) {
        base.blocked(format!("HTTP {status} from reachable host"))
    } else {
        base
    }
}

async fn fetch_status(
    client: &reqwest::Client,
    target: &CensorshipTarget,
    timeouts: &ProbeTimeouts,
) -> Result<Option<u16>, ProbeError> {
    if target.port == 443 {
        let response = client
            .get(target.base_url())
            .send()
            .await
            .map_err(http::client_error)?;
        return Ok(Some(response.status().as_u16()));
    }

    let response = http::raw_get(
        &target.connect_host,
        &target.host,
        target.port,
        FINGERPRINT_BYTES,
        timeouts.connect(),
        timeouts.http(),
    )
    .await?;
    Ok(response.status())
}

pub async fn probe(
    client: &reqwest::Client,
    target: &CensorshipTarget,
    timeouts: &ProbeTimeouts,
) -> CensorshipProbeResult {
    match fetch_status(client, target, timeouts).await {
        Ok(Some(status)) => classify(status),
        Ok(None) => CensorshipProbeResult::clean(CensorshipProbeKind::HttpStatus, "no HTTP status line"),
        Err(e) => CensorshipProbeResult::from_error(CensorshipProbeKind::HttpStatus, &e),
    }
}
