//! Plain-HTTP fingerprint: read the first bytes of a response and look
//! for a 451 status line or block-page phrases in the body.

use super::{CensorshipProbeKind, CensorshipProbeResult, CensorshipTarget, dictionary, http};
use crate::config::ProbeTimeouts;

pub const FINGERPRINT_BYTES: usize = 512;

pub async fn probe(target: &CensorshipTarget, timeouts: &ProbeTimeouts) -> CensorshipProbeResult {
    let kind = CensorshipProbeKind::Fingerprint;
    let response = match http::raw_get(
        &target.connect_host,
        &target.host,
        target.port,
        FINGERPRINT_BYTES,
        timeouts.connect(),
        timeouts.http(),
    )
    .await
    {
        Ok(response) => response,
        Err(e) => return CensorshipProbeResult::from_error(kind, &e),
    };

    classify(&response)
}

/// Judge captured bytes
pub fn classify(response: &http::RawResponse) -> CensorshipProbeResult {
    let status = response.status();
    let phrase = dictionary::find_phrase_in_bytes(response.body());
    let base = CensorshipProbeResult::clean(CensorshipProbeKind::Fingerprint, "")
        .with_status(status)
        .with_phrase(phrase)
        .with_byte_count(response.bytes.len());

    if status == Some(451) {
        return base.blocked("HTTP 451 in response head");
    }
    if let Some(phrase) = phrase {
        return base.blocked(format!("interference phrase {phrase:?} in response body"));
    }

    let detail = match response.status_line() {
        Some(line) => format!("no interference markers, status line {line:?}"),
        None => "no interference markers, empty response".to_string(),
    };
    CensorshipProbeResult { detail, ..base }
}
