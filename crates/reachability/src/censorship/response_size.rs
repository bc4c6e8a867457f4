//! Response-size probe: block pages are short. A small body carrying a
//! block-page phrase is treated as interference.

use super::{CensorshipProbeKind, CensorshipProbeResult, CensorshipTarget, dictionary, http};

/// Body bytes read at most
pub const MAX_BODY_BYTES: usize = 10 * 1024;
/// Bodies below this size are inspected for phrases
pub const SMALL_BODY_BYTES: usize = 500;

pub fn classify_body(body: &[u8]) -> CensorshipProbeResult {
    let size = body.len();
    let base = CensorshipProbeResult::clean(CensorshipProbeKind::ResponseSize, "").with_byte_count(size);

    if size < SMALL_BODY_BYTES {
        if let Some(phrase) = dictionary::find_phrase_in_bytes(body) {
            return base
                .with_phrase(Some(phrase))
                .blocked(format!("{size} byte body containing {phrase:?}"));
        }
        return CensorshipProbeResult { detail: format!("small {size} byte body, no block phrases"), ..base };
    }

    let detail = if size >= MAX_BODY_BYTES {
        format!("body of at least {size} bytes")
    } else {
        format!("{size} byte body")
    };
    CensorshipProbeResult { detail, ..base }
}

pub async fn probe(client: &reqwest::Client, target: &CensorshipTarget) -> CensorshipProbeResult {
    let kind = CensorshipProbeKind::ResponseSize;
    let mut response = match client.get(target.base_url()).send().await {
        Ok(response) => response,
        Err(e) => return CensorshipProbeResult::from_error(kind, &http::client_error(e)),
    };
    let status = response.status().as_u16();

    let mut body = Vec::new();
    while body.len() < MAX_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(MAX_BODY_BYTES - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) if body.is_empty() => {
                return CensorshipProbeResult::from_error(kind, &http::client_error(e));
            }
            Err(_) => break,
        }
    }

    classify_body(&body).with_status(Some(status))
}
