//! Redirect-chain probe: follow `Location` headers by hand and flag chains
//! that pass through a block-page host.

use reqwest::Url;
use reqwest::header::LOCATION;

use super::{CensorshipProbeKind, CensorshipProbeResult, CensorshipTarget, dictionary, http};

pub const MAX_REDIRECTS: usize = 5;

/// Judge a followed chain. `chain[0]` is the starting URL.
pub fn evaluate(chain: &[Url], status: Option<u16>, limit_reached: bool) -> CensorshipProbeResult {
    let hops = chain.len().saturating_sub(1);
    let mut result = CensorshipProbeResult::clean(CensorshipProbeKind::RedirectChain, "").with_status(status);
    result.redirect_chain = chain.iter().map(Url::to_string).collect();
    if hops > 0 {
        result.redirect_target = chain.last().map(Url::to_string);
    }

    let flagged = chain
        .iter()
        .skip(1)
        .filter_map(|url| url.host_str())
        .find_map(|host| dictionary::is_block_host(host).map(|marker| (host.to_string(), marker)));
    if let Some((host, marker)) = flagged {
        return result.blocked(format!("redirected through block page host {host} ({marker})"));
    }

    result.detail = match (hops, &result.redirect_target) {
        (0, _) | (_, None) => "no redirects".to_string(),
        (n, Some(last)) => format!("{n} redirect(s) ending at {last}"),
    };
    if limit_reached {
        result.detail.push_str(", redirect limit reached");
    }
    result
}

pub async fn probe(client: &reqwest::Client, target: &CensorshipTarget) -> CensorshipProbeResult {
    let kind = CensorshipProbeKind::RedirectChain;
    let start = match Url::parse(&target.base_url()) {
        Ok(url) => url,
        Err(e) => return CensorshipProbeResult::clean(kind, format!("probe failed: invalid url: {e}")),
    };

    let mut chain = vec![start];
    let mut status = None;
    let mut limit_reached = false;

    for hop in 0..=MAX_REDIRECTS {
        let Some(current) = chain.last().cloned() else { break };
        let response = match client.get(current.clone()).send().await {
            Ok(response) => response,
            Err(e) if hop == 0 => return CensorshipProbeResult::from_error(kind, &http::client_error(e)),
            Err(_) => break,
        };

        status = Some(response.status().as_u16());
        if !response.status().is_redirection() {
            break;
        }
        let next = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| current.join(location).ok());
        let Some(next) = next else { break };

        if hop == MAX_REDIRECTS {
            limit_reached = true;
            break;
        }
        chain.push(next);
    }

    evaluate(&chain, status, limit_reached)
}
