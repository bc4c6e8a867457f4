//! Integration tests for the interference probes
//!
//! Every probe runs against local fixtures: canned HTTP responses on
//! ephemeral ports and a TLS acceptor serving a self-signed certificate.

mod support;

use std::sync::Arc;

use reachability::censorship::CensorshipProbeKind;
use reachability::{CensorshipSuite, CensorshipTarget, ProbeTimeouts, Warning};
use support::{bind, http_response, serve, serve_http};
use tokio::io::AsyncWriteExt;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::{Certificate, PrivateKey, ServerConfig};

fn suite() -> CensorshipSuite {
    CensorshipSuite::new(ProbeTimeouts::default()).unwrap()
}

/// TLS server presenting a certificate for `other.example.com`
async fn serve_tls() -> u16 {
    let cert = rcgen::generate_simple_self_signed(vec!["other.example.com".to_string()]).unwrap();
    let chain = vec![Certificate(cert.serialize_der().unwrap())];
    let key = PrivateKey(cert.serialize_private_key_der());

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let (listener, port) = bind().await;
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut stream) = acceptor.accept(socket).await {
                    let _ = stream.shutdown().await;
                }
            });
        }
    });
    port
}

#[tokio::test]
async fn test_substituted_certificate_is_flagged() {
    let _ = tracing_subscriber::fmt::try_init();
    let port = serve_tls().await;

    let target = CensorshipTarget::new("target.example.com", port).via("127.0.0.1");
    let result = suite().certificate(&target).await;

    assert_eq!(result.kind, CensorshipProbeKind::Certificate);
    assert_eq!(result.warning, Warning::CertMismatch);
    assert!(result.is_blocking);
    let info = result.certificate.unwrap();
    assert_eq!(info.subject_alt_names, vec!["other.example.com".to_string()]);
    assert_eq!(info.fingerprint.len(), 16);
}

#[tokio::test]
async fn test_literal_ip_target_is_exempt_from_name_match() {
    let port = serve_tls().await;

    let result = suite().certificate(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.warning, Warning::None);
    assert!(!result.is_blocking);
    assert!(result.certificate.is_some());
}

#[tokio::test]
async fn test_matching_certificate_is_clean() {
    let port = serve_tls().await;

    let target = CensorshipTarget::new("other.example.com", port).via("127.0.0.1");
    let result = suite().certificate(&target).await;

    assert_eq!(result.warning, Warning::None);
}

#[tokio::test]
async fn test_fingerprint_spots_block_page() {
    let body = b"<html><h1>Access denied</h1>This resource is restricted by your provider</html>";
    let port = serve_http(http_response("200 OK", &[], body)).await;

    let result = suite().fingerprint(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.warning, Warning::Blocked);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.matched_phrase.as_deref(), Some("access denied"));
}

#[tokio::test]
async fn test_fingerprint_of_ordinary_page_is_clean() {
    let port = serve_http(http_response("200 OK", &[], b"<html>welcome home</html>")).await;

    let result = suite().fingerprint(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.warning, Warning::None);
    assert!(!result.is_blocking);
}

#[tokio::test]
async fn test_fingerprint_ignores_phrases_in_headers() {
    let response = http_response("200 OK", &[("X-Filter-Status", "filtered-none")], b"<html>welcome</html>");
    let port = serve_http(response).await;

    let result = suite().fingerprint(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.warning, Warning::None);
    assert!(!result.is_blocking);
    assert_eq!(result.status_code, Some(200));
}

#[tokio::test]
async fn test_http_client_checks_honour_connect_address() {
    let mut body = b"<html>Site blocked</html>".to_vec();
    body.resize(200, b' ');
    let port = serve_http(http_response("200 OK", &[], &body)).await;
    let target = CensorshipTarget::new("target.example.invalid", port).via("127.0.0.1");
    let suite = suite();

    let size = suite.response_size(&target).await;
    assert_eq!(size.warning, Warning::Blocked);
    assert_eq!(size.byte_count, Some(200));

    let redirect = suite.redirect_chain(&target).await;
    assert_eq!(redirect.status_code, Some(200));
    assert_eq!(redirect.redirect_chain, vec![format!("http://target.example.invalid:{port}/")]);

    let status = suite.http_status(&target).await;
    assert_eq!(status.status_code, Some(200));
    assert!(!status.is_blocking);
}

#[tokio::test]
async fn test_legal_block_status_is_blocking() {
    for (status, blocking) in [("451 Unavailable For Legal Reasons", true), ("403 Forbidden", true), ("200 OK", false)] {
        let port = serve_http(http_response(status, &[], b"")).await;

        let result = suite().http_status(&CensorshipTarget::new("127.0.0.1", port)).await;

        assert_eq!(result.is_blocking, blocking, "status {status}");
        assert!(result.status_code.is_some());
    }
}

#[tokio::test]
async fn test_short_stub_with_phrase_is_blocked() {
    let mut body = b"<html>Site blocked</html>".to_vec();
    body.resize(200, b' ');
    let port = serve_http(http_response("200 OK", &[], &body)).await;

    let result = suite().response_size(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.warning, Warning::Blocked);
    assert_eq!(result.byte_count, Some(200));
}

#[tokio::test]
async fn test_large_page_with_phrase_is_not_blocked() {
    let mut body = b"<html>Site blocked</html>".to_vec();
    body.resize(5000, b' ');
    let port = serve_http(http_response("200 OK", &[], &body)).await;

    let result = suite().response_size(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.warning, Warning::None);
    assert_eq!(result.byte_count, Some(5000));
}

#[tokio::test]
async fn test_redirect_chain_is_followed() {
    let final_port = serve_http(http_response("200 OK", &[], b"done")).await;
    let location = format!("http://127.0.0.1:{final_port}/landing");
    let port = serve_http(http_response("302 Found", &[("Location", &location)], b"")).await;

    let result = suite().redirect_chain(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.warning, Warning::None);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.redirect_chain.len(), 2);
    assert_eq!(result.redirect_target.as_deref(), Some(location.as_str()));
}

#[tokio::test]
async fn test_redirect_to_block_host_is_flagged() {
    let port = serve_http(http_response("302 Found", &[("Location", "http://blocked.invalid/stub")], b"")).await;

    let result = suite().redirect_chain(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.warning, Warning::Blocked);
    assert!(result.is_blocking);
    assert_eq!(result.redirect_chain.last().map(String::as_str), Some("http://blocked.invalid/stub"));
}

#[tokio::test]
async fn test_redirect_loop_stops_at_hop_limit() {
    let (listener, port) = bind().await;
    let location = format!("http://127.0.0.1:{port}/again");
    serve(listener, http_response("301 Moved Permanently", &[("Location", &location)], b""));

    let result = suite().redirect_chain(&CensorshipTarget::new("127.0.0.1", port)).await;

    assert_eq!(result.redirect_chain.len(), 6);
    assert!(result.detail.contains("redirect limit reached"));
    assert_eq!(result.warning, Warning::None);
}

#[tokio::test]
async fn test_comparative_timing_needs_a_baseline() {
    let port = serve_http(http_response("200 OK", &[], b"")).await;
    let suite = suite();

    let without = suite.comparative_timing(&CensorshipTarget::new("127.0.0.1", port)).await;
    assert_eq!(without.detail, "no baseline");
    assert_eq!(without.timing_ratio, None);

    // Loopback connects finish well under 10x a 50ms baseline
    let with = suite.comparative_timing(&CensorshipTarget::new("127.0.0.1", port).with_ping(Some(50))).await;
    assert_eq!(with.warning, Warning::None);
    assert!(with.timing_ratio.is_some());
}

#[tokio::test]
async fn test_full_suite_reports_every_probe() {
    let port = serve_http(http_response("200 OK", &[], b"<html>hello</html>")).await;

    let results = suite().run(&CensorshipTarget::new("127.0.0.1", port).with_ping(Some(50))).await;

    let kinds: Vec<_> = results.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CensorshipProbeKind::Fingerprint,
            CensorshipProbeKind::Certificate,
            CensorshipProbeKind::HttpStatus,
            CensorshipProbeKind::ComparativeTiming,
            CensorshipProbeKind::RedirectChain,
            CensorshipProbeKind::ResponseSize,
        ]
    );
    // Plain HTTP listener: the TLS handshake fails without a warning
    assert_eq!(results[1].warning, Warning::None);
    assert!(!reachability::censorship::is_interfered(&results));
}
