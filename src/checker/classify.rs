// src/checker/classify.rs
// =============================================================================
// Turns what a server (or the network) told us into a verdict:
// "is this bookmark still alive?" plus a human-readable reason.
//
// Two entry points:
// - classify(): we got an HTTP response, look at status + headers
// - classify_error(): we got no response at all, look at the error message
//
// HTTP status codes, as we read them:
// - 200-299: Success
// - 300-399: Redirect (alive, we do not follow it)
// - 401:     Needs a login, but the page exists
// - 403/503: Dead, UNLESS an edge/CDN layer answered instead of the origin
// - other 4xx/5xx: Dead
// =============================================================================

use reqwest::header::{HeaderMap, SERVER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Every outcome a probe can end in.
///
/// Only the first four mean the site is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// 2xx
    Ok,
    /// 3xx, not followed
    Redirect,
    /// 401, the resource exists behind a login
    AuthRequired,
    /// 403/503 answered by a CDN or bot shield
    EdgeProtected,
    /// Any other 4xx
    ClientError,
    /// Any other 5xx
    ServerError,
    /// Status codes outside 200-599
    Unexpected,
    Timeout,
    DnsError,
    ConnectionRefused,
    TlsError,
    NetworkError,
    /// Not something we can send a request to
    InvalidUrl,
}

impl LinkStatus {
    pub fn is_accessible(&self) -> bool {
        matches!(
            self,
            LinkStatus::Ok | LinkStatus::Redirect | LinkStatus::AuthRequired | LinkStatus::EdgeProtected
        )
    }
}

/// The decision for one response or one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub accessible: bool,
    pub status: LinkStatus,
    pub reason: String,
}

impl Verdict {
    fn new(status: LinkStatus, reason: impl Into<String>) -> Self {
        Self {
            accessible: status.is_accessible(),
            status,
            reason: reason.into(),
        }
    }
}

pub const EDGE_PROTECTION_REASON: &str = "edge-protection, site likely alive but access-restricted";

/// Substrings of the `Server` header that identify an edge/CDN layer.
pub const EDGE_SERVER_SIGNATURES: &[&str] = &["cloudflare", "ddos-guard", "sucuri", "akamaighost"];

/// Headers that only an edge vendor adds (ray ids, trace ids).
pub const EDGE_TRACE_HEADERS: &[&str] = &["cf-ray", "x-sucuri-id", "x-iinfo"];

/// True when the response looks like it came from a CDN shield rather than
/// the origin.
pub fn has_edge_signature(headers: &HeaderMap) -> bool {
    let server_matches = headers
        .get(SERVER)
        .and_then(|v| v.to_str().ok())
        .map(|server| {
            let server = server.to_ascii_lowercase();
            EDGE_SERVER_SIGNATURES.iter().any(|sig| server.contains(sig))
        })
        .unwrap_or(false);

    server_matches || EDGE_TRACE_HEADERS.iter().any(|name| headers.contains_key(*name))
}

/// Classifies an HTTP response by status code and headers.
pub fn classify(status: StatusCode, headers: &HeaderMap) -> Verdict {
    let code = status.as_u16();

    if status.is_success() {
        return Verdict::new(LinkStatus::Ok, format!("HTTP {}", code));
    }
    if status.is_redirection() {
        return Verdict::new(LinkStatus::Redirect, format!("HTTP {} redirect (not followed)", code));
    }
    if status == StatusCode::UNAUTHORIZED {
        return Verdict::new(LinkStatus::AuthRequired, "authentication required, resource exists");
    }
    if matches!(status, StatusCode::FORBIDDEN | StatusCode::SERVICE_UNAVAILABLE) && has_edge_signature(headers) {
        return Verdict::new(LinkStatus::EdgeProtected, EDGE_PROTECTION_REASON);
    }

    let family = if status.is_client_error() {
        LinkStatus::ClientError
    } else if status.is_server_error() {
        LinkStatus::ServerError
    } else {
        LinkStatus::Unexpected
    };

    Verdict::new(family, status_reason(status))
}

// Per-status wording for dead responses.
fn status_reason(status: StatusCode) -> String {
    match status.as_u16() {
        403 => "access forbidden".to_string(),
        404 => "page not found".to_string(),
        410 => "gone, permanently removed".to_string(),
        429 => "rate limited, too many requests".to_string(),
        500 => "server error: internal server error".to_string(),
        502 => "server error: bad gateway".to_string(),
        503 => "service unavailable".to_string(),
        504 => "server error: gateway timeout".to_string(),
        code => match status.canonical_reason() {
            Some(text) => format!("HTTP {} {}", code, text),
            None => format!("HTTP {}", code),
        },
    }
}

// One row of the network error table. Rules are tried in order and the first
// whose keyword appears in the (lowercased) message wins.
struct ErrorRule {
    keywords: &'static [&'static str],
    status: LinkStatus,
    reason: &'static str,
}

const ERROR_RULES: &[ErrorRule] = &[
    ErrorRule {
        keywords: &["timeout", "timed out", "deadline has elapsed"],
        status: LinkStatus::Timeout,
        reason: "request timed out, site responding slowly",
    },
    ErrorRule {
        keywords: &[
            "dns error",
            "failed to lookup address",
            "name not resolved",
            "name or service not known",
            "no such host",
            "enotfound",
        ],
        status: LinkStatus::DnsError,
        reason: "domain name not found",
    },
    ErrorRule {
        keywords: &["connection refused", "econnrefused"],
        status: LinkStatus::ConnectionRefused,
        reason: "connection refused",
    },
    ErrorRule {
        keywords: &["certificate", "tls", "ssl", "handshake"],
        status: LinkStatus::TlsError,
        reason: "TLS/SSL certificate error",
    },
];

/// Classifies a failure where no HTTP response arrived.
///
/// This is a keyword heuristic over the error text and can misclassify; add
/// rows to `ERROR_RULES` rather than special-casing callers.
pub fn classify_error(message: &str) -> Verdict {
    let lowered = message.to_lowercase();

    ERROR_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|rule| Verdict::new(rule.status, rule.reason))
        .unwrap_or_else(|| Verdict::new(LinkStatus::NetworkError, format!("network error: {}", message)))
}

/// Verdict for a URL we refuse to send a request to.
pub fn invalid_url(detail: &str) -> Verdict {
    Verdict::new(LinkStatus::InvalidUrl, format!("invalid url: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn server(name: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SERVER, HeaderValue::from_str(name).unwrap());
        headers
    }

    #[test]
    fn test_success_and_redirect_are_alive() {
        let none = HeaderMap::new();
        assert!(classify(StatusCode::OK, &none).accessible);
        assert!(classify(StatusCode::NO_CONTENT, &none).accessible);

        let moved = classify(StatusCode::MOVED_PERMANENTLY, &none);
        assert!(moved.accessible);
        assert_eq!(moved.status, LinkStatus::Redirect);
    }

    #[test]
    fn test_not_found_is_dead() {
        let verdict = classify(StatusCode::NOT_FOUND, &HeaderMap::new());
        assert!(!verdict.accessible);
        assert!(verdict.reason.contains("not found"));
        assert_eq!(verdict.status, LinkStatus::ClientError);
    }

    #[test]
    fn test_unauthorized_is_alive() {
        let verdict = classify(StatusCode::UNAUTHORIZED, &HeaderMap::new());
        assert!(verdict.accessible);
        assert_eq!(verdict.status, LinkStatus::AuthRequired);
    }

    #[test]
    fn test_forbidden_behind_cdn_is_alive() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ray", HeaderValue::from_static("8a1b2c3d4e5f-AMS"));
        let verdict = classify(StatusCode::FORBIDDEN, &headers);
        assert!(verdict.accessible);
        assert_eq!(verdict.reason, EDGE_PROTECTION_REASON);

        let verdict = classify(StatusCode::FORBIDDEN, &server("cloudflare"));
        assert!(verdict.accessible);
    }

    #[test]
    fn test_plain_forbidden_is_dead() {
        let verdict = classify(StatusCode::FORBIDDEN, &server("nginx/1.25"));
        assert!(!verdict.accessible);
        assert_eq!(verdict.reason, "access forbidden");
    }

    #[test]
    fn test_unavailable_behind_cdn_is_alive() {
        let verdict = classify(StatusCode::SERVICE_UNAVAILABLE, &server("Cloudflare"));
        assert!(verdict.accessible);
        assert_eq!(verdict.status, LinkStatus::EdgeProtected);

        let bare = classify(StatusCode::SERVICE_UNAVAILABLE, &HeaderMap::new());
        assert!(!bare.accessible);
        assert_eq!(bare.status, LinkStatus::ServerError);
    }

    #[test]
    fn test_edge_signature_ignored_for_other_statuses() {
        let verdict = classify(StatusCode::NOT_FOUND, &server("cloudflare"));
        assert!(!verdict.accessible);
    }

    #[test]
    fn test_status_reasons() {
        let none = HeaderMap::new();
        assert!(classify(StatusCode::GONE, &none).reason.contains("gone"));
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, &none).reason.contains("rate limited"));
        for code in [500u16, 502, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(classify(status, &none).reason.contains("server error"));
        }
        assert_eq!(classify(StatusCode::IM_A_TEAPOT, &none).reason, "HTTP 418 I'm a teapot");
    }

    #[test]
    fn test_classify_error_keywords() {
        assert_eq!(classify_error("operation timed out").status, LinkStatus::Timeout);
        assert_eq!(
            classify_error("error sending request: dns error: failed to lookup address information").status,
            LinkStatus::DnsError
        );
        assert_eq!(
            classify_error("tcp connect error: Connection refused (os error 111)").status,
            LinkStatus::ConnectionRefused
        );
        assert_eq!(classify_error("invalid peer certificate: UnknownIssuer").status, LinkStatus::TlsError);

        let generic = classify_error("connection reset by peer");
        assert_eq!(generic.status, LinkStatus::NetworkError);
        assert!(!generic.accessible);
        assert!(generic.reason.contains("connection reset by peer"));
    }

    #[test]
    fn test_tls_rule_needs_a_whole_keyword() {
        // "cert" inside an unrelated word must not look like a TLS failure.
        let verdict = classify_error("upstream closed while streaming concert listings");
        assert_eq!(verdict.status, LinkStatus::NetworkError);

        assert_eq!(classify_error("certificate has expired").status, LinkStatus::TlsError);
    }
}
