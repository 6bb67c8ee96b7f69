// src/checker/probe.rs
// =============================================================================
// This module checks if a single URL is alive by making HTTP requests.
//
// Key functionality:
// - Makes an HTTP HEAD request first (lightweight, no body download)
// - Falls back to GET if HEAD fails, times out, or returns an error status
//   (plenty of servers answer HEAD with 405 or 404 but serve GET just fine)
// - Each attempt has its own deadline: short for HEAD, longer for GET
// - Never returns an error: every failure ends up inside the ProbeResult
//
// Rust concepts:
// - async/await: For network I/O that does not block other probes
// - tokio::time::timeout: Wraps a future with a deadline; when it elapses
//   the request future is dropped, which cancels the request
// - Traits: `Probe` lets the batch runner work with fakes in tests
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::classify::{self, LinkStatus, Verdict};
use super::headers::{browser_headers, UserAgentPool};
use crate::clock::Clock;
use crate::config::ProbeConfig;

/// Which request produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    Head,
    Get,
    /// Neither request got an HTTP response.
    Failed,
}

/// The outcome of probing one URL.
///
/// `accessible` is always decided. A `status_code` of 0 means no HTTP
/// response arrived, and such a result is never accessible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The URL exactly as it was handed to the prober
    pub url: String,
    /// The final yes/no: is the bookmark still worth keeping?
    pub accessible: bool,
    /// HTTP status code, or 0 if the server never answered
    pub status_code: u16,
    /// Canonical reason phrase ("Not Found"), or "Network Error"
    pub status_text: String,
    /// Whether HEAD was enough, GET was needed, or both failed
    pub method: ProbeMethod,
    /// The finer-grained category behind `accessible`
    pub status: LinkStatus,
    /// Why the link counts as dead. None when accessible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    /// A result built from an HTTP response.
    pub fn from_response(
        url: &str,
        status: StatusCode,
        method: ProbeMethod,
        verdict: Verdict,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.to_string(),
            accessible: verdict.accessible,
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            method,
            status: verdict.status,
            error: if verdict.accessible { None } else { Some(verdict.reason) },
            checked_at,
        }
    }

    /// A result for a URL that never produced an HTTP response.
    pub fn network_failure(url: &str, verdict: Verdict, checked_at: DateTime<Utc>) -> Self {
        Self {
            url: url.to_string(),
            accessible: false,
            status_code: 0,
            status_text: "Network Error".to_string(),
            method: ProbeMethod::Failed,
            status: verdict.status,
            error: Some(verdict.reason),
            checked_at,
        }
    }

    /// `"404 Not Found"`-style summary used in previews and ledger rows.
    pub fn describe(&self) -> String {
        format!("{} {}", self.status_code, self.status_text)
    }
}

/// Anything that can tell us whether a URL is alive.
///
/// Implementations must not fail: every problem is reported through the
/// returned [`ProbeResult`].
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

// What one HEAD or GET attempt produced.
enum Attempt {
    Response { status: StatusCode, headers: HeaderMap },
    Failed(String),
}

/// The real prober: reqwest with a two-tier HEAD/GET deadline.
pub struct HttpProber {
    client: Client,
    config: ProbeConfig,
    agents: UserAgentPool,
    clock: Arc<dyn Clock>,
}

impl HttpProber {
    pub fn new(config: ProbeConfig, clock: Arc<dyn Clock>) -> Result<Self, reqwest::Error> {
        // One client for every probe (connection pooling). Redirects are not
        // followed: a 3xx already counts as alive.
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let agents = UserAgentPool::new(&config.user_agents);

        Ok(Self {
            client,
            config,
            agents,
            clock,
        })
    }

    /// Probes `url`, giving the GET fallback `timeout`. The HEAD attempt uses
    /// the configured HEAD timeout, capped at `timeout`.
    pub async fn probe_with_timeout(&self, url: &str, timeout: Duration) -> ProbeResult {
        let target = match parse_target(url) {
            Ok(target) => target,
            Err(detail) => {
                debug!(url, detail = detail.as_str(), "refusing to probe invalid url");
                return ProbeResult::network_failure(url, classify::invalid_url(&detail), self.clock.now());
            }
        };

        let head_timeout = self.config.head_timeout().min(timeout);

        match self.attempt(Method::HEAD, &target, head_timeout).await {
            Attempt::Response { status, headers } if status.is_success() || status.is_redirection() => {
                let verdict = classify::classify(status, &headers);
                return ProbeResult::from_response(url, status, ProbeMethod::Head, verdict, self.clock.now());
            }
            Attempt::Response { status, .. } => {
                debug!(url, status = status.as_u16(), "HEAD returned an error status, retrying with GET");
            }
            Attempt::Failed(message) => {
                debug!(url, error = message.as_str(), "HEAD failed, retrying with GET");
            }
        }

        match self.attempt(Method::GET, &target, timeout).await {
            Attempt::Response { status, headers } => {
                let verdict = classify::classify(status, &headers);
                ProbeResult::from_response(url, status, ProbeMethod::Get, verdict, self.clock.now())
            }
            Attempt::Failed(message) => {
                let verdict = classify::classify_error(&message);
                debug!(url, error = message.as_str(), reason = verdict.reason.as_str(), "GET failed");
                ProbeResult::network_failure(url, verdict, self.clock.now())
            }
        }
    }

    // Sends one request under its own deadline.
    async fn attempt(&self, method: Method, target: &Url, limit: Duration) -> Attempt {
        let headers = browser_headers(self.agents.next(), &self.config.accept_language);
        let request = self.client.request(method.clone(), target.clone()).headers(headers);

        match tokio::time::timeout(limit, request.send()).await {
            Ok(Ok(response)) => Attempt::Response {
                status: response.status(),
                headers: response.headers().clone(),
            },
            Ok(Err(err)) => Attempt::Failed(describe_error(err)),
            Err(_) => Attempt::Failed(format!("{} request timeout after {}ms", method, limit.as_millis())),
        }
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        self.probe_with_timeout(url, self.config.get_timeout()).await
    }
}

// Only absolute http(s) URLs are probed.
fn parse_target(url: &str) -> Result<Url, String> {
    let parsed = Url::parse(url.trim()).map_err(|e| e.to_string())?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

// Flattens a reqwest error and its causes into one line. The URL is dropped
// first so a hostname like "timeout.example" can't sway classification.
fn describe_error(err: reqwest::Error) -> String {
    let timed_out = err.is_timeout();
    let err = err.without_url();

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    if timed_out && !message.to_lowercase().contains("timed out") {
        message.push_str(": timed out");
    }
    message
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why HEAD first?
//    - HEAD asks for headers only, so no page body is downloaded
//    - When HEAD says 2xx/3xx we are done after one cheap request
//
// 2. Why fall back to GET on error statuses too?
//    - Some servers reject HEAD (405) or answer it wrongly (404, 403)
//    - GET is what a browser would send, so its answer is the one we trust
//
// 3. Why tokio::time::timeout instead of a client-wide timeout?
//    - HEAD and GET need different deadlines
//    - Dropping the timed-out future cancels the in-flight request
// -----------------------------------------------------------------------------
