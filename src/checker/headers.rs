// src/checker/headers.rs
// =============================================================================
// Browser-like request headers.
//
// Plenty of sites answer 403 to anything that does not look like a browser.
// Sending a real browser user-agent plus the usual Accept headers cuts down
// on those false "dead link" results. It does not get past real bot
// protection and is not meant to.
// =============================================================================

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Round-robin pool of user-agent strings. Each prober owns one.
#[derive(Debug)]
pub struct UserAgentPool {
    agents: Vec<HeaderValue>,
    next: AtomicUsize,
}

impl UserAgentPool {
    /// Builds a pool from `agents`, dropping anything that is not a valid
    /// header value. Falls back to the built-in list if nothing is left.
    pub fn new<S: AsRef<str>>(agents: &[S]) -> Self {
        let mut valid: Vec<HeaderValue> = agents
            .iter()
            .filter_map(|ua| match HeaderValue::from_str(ua.as_ref()) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(user_agent = ua.as_ref(), "ignoring user agent that is not a valid header value");
                    None
                }
            })
            .collect();

        if valid.is_empty() {
            valid = DEFAULT_USER_AGENTS.iter().map(|ua| HeaderValue::from_static(ua)).collect();
        }

        Self {
            agents: valid,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The user agent for the next request.
    pub fn next(&self) -> HeaderValue {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        self.agents[i].clone()
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::new::<&str>(&[])
    }
}

/// The header set sent with every HEAD and GET.
pub fn browser_headers(user_agent: HeaderValue, accept_language: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, user_agent);
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    if let Ok(lang) = HeaderValue::from_str(accept_language) {
        headers.insert(ACCEPT_LANGUAGE, lang);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert("dnt", HeaderValue::from_static("1"));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    headers
}
