// src/checker/mod.rs
// =============================================================================
// This module contains all link checking logic for a single URL.
//
// Submodules:
// - probe: Makes HEAD/GET requests and builds a ProbeResult
// - classify: Decides "alive or dead" from a response or a network error
// - headers: Browser-like request headers and user-agent rotation
//
// This file (mod.rs) is the module root - it re-exports the public API so
// callers can write `checker::HttpProber` instead of `checker::probe::...`.
// =============================================================================

mod classify;
mod headers;
mod probe;

pub use classify::{
    classify, classify_error, has_edge_signature, invalid_url, LinkStatus, Verdict, EDGE_PROTECTION_REASON,
    EDGE_SERVER_SIGNATURES, EDGE_TRACE_HEADERS,
};
pub use headers::{browser_headers, UserAgentPool, DEFAULT_USER_AGENTS};
pub use probe::{HttpProber, Probe, ProbeMethod, ProbeResult};
