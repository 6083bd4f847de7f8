//! HTTP utilities for request identity
//!
//! The forwarded URL recorded inside a signature must reproduce the
//! original request byte-for-byte, so these helpers operate on the raw
//! request-target string instead of a parsed-and-reformatted URL.

use http::header::HOST;
use http::Request;

/// Reconstruct the externally visible URL for a request.
///
/// `raw_target` is the request-target exactly as the client sent it;
/// percent-encoding and reserved characters pass through untouched. An
/// absolute-form target is returned as-is.
pub fn reconstruct_forwarded_url(scheme: &str, host: &str, raw_target: &str) -> String {
    if raw_target.starts_with("http://") || raw_target.starts_with("https://") {
        return raw_target.to_string();
    }
    format!("{scheme}://{host}{raw_target}")
}

/// The request's host: the `Host` header when present, the URI authority
/// otherwise.
pub fn host_of<B>(request: &Request<B>) -> Option<String> {
    if let Some(value) = request.headers().get(HOST) {
        if let Ok(host) = value.to_str() {
            let host = host.trim();
            if !host.is_empty() {
                return Some(host.to_string());
            }
        }
    }
    request
        .uri()
        .authority()
        .map(|authority| authority.as_str().to_string())
}
