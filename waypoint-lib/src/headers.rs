//! Wire header names for route service interception
//!
//! The spelling is operator-fixed; matching is case-insensitive on the
//! wire. The signature and metadata headers always travel together.

/// Header carrying the base64 AES-GCM ciphertext of the signed payload
pub const ROUTE_SERVICE_SIGNATURE: &str = "X-CF-Proxy-Signature";

/// Header carrying the base64 JSON object with the per-message nonce
pub const ROUTE_SERVICE_METADATA: &str = "X-CF-Proxy-Metadata";

/// Header echoing the originally requested URL in plaintext so the route
/// service can act on it
pub const ROUTE_SERVICE_FORWARDED_URL: &str = "X-CF-Proxy-Forwarded-Url";

/// Application identifier header, stripped before a request is handed to a
/// route service
pub const APPLICATION_ID: &str = "X-CF-ApplicationID";
