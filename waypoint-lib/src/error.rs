//! Error types for Waypoint
//!
//! Provides a unified error type covering signature validation, route
//! service dispatch, and outbound forwarding, plus the mapping from each
//! failure kind to the HTTP response the proxy returns to the client.

use http::StatusCode;
use thiserror::Error;

/// Result type alias using WaypointError
pub type Result<T> = std::result::Result<T, WaypointError>;

/// Comprehensive error type for all route service interception operations
#[derive(Error, Debug)]
pub enum WaypointError {
    /// The envelope failed GCM verification under every configured key, or
    /// the signature/metadata headers were malformed. Parse and
    /// authentication failures are deliberately indistinguishable.
    #[error("route service signature authentication failed")]
    AuthenticationFailed,

    /// The decrypted signature is older than the expiry window (or grossly
    /// future-dated).
    #[error("route service request expired")]
    RouteServiceExpired,

    /// `X-CF-Proxy-Forwarded-Url` was absent or not byte-equal to the
    /// signed URL.
    #[error("route service forwarded url mismatch")]
    ForwardedUrlMismatch,

    /// The matched route requires a route service but support is switched
    /// off in the configuration.
    #[error("route service support is disabled")]
    RouteServiceDisabled,

    /// Transport-level failure reaching the route service or backend.
    #[error("upstream unreachable: {0}")]
    RouteServiceUnreachable(String),

    /// The configured route service URL could not be parsed.
    #[error("invalid route service url: {0}")]
    BadRouteServiceUrl(String),

    /// No route registered for the requested host/path.
    #[error("requested route does not exist: {0}")]
    RouteNotFound(String),

    /// The route matched and the signature validated, but no backend
    /// instance is registered to receive the request.
    #[error("no backend registered for route: {0}")]
    BackendUnavailable(String),

    /// Crypto key of the wrong length at construction
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// IO errors (file operations, network)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP protocol errors (URI construction, header values)
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// Generic errors with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WaypointError {
    /// Create an unreachable-upstream error with context
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::RouteServiceUnreachable(msg.into())
    }

    /// Create a bad route service URL error with context
    pub fn bad_route_service_url(msg: impl Into<String>) -> Self {
        Self::BadRouteServiceUrl(msg.into())
    }

    /// Create a route-not-found error for a host
    pub fn route_not_found(host: impl Into<String>) -> Self {
        Self::RouteNotFound(host.into())
    }

    /// Create a backend-unavailable error for a host
    pub fn backend_unavailable(host: impl Into<String>) -> Self {
        Self::BackendUnavailable(host.into())
    }

    /// HTTP status returned to the client for this failure
    pub fn response_status(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailed
            | Self::RouteServiceExpired
            | Self::ForwardedUrlMismatch => StatusCode::BAD_REQUEST,
            Self::RouteServiceDisabled
            | Self::RouteServiceUnreachable(_)
            | Self::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response body returned to the client for this failure.
    ///
    /// Signature failures share one message so a caller cannot probe which
    /// validation stage rejected the envelope.
    pub fn response_body(&self) -> String {
        match self {
            Self::AuthenticationFailed
            | Self::RouteServiceExpired
            | Self::ForwardedUrlMismatch => {
                "Failed to validate Route Service Signature".to_string()
            }
            Self::RouteServiceDisabled => "Support for route services is disabled.".to_string(),
            Self::RouteNotFound(host) => {
                format!("Requested route ('{host}') does not exist.")
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for WaypointError {
    fn from(e: reqwest::Error) -> Self {
        WaypointError::RouteServiceUnreachable(e.to_string())
    }
}
