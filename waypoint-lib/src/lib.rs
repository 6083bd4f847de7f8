//! Waypoint - Route Service Interception Core
//!
//! Decides, per incoming request, whether it must first transit an
//! operator-configured route service or may go straight to a backend.
//! Diverted requests carry a signed, time-bounded envelope binding the
//! original URL to the interaction; returning requests present it back
//! for validation.

pub mod config;
pub mod crypto;
pub mod error;
pub mod forward;
pub mod headers;
pub mod http_utils;
pub mod interception;
pub mod registry;
pub mod signature;

pub use config::{RouteServiceArgs, RouteServiceConfig, RouteServiceSettings};
pub use crypto::AesGcm;
pub use error::{Result, WaypointError};
pub use forward::ForwardingClient;
pub use http_utils::reconstruct_forwarded_url;
pub use interception::{classify, error_response, Interceptor, RouteDecision};
pub use registry::{RouteEntry, RouteLookup, RouteTable};
pub use signature::{build_signature_and_metadata, signature_from_headers, Signature};
