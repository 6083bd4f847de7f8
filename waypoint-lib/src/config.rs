//! Route service configuration
//!
//! Holds the current and previous symmetric keys, the enable flag, and the
//! expiry window, and exposes the two operations the request path needs:
//! validating a returning envelope and preparing an outbound request to a
//! route service.
//!
//! A `RouteServiceConfig` is immutable once built. Reconfiguration replaces
//! the whole value atomically (see [`crate::interception::Interceptor`]);
//! in-flight requests finish against the snapshot they started with.

use crate::crypto::AesGcm;
use crate::error::{Result, WaypointError};
use crate::headers::{
    ROUTE_SERVICE_FORWARDED_URL, ROUTE_SERVICE_METADATA, ROUTE_SERVICE_SIGNATURE,
};
use crate::signature::{build_signature_and_metadata, signature_from_headers, Signature};
use chrono::{Duration, Utc};
use http::header::{HeaderValue, HOST};
use http::{HeaderMap, Request, Uri};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Request-scoped arguments for one route service interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteServiceArgs {
    /// Configured route service URL for the matched route
    pub url_string: String,
    /// Parsed form of `url_string`
    pub parsed_url: Url,
    /// Value for the signature header
    pub signature: String,
    /// Value for the metadata header
    pub metadata: String,
    /// URL recorded inside the signature (the original external URL)
    pub forwarded_url_raw: String,
}

impl RouteServiceArgs {
    /// `host[:port]` of the route service, as it goes into the rewritten
    /// URI and the `Host` header.
    pub fn authority(&self) -> String {
        let host = self.parsed_url.host_str().unwrap_or_default();
        match self.parsed_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

/// Process-scope route service configuration.
#[derive(Debug, Clone)]
pub struct RouteServiceConfig {
    enabled: bool,
    expiry_window: Duration,
    crypto_current: AesGcm,
    crypto_previous: Option<AesGcm>,
    skip_tls_verify: bool,
}

impl RouteServiceConfig {
    pub fn new(
        enabled: bool,
        expiry_window: Duration,
        crypto_current: AesGcm,
        crypto_previous: Option<AesGcm>,
        skip_tls_verify: bool,
    ) -> Self {
        Self {
            enabled,
            expiry_window,
            crypto_current,
            crypto_previous,
            skip_tls_verify,
        }
    }

    /// Whether route service support is switched on
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the outbound TLS client skips certificate verification
    pub fn skip_tls_verify(&self) -> bool {
        self.skip_tls_verify
    }

    /// Validate the envelope carried by a returning request.
    ///
    /// Decrypts under the current key first, falling back to the previous
    /// key during a staged key rollover. After decryption the signature's
    /// age is checked against the expiry window (grossly future-dated
    /// envelopes are rejected too), and the forwarded-URL header must be
    /// byte-equal to the signed URL.
    pub fn validate_signature(&self, headers: &HeaderMap) -> Result<()> {
        let signature_header = header_str(headers, ROUTE_SERVICE_SIGNATURE);
        let metadata_header = header_str(headers, ROUTE_SERVICE_METADATA);

        let signature =
            match signature_from_headers(signature_header, metadata_header, &self.crypto_current) {
                Ok(signature) => signature,
                Err(err) => match &self.crypto_previous {
                    Some(previous) => {
                        debug!("signature rejected under current key, retrying with previous key");
                        signature_from_headers(signature_header, metadata_header, previous)?
                    }
                    None => return Err(err),
                },
            };

        let age = Utc::now().signed_duration_since(signature.requested_time);
        if age > self.expiry_window || age < -self.expiry_window {
            warn!(
                forwarded_url = %signature.forwarded_url,
                signed_at = %signature.requested_time,
                "route service signature expired"
            );
            return Err(WaypointError::RouteServiceExpired);
        }

        match headers
            .get(ROUTE_SERVICE_FORWARDED_URL)
            .and_then(|value| value.to_str().ok())
        {
            Some(header_url) if header_url == signature.forwarded_url => Ok(()),
            received => {
                warn!(
                    signed = %signature.forwarded_url,
                    received = received.unwrap_or("<missing>"),
                    "forwarded url header does not match signed url"
                );
                Err(WaypointError::ForwardedUrlMismatch)
            }
        }
    }

    /// Parse the route service URL and mint a fresh envelope for a request
    /// about to be diverted.
    pub fn build_route_service_args(
        &self,
        route_service_url: &str,
        forwarded_url_raw: &str,
    ) -> Result<RouteServiceArgs> {
        let parsed_url = Url::parse(route_service_url).map_err(|e| {
            WaypointError::bad_route_service_url(format!("{route_service_url}: {e}"))
        })?;

        let signature = Signature {
            requested_time: Utc::now(),
            forwarded_url: forwarded_url_raw.to_string(),
        };
        let (signature_header, metadata_header) =
            build_signature_and_metadata(&self.crypto_current, &signature)?;

        Ok(RouteServiceArgs {
            url_string: route_service_url.to_string(),
            parsed_url,
            signature: signature_header,
            metadata: metadata_header,
            forwarded_url_raw: forwarded_url_raw.to_string(),
        })
    }

    /// Rewrite `request` in place so it targets the route service.
    ///
    /// Scheme and authority are replaced with the route service's; the
    /// original path and query are left untouched (the route service
    /// derives its own endpoint from its URL base). The three envelope
    /// headers are set and `Host` is updated to the new authority.
    pub fn setup_route_service_request<B>(
        &self,
        request: &mut Request<B>,
        args: &RouteServiceArgs,
    ) -> Result<()> {
        let authority = args.authority();
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let uri = Uri::builder()
            .scheme(args.parsed_url.scheme())
            .authority(authority.as_str())
            .path_and_query(path_and_query)
            .build()?;
        *request.uri_mut() = uri;

        let headers = request.headers_mut();
        headers.insert(
            ROUTE_SERVICE_SIGNATURE,
            HeaderValue::from_str(&args.signature).map_err(http::Error::from)?,
        );
        headers.insert(
            ROUTE_SERVICE_METADATA,
            HeaderValue::from_str(&args.metadata).map_err(http::Error::from)?,
        );
        headers.insert(
            ROUTE_SERVICE_FORWARDED_URL,
            HeaderValue::from_str(&args.forwarded_url_raw).map_err(http::Error::from)?,
        );
        headers.insert(
            HOST,
            HeaderValue::from_str(&authority).map_err(http::Error::from)?,
        );
        Ok(())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Plain-data form of the route service configuration, as it appears in
/// the proxy's configuration file.
///
/// Keys are raw 16-byte strings. Converts into [`RouteServiceConfig`] via
/// `TryFrom`; an invalid key length surfaces at conversion time, before
/// the proxy starts serving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteServiceSettings {
    /// Whether route service support is switched on
    pub enabled: bool,
    /// Maximum accepted envelope age in seconds (default: 3600)
    pub expiry_window_secs: u64,
    /// Current symmetric key (16 bytes)
    pub key: String,
    /// Previous key kept live during a rollover
    pub previous_key: Option<String>,
    /// Skip certificate verification on the outbound TLS client
    pub skip_tls_verify: bool,
}

impl Default for RouteServiceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            expiry_window_secs: 3600,
            key: String::new(),
            previous_key: None,
            skip_tls_verify: false,
        }
    }
}

impl TryFrom<RouteServiceSettings> for RouteServiceConfig {
    type Error = WaypointError;

    fn try_from(settings: RouteServiceSettings) -> Result<Self> {
        let crypto_current = AesGcm::new(settings.key.as_bytes())?;
        let crypto_previous = settings
            .previous_key
            .as_deref()
            .map(|key| AesGcm::new(key.as_bytes()))
            .transpose()?;
        Ok(RouteServiceConfig::new(
            settings.enabled,
            Duration::seconds(settings.expiry_window_secs as i64),
            crypto_current,
            crypto_previous,
            settings.skip_tls_verify,
        ))
    }
}
