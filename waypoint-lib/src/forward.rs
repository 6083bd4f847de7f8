//! Outbound forwarding to route services and backends
//!
//! One HTTPS client per configuration epoch. Certificate verification
//! follows the system trust store unless `skip_tls_verify` is set.
//! Transport failures (DNS, connect, TLS handshake) surface as
//! `RouteServiceUnreachable`; a received HTTP response of any status is
//! passed through verbatim. No retries at this layer.

use crate::error::{Result, WaypointError};
use bytes::Bytes;
use http::{Request, Response};
use tracing::{debug, error};
use url::Url;

/// Outbound HTTP(S) client used for route service and backend calls.
#[derive(Debug, Clone)]
pub struct ForwardingClient {
    client: reqwest::Client,
}

impl ForwardingClient {
    /// Build the client. `skip_tls_verify` disables certificate
    /// verification on the outbound TLS session (testing convenience).
    pub fn new(skip_tls_verify: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(skip_tls_verify)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build forwarding client: {e}"))?;
        Ok(Self { client })
    }

    /// Send `request` upstream and collect the response.
    ///
    /// Method, headers, and body travel unchanged. The URI must be in
    /// absolute form by the time it reaches this call.
    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let (parts, body) = request.into_parts();

        let url = Url::parse(&parts.uri.to_string())
            .map_err(|e| WaypointError::bad_route_service_url(format!("{}: {e}", parts.uri)))?;

        let mut outbound = reqwest::Request::new(parts.method, url);
        *outbound.headers_mut() = parts.headers;
        *outbound.body_mut() = Some(reqwest::Body::from(body));

        debug!(url = %outbound.url(), "forwarding request upstream");
        let upstream = self.client.execute(outbound).await.map_err(|e| {
            error!(error = %e, "upstream request failed");
            WaypointError::from(e)
        })?;

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream.bytes().await?;

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
