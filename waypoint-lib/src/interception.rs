//! Per-request interception state machine
//!
//! Classifies every incoming request against the matched route and the
//! route service configuration, then dispatches it: fresh requests are
//! diverted to the route service with a newly minted envelope, returning
//! requests are validated and forwarded to the backend with the envelope
//! stripped, and everything else is rejected with the appropriate status.
//!
//! The core is stateless per request; the only shared state is the
//! immutable configuration snapshot, swapped atomically on reload.

use crate::config::{RouteServiceArgs, RouteServiceConfig};
use crate::error::{Result, WaypointError};
use crate::forward::ForwardingClient;
use crate::headers::{
    APPLICATION_ID, ROUTE_SERVICE_FORWARDED_URL, ROUTE_SERVICE_METADATA, ROUTE_SERVICE_SIGNATURE,
};
use crate::http_utils::{host_of, reconstruct_forwarded_url};
use crate::registry::{RouteEntry, RouteLookup};
use arc_swap::ArcSwap;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, HOST};
use http::{HeaderMap, Request, Response, Uri};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a classified request goes next.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Forward to the registered backend. The envelope headers are
    /// stripped unless the backend is itself a route service.
    ForwardToBackend { strip_envelope: bool },
    /// Divert to the route service with a freshly minted envelope.
    ForwardToRouteService(RouteServiceArgs),
}

/// Classify one request against its matched route.
///
/// `forwarded_url_raw` is the reconstructed original URL that a freshly
/// minted signature records.
pub fn classify(
    config: &RouteServiceConfig,
    route: &RouteEntry,
    headers: &HeaderMap,
    forwarded_url_raw: &str,
) -> Result<RouteDecision> {
    let strip_envelope = !route.is_route_service;

    let Some(route_service_url) = route.route_service_url.as_deref() else {
        return Ok(RouteDecision::ForwardToBackend { strip_envelope });
    };

    if !config.enabled() {
        warn!(%route_service_url, "route requires a route service but support is disabled");
        return Err(WaypointError::RouteServiceDisabled);
    }

    // A signature header without metadata is a validation failure, not a
    // fresh request.
    if headers.get(ROUTE_SERVICE_SIGNATURE).is_some() {
        config.validate_signature(headers).map_err(|err| {
            warn!(error = %err, "rejecting request with invalid route service signature");
            err
        })?;
        debug!("route service signature validated, forwarding to backend");
        Ok(RouteDecision::ForwardToBackend { strip_envelope })
    } else {
        let args = config.build_route_service_args(route_service_url, forwarded_url_raw)?;
        debug!(route_service = %args.url_string, "diverting request to route service");
        Ok(RouteDecision::ForwardToRouteService(args))
    }
}

/// Build the HTTP error response for a rejected request.
pub fn error_response(err: &WaypointError) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(err.response_body()));
    *response.status_mut() = err.response_status();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Request-handler glue: route lookup, classification, and dispatch.
///
/// Holds the configuration behind an atomic swap so reconfiguration never
/// blocks the hot path; each request loads one snapshot and finishes
/// against it.
pub struct Interceptor<R: RouteLookup> {
    config: ArcSwap<RouteServiceConfig>,
    client: ArcSwap<ForwardingClient>,
    routes: Arc<R>,
}

impl<R: RouteLookup> Interceptor<R> {
    pub fn new(config: RouteServiceConfig, routes: Arc<R>) -> Result<Self> {
        let client = ForwardingClient::new(config.skip_tls_verify())?;
        Ok(Self {
            config: ArcSwap::from_pointee(config),
            client: ArcSwap::from_pointee(client),
            routes,
        })
    }

    /// Replace the configuration atomically. In-flight requests keep the
    /// snapshot they loaded.
    pub fn reload(&self, config: RouteServiceConfig) -> Result<()> {
        let client = ForwardingClient::new(config.skip_tls_verify())?;
        self.client.store(Arc::new(client));
        self.config.store(Arc::new(config));
        Ok(())
    }

    /// Handle one request end to end, always producing a response.
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let config = self.config.load_full();
        let client = self.client.load_full();
        match self.dispatch(&config, &client, request).await {
            Ok(response) => response,
            Err(err) => error_response(&err),
        }
    }

    async fn dispatch(
        &self,
        config: &RouteServiceConfig,
        client: &ForwardingClient,
        mut request: Request<Bytes>,
    ) -> Result<Response<Bytes>> {
        let host =
            host_of(&request).ok_or_else(|| WaypointError::route_not_found("<missing host>"))?;
        let route = self
            .routes
            .lookup(&host, request.uri().path())
            .ok_or_else(|| WaypointError::route_not_found(&host))?;

        let raw_target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();
        let forwarded_url = reconstruct_forwarded_url("http", &host, &raw_target);

        match classify(config, &route, request.headers(), &forwarded_url)? {
            RouteDecision::ForwardToBackend { strip_envelope } => {
                let backend = route.backend.as_deref().ok_or_else(|| {
                    warn!(%host, "no backend instance registered for validated request");
                    WaypointError::backend_unavailable(&host)
                })?;
                if strip_envelope {
                    let headers = request.headers_mut();
                    headers.remove(ROUTE_SERVICE_SIGNATURE);
                    headers.remove(ROUTE_SERVICE_METADATA);
                    headers.remove(ROUTE_SERVICE_FORWARDED_URL);
                }
                rewrite_backend_uri(&mut request, backend)?;
                client.send(request).await
            }
            RouteDecision::ForwardToRouteService(args) => {
                request.headers_mut().remove(APPLICATION_ID);
                config.setup_route_service_request(&mut request, &args)?;
                client.send(request).await
            }
        }
    }
}

/// Point `request` at the backend address, keeping path and query.
fn rewrite_backend_uri(request: &mut Request<Bytes>, backend: &str) -> Result<()> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = Uri::builder()
        .scheme("http")
        .authority(backend)
        .path_and_query(path_and_query)
        .build()?;
    *request.uri_mut() = uri;
    request.headers_mut().insert(
        HOST,
        HeaderValue::from_str(backend).map_err(http::Error::from)?,
    );
    Ok(())
}
