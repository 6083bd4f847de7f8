//! Route registry lookup interface
//!
//! The production registry lives outside this crate; the interception core
//! consumes it through [`RouteLookup`] only. [`RouteTable`] is a small
//! in-memory implementation with the registry's `host` / `host/path`
//! registration shape, used by tests and embedders that do not need a full
//! registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One registry entry for a matched route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RouteEntry {
    /// Backend address (`host:port`) receiving validated requests
    pub backend: Option<String>,
    /// Route service the request must transit first, if any
    pub route_service_url: Option<String>,
    /// The registered backend is itself a route service. Envelope headers
    /// are passed through to it unstripped.
    #[serde(default)]
    pub is_route_service: bool,
}

impl RouteEntry {
    /// Plain backend route with no route service attached
    pub fn backend(addr: impl Into<String>) -> Self {
        Self {
            backend: Some(addr.into()),
            ..Default::default()
        }
    }

    /// Route with a route service in front of the backend
    pub fn with_route_service(addr: impl Into<String>, route_service_url: impl Into<String>) -> Self {
        Self {
            backend: Some(addr.into()),
            route_service_url: Some(route_service_url.into()),
            is_route_service: false,
        }
    }
}

/// Lookup seam between the interception core and the route registry.
pub trait RouteLookup: Send + Sync {
    /// Resolve a request's host and path to a registry entry.
    fn lookup(&self, host: &str, path: &str) -> Option<RouteEntry>;
}

/// In-memory route table.
///
/// Routes register under `host` or `host/path`; lookup matches the host
/// exactly (ignoring any `:port` suffix) and picks the longest registered
/// path prefix.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route under `host` or `host/path`.
    pub fn register(&mut self, route: impl Into<String>, entry: RouteEntry) {
        self.routes.insert(route.into(), entry);
    }
}

impl RouteLookup for RouteTable {
    fn lookup(&self, host: &str, path: &str) -> Option<RouteEntry> {
        let host = host.split(':').next().unwrap_or(host);

        let mut best: Option<(usize, &RouteEntry)> = None;
        for (key, entry) in &self.routes {
            let (key_host, key_path) = match key.split_once('/') {
                Some((h, p)) => (h, Some(p)),
                None => (key.as_str(), None),
            };
            if key_host != host {
                continue;
            }
            let specificity = match key_path {
                None => 0,
                Some(key_path) => {
                    let request_path = path.strip_prefix('/').unwrap_or(path);
                    if request_path == key_path
                        || request_path.starts_with(&format!("{key_path}/"))
                    {
                        key_path.len() + 1
                    } else {
                        continue;
                    }
                }
            };
            if best.map_or(true, |(s, _)| specificity >= s) {
                best = Some((specificity, entry));
            }
        }
        best.map(|(_, entry)| entry.clone())
    }
}
