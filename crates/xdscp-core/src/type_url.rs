//! The fixed v2/v3 Envoy type-URL tables used to annotate rendered
//! resources that don't already carry `@type`.

use crate::request::{ApiVersion, ResourceType};

/// Bit-exact type URL for `(api_version, resource_type)`. `Runtime` has no
/// v2 counterpart — Envoy's runtime discovery service is v3-only.
#[must_use]
pub fn type_url(api_version: ApiVersion, resource_type: ResourceType) -> Option<&'static str> {
    use ApiVersion::{V2, V3};
    use ResourceType::{Clusters, Endpoints, Listeners, Routes, Runtime, ScopedRoutes, Secrets};

    Some(match (api_version, resource_type) {
        (V2, Listeners) => "type.googleapis.com/envoy.api.v2.Listener",
        (V2, Clusters) => "type.googleapis.com/envoy.api.v2.Cluster",
        (V2, Routes) => "type.googleapis.com/envoy.api.v2.RouteConfiguration",
        (V2, Endpoints) => "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment",
        (V2, Secrets) => "type.googleapis.com/envoy.api.v2.auth.Secret",
        (V2, ScopedRoutes) => "type.googleapis.com/envoy.api.v2.ScopedRouteConfiguration",
        (V2, Runtime) => return None,

        (V3, Listeners) => "type.googleapis.com/envoy.config.listener.v3.Listener",
        (V3, Clusters) => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
        (V3, Routes) => "type.googleapis.com/envoy.config.route.v3.RouteConfiguration",
        (V3, Endpoints) => "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment",
        (V3, Secrets) => "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret",
        (V3, ScopedRoutes) => "type.googleapis.com/envoy.config.route.v3.ScopedRouteConfiguration",
        (V3, Runtime) => "type.googleapis.com/envoy.service.runtime.v3.Runtime",
    })
}
