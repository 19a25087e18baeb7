//! The outward xDS HTTP surface (section 6): one route per `(api_version,
//! resource_type)` pair, all backed by the same blocking-read flow.

use crate::read_side::ReadSide;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use xdscp_core::{ApiVersion, ResourceType};
use xdscp_error::XdscpError;

/// Shared state for the xDS HTTP surface: the read side and the
/// configurable "no change" status (default 304, section 6).
#[derive(Clone)]
pub struct WebState {
    pub read_side: Arc<ReadSide>,
    pub no_change_status: u16,
}

#[must_use]
pub fn router(state: WebState) -> Router {
    Router::new().route("/v{version}/discovery:{resource}", post(handle_discovery)).with_state(state)
}

fn parse_api_version(s: &str) -> Option<ApiVersion> {
    match s {
        "v2" => Some(ApiVersion::V2),
        "v3" => Some(ApiVersion::V3),
        _ => None,
    }
}

fn parse_resource_type(s: &str) -> Option<ResourceType> {
    Some(match s {
        "clusters" => ResourceType::Clusters,
        "listeners" => ResourceType::Listeners,
        "routes" => ResourceType::Routes,
        "endpoints" => ResourceType::Endpoints,
        "secrets" => ResourceType::Secrets,
        "scoped-routes" => ResourceType::ScopedRoutes,
        "runtime" => ResourceType::Runtime,
        _ => return None,
    })
}

async fn handle_discovery(
    Path((version, resource)): Path<(String, String)>,
    State(state): State<WebState>,
    Json(mut request): Json<xdscp_core::DiscoveryRequest>,
) -> Response {
    let Some(api_version) = parse_api_version(&version) else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": format!("unknown api version {version:?}")}))).into_response();
    };
    let Some(resource_type) = parse_resource_type(&resource) else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": format!("unknown resource type {resource:?}")}))).into_response();
    };
    if resource_type == ResourceType::Runtime && api_version == ApiVersion::V2 {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "runtime discovery is v3-only"}))).into_response();
    }

    request.api_version = api_version;
    request.resource_type = resource_type;
    let requested_version_info = request.version_info.clone();
    let has_specific_resources = !request.resource_names.is_empty();

    match state.read_side.get_or_register(&request).await {
        Ok(Some(entry)) => respond_with_entry(&entry, &requested_version_info, has_specific_resources, state.no_change_status),
        Ok(None) if has_specific_resources => {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "no resources matched the requested names"}))).into_response()
        }
        Ok(None) => (StatusCode::OK, Json(serde_json::json!({"version_info": "", "resources": []}))).into_response(),
        Err(e) => error_response(&e),
    }
}

fn respond_with_entry(entry: &xdscp_core::Entry, requested_version_info: &str, has_specific_resources: bool, no_change_status: u16) -> Response {
    let Ok(body) = serde_json::from_str::<serde_json::Value>(&entry.text) else {
        return error_response(&XdscpError::new(xdscp_error::ErrorCode::InternalError, "cached entry body was not valid json"));
    };

    if has_specific_resources && body["resources"].as_array().is_some_and(Vec::is_empty) {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "no resources matched the requested names"}))).into_response();
    }
    if !requested_version_info.is_empty() && requested_version_info == entry.version {
        let status = StatusCode::from_u16(no_change_status).unwrap_or(StatusCode::NOT_MODIFIED);
        return (status, ()).into_response();
    }
    (StatusCode::OK, Json(body)).into_response()
}

fn error_response(e: &XdscpError) -> Response {
    let status = StatusCode::from_u16(e.code().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({"error": e.to_string(), "code": e.code().as_str()}))).into_response()
}
