//! HTTP handlers: namespace queries and value writes

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use paramtree_core::{Node, Origin, ParameterError};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info};

use crate::document::{attribute, json_to_value, node_document, value_to_json, Attribute};
use crate::state::EndpointState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn error(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ApiError::new(msg))).into_response()
}

/// `GET /`: the root namespace, or a WebSocket upgrade
pub async fn get_root(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<EndpointState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    // plain GETs fail the upgrade extractor and fall through to a query
    match ws {
        Ok(ws) => crate::ws::upgrade(ws, state),
        Err(_) => respond(&state, "/", &query),
    }
}

/// `GET /<path>`
pub async fn get_path(
    State(state): State<Arc<EndpointState>>,
    Path(path): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    respond(&state, &path, &query)
}

/// Answer a query on `path`. Only the first query key is considered.
pub(crate) fn respond(state: &EndpointState, path: &str, query: &[(String, String)]) -> Response {
    let Some(device) = state.device() else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "Device is gone");
    };

    // HOST_INFO is answered for any path
    if let Some((key, _)) = query.first() {
        if key == "HOST_INFO" {
            return Json(state.host.to_json()).into_response();
        }
    }

    let Some(node) = device.find_node(path) else {
        debug!(path = %path, "Namespace query for unknown path");
        return error(StatusCode::NOT_FOUND, format!("No node at {}", path));
    };

    // Full subtree
    let Some((key, arg)) = query.first() else {
        return Json(node_document(&node)).into_response();
    };

    if key == "SET" {
        return set_value(state, &node, arg);
    }

    let attr = match key.parse::<Attribute>() {
        Ok(attr) => attr,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    // Single attribute; 204 when the node does not carry it
    match attribute(&node, attr) {
        Some(value) => {
            let mut body = Map::new();
            body.insert(attr.as_str().to_string(), value);
            Json(JsonValue::Object(body)).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `?SET=<json>`: write through the parameter as a remote peer and reply
/// with the stored value
fn set_value(state: &EndpointState, node: &Node, arg: &str) -> Response {
    let address = node.address();
    let Some(parameter) = node.parameter() else {
        return error(StatusCode::NOT_FOUND, format!("Node {} has no parameter", address));
    };

    let json: JsonValue = match serde_json::from_str(arg) {
        Ok(json) => json,
        Err(e) => return error(StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)),
    };
    let Some(value) = json_to_value(&json) else {
        return error(StatusCode::BAD_REQUEST, "Payload has no value equivalent");
    };

    // read-only parameters answer 403, unconvertible values 400
    match parameter.apply(value, Origin::remote(state.id)) {
        Ok(stored) => {
            if state.logger {
                info!(address = %address, value = %stored, "HTTP in");
            }
            Json(json!({ "VALUE": value_to_json(&stored) })).into_response()
        }
        Err(e @ ParameterError::ReadOnly(_)) => error(StatusCode::FORBIDDEN, e.to_string()),
        Err(e) => error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}
