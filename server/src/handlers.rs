use crate::access_control::{resolve_credential, AuthHeader};
use crate::endpoints::{Endpoint, ENDPOINTS};
use crate::error::ForwardError;
use crate::models::{is_blank, Credential, ForwardRequest, ForwardResult, Verb};
use crate::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const OPENAPI_TEMPLATE: &str = include_str!("../static/openapi.yaml");
const PUBLIC_URL_PLACEHOLDER: &str = "{{PUBLIC_URL}}";

/// Wires one table row to an axum route.
pub fn endpoint_route(endpoint: &'static Endpoint) -> MethodRouter<Arc<AppState>> {
    let handler = move |State(app_state): State<Arc<AppState>>,
                        auth_header: AuthHeader,
                        query: Result<Query<HashMap<String, String>>, QueryRejection>,
                        body: bytes::Bytes| async move {
        info!("{} {}", endpoint.verb.as_str(), endpoint.route);
        let outcome = async {
            let query = query_params(query)?;
            let credential = resolve_credential(auth_header, &app_state.config)?;
            let body = parse_body(&body)?;
            relay(&app_state, endpoint, &credential, &query, body).await
        }
        .await;

        match outcome {
            Ok(result) => pass_through(result),
            Err(e) => e.into_response(),
        }
    };

    match endpoint.verb {
        Verb::Get => get(handler),
        Verb::Post => post(handler),
    }
}

/// Builds the outbound request for `endpoint` and forwards it.
pub async fn relay(
    app_state: &AppState,
    endpoint: &Endpoint,
    credential: &Credential,
    query: &HashMap<String, String>,
    body: Option<Map<String, Value>>,
) -> Result<ForwardResult, ForwardError> {
    let request = endpoint.build(query, body)?;
    app_state.forwarder.forward(&request, credential).await
}

/// Empty body is fine; anything else must be a JSON object.
pub fn parse_body(body: &[u8]) -> Result<Option<Map<String, Value>>, ForwardError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(ForwardError::invalid("body", "expected a JSON object")),
        Err(e) => Err(ForwardError::invalid("body", format!("malformed JSON: {}", e))),
    }
}

/// Parses a JSON object body into `T`, naming the first required key that
/// is absent or blank.
pub fn parse_call<T: DeserializeOwned>(body: &[u8], required: &[&str]) -> Result<T, ForwardError> {
    let map = parse_body(body)?.unwrap_or_default();
    let missing: Vec<String> = required
        .iter()
        .filter(|key| map.get(**key).map_or(true, is_blank))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ForwardError::MissingFields { missing });
    }
    serde_json::from_value(Value::Object(map)).map_err(|e| ForwardError::invalid("body", e.to_string()))
}

fn query_params(
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<HashMap<String, String>, ForwardError> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| ForwardError::invalid("query", rejection.body_text()))
}

pub fn pass_through(result: ForwardResult) -> Response {
    let status = StatusCode::from_u16(result.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(result.body)).into_response()
}

pub async fn root_handler() -> impl IntoResponse {
    let endpoints: Vec<String> = ENDPOINTS
        .iter()
        .map(|ep| format!("{} {} - {}", ep.verb.as_str(), ep.route, ep.summary))
        .chain([
            "GET /test-upnify - Test de conectividad con Upnify".to_string(),
            "GET /openapi.yaml - Documentación OpenAPI".to_string(),
            "GET /get_manifest - Manifest de recursos y herramientas".to_string(),
        ])
        .collect();

    Json(json!({
        "status": "OK",
        "service": "UpnifIA GPT API",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "endpoints": endpoints,
    }))
}

pub async fn openapi_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let document = OPENAPI_TEMPLATE.replace(PUBLIC_URL_PLACEHOLDER, &app_state.config.public_url);
    ([(header::CONTENT_TYPE, "text/yaml; charset=utf-8")], document)
}

/// Checks that Upnify answers with the configured credentials.
pub async fn test_connection_handler(
    State(app_state): State<Arc<AppState>>,
    auth_header: AuthHeader,
) -> Response {
    info!("Testing Upnify connection");
    let outcome = async {
        let credential = resolve_credential(auth_header, &app_state.config)?;
        let mut request = ForwardRequest::get("/prospectos");
        request.query.insert("desde".into(), "HOY".into());
        request.query.insert("hasta".into(), "HOY".into());
        app_state
            .forwarder
            .forward_with_timeout(&request, &credential, app_state.config.check_timeout)
            .await
    }
    .await;

    match outcome {
        Ok(result) => {
            let prospectos = result.body.as_array().map_or(0, Vec::len);
            Json(json!({
                "success": true,
                "status": result.status,
                "message": "Conexión exitosa con Upnify",
                "prospectos": prospectos,
            }))
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}
