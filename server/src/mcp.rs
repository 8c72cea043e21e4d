//! Resource/tool protocol used by assistants that read a manifest instead of
//! the OpenAPI document.

use crate::access_control::{resolve_credential, AuthHeader};
use crate::endpoints::{self, Endpoint};
use crate::error::ForwardError;
use crate::handlers::{parse_call, relay};
use crate::models::{is_blank, primitive_to_string, ResourceCall, ToolCall};
use crate::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const MANIFEST: &str = include_str!("../static/manifest.json");

pub async fn manifest_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], MANIFEST)
}

fn resource_endpoint(name: &str) -> Option<&'static Endpoint> {
    match name {
        "prospectos_diarios" => endpoints::find(endpoints::CONSULTAR_PROSPECTOS),
        "ventas_mensuales" => endpoints::find(endpoints::CONSULTAR_VENTAS),
        _ => None,
    }
}

pub async fn list_resources_handler(
    State(app_state): State<Arc<AppState>>,
    auth_header: AuthHeader,
    body: bytes::Bytes,
) -> Response {
    let call: ResourceCall = match parse_call(&body, &["name"]) {
        Ok(call) => call,
        Err(e) => return e.into_response(),
    };
    info!("Resource requested: {}", call.name);
    let outcome = async {
        let endpoint = resource_endpoint(&call.name).ok_or_else(|| ForwardError::NotFound {
            what: "resource",
            name: call.name.clone(),
        })?;
        let credential = resolve_credential(auth_header, &app_state.config)?;
        relay(&app_state, endpoint, &credential, &HashMap::new(), None).await
    }
    .await;

    match outcome {
        Ok(result) => with_status(
            result.status,
            json!({ "resource": call.name, "data": result.body }),
        ),
        Err(e) => e.into_response(),
    }
}

pub async fn run_tool_handler(
    State(app_state): State<Arc<AppState>>,
    auth_header: AuthHeader,
    body: bytes::Bytes,
) -> Response {
    let call: ToolCall = match parse_call(&body, &["name"]) {
        Ok(call) => call,
        Err(e) => return e.into_response(),
    };
    info!("Tool invoked: {}", call.name);
    let outcome = match call.name.as_str() {
        "mensaje_cliente_casual" => casual_greeting(&call.input).map(|greeting| (200, json!(greeting))),
        "crear_prospecto" => {
            let input = pick(&call.input, &["nombre", "apellidos", "correo"]);
            run_endpoint(&app_state, auth_header, endpoints::CREAR_PROSPECTO_COMPLETO, input).await
        }
        "crear_oportunidad" => {
            run_endpoint(&app_state, auth_header, endpoints::CREAR_OPORTUNIDAD, call.input).await
        }
        other => Err(ForwardError::NotFound {
            what: "tool",
            name: other.to_string(),
        }),
    };

    match outcome {
        Ok((status, result)) => with_status(status, json!({ "result": result })),
        Err(e) => e.into_response(),
    }
}

async fn run_endpoint(
    app_state: &AppState,
    auth_header: AuthHeader,
    route: &str,
    input: Map<String, Value>,
) -> Result<(u16, Value), ForwardError> {
    let endpoint = endpoints::find(route).ok_or_else(|| ForwardError::NotFound {
        what: "endpoint",
        name: route.to_string(),
    })?;
    let credential = resolve_credential(auth_header, &app_state.config)?;
    let result = relay(app_state, endpoint, &credential, &HashMap::new(), Some(input)).await?;
    Ok((result.status, result.body))
}

fn casual_greeting(input: &Map<String, Value>) -> Result<String, ForwardError> {
    let name = input
        .get("nombre")
        .filter(|v| !is_blank(v))
        .and_then(primitive_to_string)
        .ok_or_else(|| ForwardError::missing("nombre"))?;
    Ok(format!(
        "¡Hola {}! ¿Qué tal todo? Sólo pasaba a saludar 😉",
        name.trim()
    ))
}

fn pick(input: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|k| input.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect()
}

fn with_status(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(body)).into_response()
}
