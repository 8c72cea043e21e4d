use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong while relaying one call to Upnify.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("missing required field(s): {}", .missing.join(", "))]
    MissingFields { missing: Vec<String> },

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("error parsing Upnify response (status {status})")]
    UpstreamFormat { status: u16, excerpt: String },

    #[error("could not reach Upnify: {message}")]
    Connectivity { code: String, message: String },

    #[error("timeout: Upnify did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("unknown {what} `{name}`")]
    NotFound { what: &'static str, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    UpstreamFormat,
    Connectivity,
    Timeout,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::UpstreamFormat => "UPSTREAM_FORMAT",
            ErrorKind::Connectivity => "CONNECTIVITY",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NotFound => "NOT_FOUND",
        }
    }
}

impl ForwardError {
    pub fn missing<S: Into<String>>(field: S) -> Self {
        ForwardError::MissingFields {
            missing: vec![field.into()],
        }
    }

    pub fn invalid<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        ForwardError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Classifies a reqwest failure. `timeout` is the bound that was in force.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return ForwardError::Timeout(timeout);
        }
        ForwardError::Connectivity {
            code: transport_code(&err),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ForwardError::MissingFields { .. } | ForwardError::InvalidField { .. } => {
                ErrorKind::Validation
            }
            ForwardError::UpstreamFormat { .. } => ErrorKind::UpstreamFormat,
            ForwardError::Connectivity { .. } => ErrorKind::Connectivity,
            ForwardError::Timeout(_) => ErrorKind::Timeout,
            ForwardError::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamFormat | ErrorKind::Connectivity => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// `{ success: false, error, kind, ...context }`
    pub fn envelope(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.to_string(),
            "kind": self.kind().as_str(),
        });
        let context = match self {
            ForwardError::MissingFields { missing } => json!({ "missing": missing }),
            ForwardError::InvalidField { field, .. } => json!({ "field": field }),
            ForwardError::UpstreamFormat { status, excerpt } => {
                json!({ "status": status, "rawData": excerpt })
            }
            ForwardError::Connectivity { code, .. } => json!({ "code": code }),
            ForwardError::Timeout(_) | ForwardError::NotFound { .. } => json!({}),
        };
        if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), context) {
            target.extend(extra);
        }
        body
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.envelope())).into_response()
    }
}

/// Walks the source chain for a name-resolution failure or an I/O error
/// kind, falling back to the reqwest error class.
fn transport_code(err: &reqwest::Error) -> String {
    if let Some(code) = chain_code(err.source()) {
        return code;
    }

    let class = if err.is_connect() {
        "CONNECT"
    } else if err.is_request() {
        "REQUEST"
    } else if err.is_body() {
        "BODY"
    } else if err.is_decode() {
        "DECODE"
    } else if err.is_redirect() {
        "REDIRECT"
    } else {
        "UNKNOWN"
    };
    class.to_string()
}

fn chain_code(mut source: Option<&(dyn std::error::Error + 'static)>) -> Option<String> {
    while let Some(inner) = source {
        let message = inner.to_string().to_lowercase();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return Some("DNS".to_string());
        }
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return Some(format!("{:?}", io.kind()));
        }
        source = inner.source();
    }
    None
}
