use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
        }
    }

    pub fn method(self) -> reqwest::Method {
        match self {
            Verb::Get => reqwest::Method::GET,
            Verb::Post => reqwest::Method::POST,
        }
    }
}

/// How the outbound body is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    None,
    Form,
    Json,
}

#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub verb: Verb,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Option<Map<String, Value>>,
    pub encoding: BodyEncoding,
    pub required: Vec<&'static str>,
}

impl ForwardRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            verb: Verb::Get,
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
            encoding: BodyEncoding::None,
            required: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|body| body.get(name))
    }

    /// Checks the body first, then the query.
    pub fn has_value(&self, name: &str) -> bool {
        match self.field(name) {
            Some(value) => !is_blank(value),
            None => self
                .query
                .get(name)
                .is_some_and(|v| !v.trim().is_empty()),
        }
    }
}

pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Renders a JSON primitive the way a form field expects it.
pub fn primitive_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Session token for Upnify. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardResult {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Deserialize)]
pub struct ResourceCall {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}
