//! Declarative table of the operations relayed to Upnify.
//!
//! Each row says where an inbound route lands upstream, which fields it
//! needs, which query parameters it accepts (with defaults and validation)
//! and how the body is encoded. [`Endpoint::build`] turns the caller's input
//! into a [`ForwardRequest`] for the forwarder.

use crate::error::ForwardError;
use crate::models::{is_blank, BodyEncoding, ForwardRequest, Verb};
use chrono::Datelike;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

pub const CREAR_PROSPECTO: &str = "/crear-prospecto";
pub const CREAR_PROSPECTO_COMPLETO: &str = "/crear-prospecto-completo";
pub const CONSULTAR_VENTAS: &str = "/consultar-ventas";
pub const CONSULTAR_REPORTES: &str = "/consultar-reportes";
pub const CONSULTAR_COBROS_PENDIENTES: &str = "/consultar-cobros-pendientes";
pub const CONSULTAR_PROSPECTOS: &str = "/consultar-prospectos";
pub const CONSULTAR_PROSPECTOS_RECIENTES: &str = "/consultar-prospectos-recientes";
pub const BUSCAR_CONTACTOS: &str = "/buscar-contactos";
pub const CREAR_OPORTUNIDAD: &str = "/crear-oportunidad";

/// Where a query parameter gets its value when the caller omits it.
#[derive(Debug, Clone, Copy)]
pub enum ParamDefault {
    None,
    Static(&'static str),
    CurrentYear,
}

#[derive(Debug, Clone, Copy)]
pub enum ParamRule {
    Any,
    Integer,
    Year,
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub default: ParamDefault,
    pub rule: ParamRule,
}

type Derive = fn(&mut Map<String, Value>) -> Result<(), ForwardError>;

pub struct Endpoint {
    pub route: &'static str,
    pub verb: Verb,
    pub summary: &'static str,
    pub upstream_path: &'static str,
    pub encoding: BodyEncoding,
    pub required: &'static [&'static str],
    pub params: &'static [Param],
    pub body_defaults: &'static [(&'static str, &'static str)],
    pub derive: Option<Derive>,
}

const PROSPECT_REQUIRED: &[&str] = &["nombre", "apellidos", "correo"];

const SALES_REPORT_PARAMS: &[Param] = &[
    Param {
        name: "agrupacion",
        default: ParamDefault::Static("1"),
        rule: ParamRule::Integer,
    },
    Param {
        name: "periodicidad",
        default: ParamDefault::Static("4"),
        rule: ParamRule::Integer,
    },
    Param {
        name: "anio",
        default: ParamDefault::CurrentYear,
        rule: ParamRule::Year,
    },
    Param {
        name: "impuestos",
        default: ParamDefault::Static("0"),
        rule: ParamRule::OneOf(&["0", "1"]),
    },
];

pub static ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        route: CREAR_PROSPECTO,
        verb: Verb::Post,
        summary: "Crear prospecto en Upnify",
        upstream_path: "/prospectos",
        encoding: BodyEncoding::Json,
        required: PROSPECT_REQUIRED,
        params: &[],
        body_defaults: &[
            ("telefono2LadaPais", "+52"),
            ("movilLadaPais", "+52"),
            ("idPais", "MX"),
        ],
        derive: None,
    },
    Endpoint {
        route: CREAR_PROSPECTO_COMPLETO,
        verb: Verb::Post,
        summary: "Crear prospecto con todos sus datos en Upnify",
        upstream_path: "/prospectos",
        encoding: BodyEncoding::Form,
        required: PROSPECT_REQUIRED,
        params: &[],
        body_defaults: &[],
        derive: None,
    },
    Endpoint {
        route: CONSULTAR_VENTAS,
        verb: Verb::Get,
        summary: "Consultar ventas realizadas",
        upstream_path: "/reportesnv/ventas/realizadas",
        encoding: BodyEncoding::None,
        required: &[],
        params: SALES_REPORT_PARAMS,
        body_defaults: &[],
        derive: None,
    },
    Endpoint {
        route: CONSULTAR_REPORTES,
        verb: Verb::Get,
        summary: "Consultar reportes de ventas",
        upstream_path: "/reportesnv/ventas/realizadas",
        encoding: BodyEncoding::None,
        required: &[],
        params: SALES_REPORT_PARAMS,
        body_defaults: &[],
        derive: None,
    },
    Endpoint {
        route: CONSULTAR_COBROS_PENDIENTES,
        verb: Verb::Get,
        summary: "Consultar cobros pendientes",
        upstream_path: "/reportesnv/cobros/pendientes",
        encoding: BodyEncoding::None,
        required: &[],
        params: &[
            Param {
                name: "agrupacion",
                default: ParamDefault::Static("1"),
                rule: ParamRule::Integer,
            },
            Param {
                name: "impuestos",
                default: ParamDefault::Static("0"),
                rule: ParamRule::OneOf(&["0", "1"]),
            },
        ],
        body_defaults: &[],
        derive: None,
    },
    Endpoint {
        route: CONSULTAR_PROSPECTOS,
        verb: Verb::Get,
        summary: "Consultar prospectos del día",
        upstream_path: "/prospectos",
        encoding: BodyEncoding::None,
        required: &[],
        params: &[
            Param {
                name: "desde",
                default: ParamDefault::Static("HOY"),
                rule: ParamRule::Any,
            },
            Param {
                name: "hasta",
                default: ParamDefault::Static("HOY"),
                rule: ParamRule::Any,
            },
        ],
        body_defaults: &[],
        derive: None,
    },
    Endpoint {
        route: CONSULTAR_PROSPECTOS_RECIENTES,
        verb: Verb::Get,
        summary: "Consultar prospectos recientes",
        upstream_path: "/prospectos",
        encoding: BodyEncoding::None,
        required: &[],
        params: &[
            Param {
                name: "desde",
                default: ParamDefault::Static("SEMANA"),
                rule: ParamRule::Any,
            },
            Param {
                name: "hasta",
                default: ParamDefault::Static("HOY"),
                rule: ParamRule::Any,
            },
            Param {
                name: "cantidadRegistros",
                default: ParamDefault::Static("10"),
                rule: ParamRule::Integer,
            },
        ],
        body_defaults: &[],
        derive: None,
    },
    Endpoint {
        route: BUSCAR_CONTACTOS,
        verb: Verb::Get,
        summary: "Buscar contactos por nombre, correo o teléfono",
        upstream_path: "/contactos",
        encoding: BodyEncoding::None,
        required: &["buscar"],
        params: &[
            Param {
                name: "buscar",
                default: ParamDefault::None,
                rule: ParamRule::Any,
            },
            Param {
                name: "cantidadRegistros",
                default: ParamDefault::Static("10"),
                rule: ParamRule::Integer,
            },
        ],
        body_defaults: &[],
        derive: None,
    },
    Endpoint {
        route: CREAR_OPORTUNIDAD,
        verb: Verb::Post,
        summary: "Crear oportunidad de venta para un prospecto",
        upstream_path: "/oportunidades",
        encoding: BodyEncoding::Form,
        required: &["concepto", "tkProspecto", "monto", "comision"],
        params: &[],
        body_defaults: &[],
        derive: Some(derive_commission as Derive),
    },
];

pub fn find(route: &str) -> Option<&'static Endpoint> {
    ENDPOINTS.iter().find(|ep| ep.route == route)
}

impl Endpoint {
    /// Shapes caller input into an outbound request. Missing required fields
    /// are reported before any other check on the input.
    pub fn build(
        &self,
        query: &HashMap<String, String>,
        body: Option<Map<String, Value>>,
    ) -> Result<ForwardRequest, ForwardError> {
        let missing = self.missing_fields(query, body.as_ref());
        if !missing.is_empty() {
            warn!("Rejecting {} request, missing fields: {:?}", self.route, missing);
            return Err(ForwardError::MissingFields { missing });
        }

        let query = self.resolve_params(query)?;

        let body = match (self.encoding, body) {
            (BodyEncoding::None, _) => None,
            (_, body) => {
                let mut body = body.unwrap_or_default();
                ensure_primitives(&body)?;
                body.retain(|_, v| !v.is_null());
                for (key, value) in self.body_defaults {
                    body.entry(key.to_string())
                        .or_insert_with(|| Value::String(value.to_string()));
                }
                if let Some(derive) = self.derive {
                    derive(&mut body)?;
                }
                Some(body)
            }
        };

        Ok(ForwardRequest {
            verb: self.verb,
            path: self.upstream_path.to_string(),
            query,
            body,
            encoding: self.encoding,
            required: self.required.to_vec(),
        })
    }

    /// Required fields absent or blank in both the body and the query.
    pub fn missing_fields(
        &self,
        query: &HashMap<String, String>,
        body: Option<&Map<String, Value>>,
    ) -> Vec<String> {
        self.required
            .iter()
            .filter(|name| match body.and_then(|body| body.get(**name)) {
                Some(value) => is_blank(value),
                None => query.get(**name).map_or(true, |v| v.trim().is_empty()),
            })
            .map(|name| name.to_string())
            .collect()
    }

    fn resolve_params(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<BTreeMap<String, String>, ForwardError> {
        let mut resolved = BTreeMap::new();
        for param in self.params {
            let supplied = query
                .get(param.name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty());
            let value = match (supplied, param.default) {
                (Some(v), _) => {
                    check_rule(param, v)?;
                    v.to_string()
                }
                (None, ParamDefault::Static(v)) => v.to_string(),
                (None, ParamDefault::CurrentYear) => chrono::Local::now().year().to_string(),
                (None, ParamDefault::None) => continue,
            };
            resolved.insert(param.name.to_string(), value);
        }
        Ok(resolved)
    }
}

fn check_rule(param: &Param, value: &str) -> Result<(), ForwardError> {
    match param.rule {
        ParamRule::Any => Ok(()),
        ParamRule::Integer => value
            .parse::<u32>()
            .map(|_| ())
            .map_err(|_| ForwardError::invalid(param.name, "expected a non-negative integer")),
        ParamRule::Year => {
            if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
                Ok(())
            } else {
                Err(ForwardError::invalid(param.name, "expected a 4-digit year"))
            }
        }
        ParamRule::OneOf(allowed) => {
            if allowed.contains(&value) {
                Ok(())
            } else {
                Err(ForwardError::invalid(
                    param.name,
                    format!("expected one of {}", allowed.join(", ")),
                ))
            }
        }
    }
}

fn ensure_primitives(body: &Map<String, Value>) -> Result<(), ForwardError> {
    match body
        .iter()
        .find(|(_, v)| matches!(v, Value::Array(_) | Value::Object(_)))
    {
        Some((key, _)) => Err(ForwardError::invalid(
            key.as_str(),
            "expected a string, number or boolean",
        )),
        None => Ok(()),
    }
}

/// `comisionMonto = monto * comision`, rounded to cents.
fn derive_commission(body: &mut Map<String, Value>) -> Result<(), ForwardError> {
    let (Some(amount), Some(rate)) = (
        numeric_field(body, "monto")?,
        numeric_field(body, "comision")?,
    ) else {
        return Ok(());
    };

    let commission = (amount * rate * 100.0).round() / 100.0;
    body.insert("comisionMonto".to_string(), number_value(commission));
    Ok(())
}

fn numeric_field(body: &Map<String, Value>, name: &str) -> Result<Option<f64>, ForwardError> {
    let value = match body.get(name) {
        Some(v) if !is_blank(v) => v,
        _ => return Ok(None),
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(ForwardError::invalid(name, "expected a number")),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
