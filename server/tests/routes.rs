use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Datelike;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use upnifia_server::config::Config;
use upnifia_server::{app, AppState};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn router(upstream: &str, token: Option<&str>) -> Router {
    let upstream = upstream.to_string();
    let token = token.map(str::to_string);
    let config = Config::from_lookup(move |key| match key {
        "UPNIFY_API_URL" => Some(upstream.clone()),
        "UPNIFY_TOKEN" => token.clone(),
        "PUBLIC_URL" => Some("https://upnifia.example.com".to_string()),
        _ => None,
    })
    .unwrap();
    app(Arc::new(AppState::new(config).unwrap()))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_full_prospect_passes_upstream_reply_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prospectos"))
        .and(header("token", "server-tk"))
        .and(body_string_contains("apellidos=Lopez"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "X1" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(post_json(
            "/crear-prospecto-completo",
            json!({ "nombre": "Ana", "apellidos": "Lopez", "correo": "a@b.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(read_json(response).await, json!({ "id": "X1" }));
}

#[tokio::test]
async fn missing_required_field_is_400_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(post_json(
            "/crear-prospecto-completo",
            json!({ "nombre": "Ana", "apellidos": "Lopez" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "VALIDATION");
    assert_eq!(body["missing"], json!(["correo"]));
}

#[tokio::test]
async fn sales_report_defaults_build_the_upstream_url() {
    let server = MockServer::start().await;
    let year = chrono::Local::now().year().to_string();
    Mock::given(method("GET"))
        .and(path("/reportesnv/ventas/realizadas"))
        .and(query_param("agrupacion", "1"))
        .and(query_param("periodicidad", "4"))
        .and(query_param("anio", year.as_str()))
        .and(query_param("impuestos", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "mes": 1, "total": 10 }])))
        .expect(1)
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(get("/consultar-ventas"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await[0]["total"], 10);
}

#[tokio::test]
async fn opportunity_forwards_derived_commission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oportunidades"))
        .and(body_string_contains("comisionMonto=10"))
        .and(body_string_contains("monto=100"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "tkOportunidad": "O-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(post_json(
            "/crear-oportunidad",
            json!({ "concepto": "Licencias", "tkProspecto": "P-1", "monto": 100, "comision": 0.1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(read_json(response).await["tkOportunidad"], "O-1");
}

#[tokio::test]
async fn caller_bearer_token_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contactos"))
        .and(header("token", "caller-tk"))
        .and(query_param("buscar", "ana"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::builder()
        .uri("/buscar-contactos?buscar=ana")
        .header("Authorization", "Bearer caller-tk")
        .body(Body::empty())
        .unwrap();
    let response = router(&server.uri(), None).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn no_credential_is_rejected_before_forwarding() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let response = router(&server.uri(), None)
        .oneshot(get("/consultar-prospectos"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["missing"], json!(["token"]));
}

#[tokio::test]
async fn non_json_upstream_reply_is_upstream_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(500)))
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(get("/consultar-cobros-pendientes"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "UPSTREAM_FORMAT");
    assert!(body["rawData"].as_str().unwrap().len() <= 200);
}

#[tokio::test]
async fn unreachable_upstream_is_connectivity_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let response = router(&format!("http://127.0.0.1:{}", port), Some("server-tk"))
        .oneshot(get("/test-upnify"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "CONNECTIVITY");
    assert!(body["code"].is_string());
}

#[tokio::test]
async fn connection_check_reports_prospect_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prospectos"))
        .and(query_param("desde", "HOY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }, { "id": 2 }])))
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(get("/test-upnify"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["prospectos"], 2);
}

#[tokio::test]
async fn root_lists_every_table_route() {
    let response = router("http://127.0.0.1:9", None)
        .oneshot(get("/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "OK");
    let endpoints: Vec<&str> = body["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    for ep in upnifia_server::endpoints::ENDPOINTS {
        assert!(
            endpoints.iter().any(|line| line.contains(ep.route)),
            "{} not listed",
            ep.route
        );
    }
}

#[tokio::test]
async fn openapi_document_advertises_public_url() {
    let response = router("http://127.0.0.1:9", None)
        .oneshot(get("/openapi.yaml"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/yaml"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("url: https://upnifia.example.com"));
    assert!(text.contains("/crear-oportunidad:"));
}

#[tokio::test]
async fn list_resources_wraps_upstream_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prospectos"))
        .and(query_param("hasta", "HOY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "nombre": "Ana" }])))
        .expect(1)
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(post_json("/list_resources", json!({ "name": "prospectos_diarios" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["resource"], "prospectos_diarios");
    assert_eq!(body["data"][0]["nombre"], "Ana");
}

#[tokio::test]
async fn run_tool_creates_prospect_with_core_fields_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prospectos"))
        .and(body_string_contains("nombre=Ana"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tkProspecto": "P-9" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(post_json(
            "/run_tool",
            json!({
                "name": "crear_prospecto",
                "input": { "nombre": "Ana", "apellidos": "Lopez", "correo": "a@b.com", "empresa": "Tech" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["result"]["tkProspecto"], "P-9");

    let received = server.received_requests().await.unwrap();
    let sent = String::from_utf8(received[0].body.clone()).unwrap();
    assert!(!sent.contains("empresa"));
}

#[tokio::test]
async fn unknown_tool_is_404() {
    let response = router("http://127.0.0.1:9", Some("server-tk"))
        .oneshot(post_json("/run_tool", json!({ "name": "borrar_todo", "input": {} })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["kind"], "NOT_FOUND");
}

#[tokio::test]
async fn casual_greeting_needs_no_upstream() {
    let response = router("http://127.0.0.1:9", None)
        .oneshot(post_json(
            "/run_tool",
            json!({ "name": "mensaje_cliente_casual", "input": { "nombre": "Ana" } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["result"].as_str().unwrap().contains("Ana"));
}

#[tokio::test]
async fn required_fields_are_reported_before_malformed_ones() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(post_json(
            "/crear-oportunidad",
            json!({ "monto": "cien", "comision": 0.1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "VALIDATION");
    assert_eq!(body["missing"], json!(["concepto", "tkProspecto"]));
}

#[tokio::test]
async fn non_bearer_authorization_is_rejected_without_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let request = Request::builder()
        .uri("/consultar-prospectos")
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "VALIDATION");
    assert_eq!(body["field"], "Authorization");
}

#[tokio::test]
async fn run_tool_without_name_is_a_validation_error() {
    let response = router("http://127.0.0.1:9", Some("server-tk"))
        .oneshot(post_json("/run_tool", json!({ "input": { "nombre": "Ana" } })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "VALIDATION");
    assert_eq!(body["missing"], json!(["name"]));
}

#[tokio::test]
async fn list_resources_without_name_is_a_validation_error() {
    let response = router("http://127.0.0.1:9", Some("server-tk"))
        .oneshot(post_json("/list_resources", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["missing"], json!(["name"]));
}

#[tokio::test]
async fn list_resources_accepts_a_body_without_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reportesnv/ventas/realizadas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/list_resources")
        .body(Body::from(json!({ "name": "ventas_mensuales" }).to_string()))
        .unwrap();
    let response = router(&server.uri(), Some("server-tk"))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["resource"], "ventas_mensuales");
}

#[tokio::test]
async fn malformed_tool_call_body_is_a_json_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/run_tool")
        .body(Body::from("name=crear_prospecto"))
        .unwrap();
    let response = router("http://127.0.0.1:9", Some("server-tk"))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "VALIDATION");
    assert_eq!(body["field"], "body");
}
