pub mod access_control;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod forwarding;
pub mod handlers;
pub mod logging;
pub mod mcp;
pub mod models;

use axum::routing::{get, post};
use axum::Router;
use config::Config;
use forwarding::Forwarder;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: Config,
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let forwarder = Forwarder::new(&config)?;
        Ok(Self { config, forwarder })
    }
}

pub fn app(app_state: Arc<AppState>) -> Router {
    let router = endpoints::ENDPOINTS
        .iter()
        .fold(Router::new(), |router, endpoint| {
            router.route(endpoint.route, handlers::endpoint_route(endpoint))
        });

    router
        .route("/", get(handlers::root_handler))
        .route("/openapi.yaml", get(handlers::openapi_handler))
        .route("/test-upnify", get(handlers::test_connection_handler))
        .route("/get_manifest", get(mcp::manifest_handler))
        .route("/list_resources", post(mcp::list_resources_handler))
        .route("/run_tool", post(mcp::run_tool_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
