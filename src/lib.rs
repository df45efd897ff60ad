use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod protocol;
pub mod upstream;

use protocol::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub api_token: Option<Arc<str>>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(api_token: Option<String>, dispatcher: Dispatcher) -> Self {
        Self {
            api_token: api_token.map(Arc::<str>::from),
            dispatcher: Arc::new(dispatcher),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            http::handlers::REQUESTS_PATH,
            post(http::handlers::requests_endpoint),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/dispatch", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
