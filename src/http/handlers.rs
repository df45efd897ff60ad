use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::errors::AppError;
use crate::protocol::envelope::{decode_request, encode_response};
use crate::AppState;

pub const REQUESTS_PATH: &str = "/requests";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub requests_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        requests_endpoint: REQUESTS_PATH,
    })
}

/// Envelope-level malformation is rejected before anything runs. Under the default
/// isolate policy every decoded envelope answers 200.
pub async fn requests_endpoint(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let envelope = decode_request(&body)?;
    debug!(
        envelope_id = envelope.id.as_deref().unwrap_or_default(),
        requests = envelope.requests.len(),
        "envelope decoded"
    );

    let response = state.dispatcher.dispatch(envelope).await?;
    let body = encode_response(&response)
        .map_err(|err| AppError::internal(format!("response encoding failed: {err}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
