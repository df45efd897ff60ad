use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::{dispatcher::DispatchError, envelope::EnvelopeError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: String,
    },
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error("not found: {message}")]
    NotFound {
        code: &'static str,
        message: String,
    },
    #[error("upstream failure: {message}")]
    BadGateway {
        code: &'static str,
        message: String,
    },
    #[error("upstream timeout: {message}")]
    GatewayTimeout {
        code: &'static str,
        message: String,
    },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

/// Failure of a single tool invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable {
        service: &'static str,
        message: String,
    },
    #[error("timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("unhandled failure: {0}")]
    Unhandled(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl ToolError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service,
            message: message.into(),
        }
    }

    pub fn not_configured(service: &'static str) -> Self {
        Self::upstream(service, "not configured")
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "invalid_params",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Unhandled(_) => "unhandled_failure",
        }
    }

    /// The error marker placed in an item's `results` when failures are isolated.
    pub fn to_marker(&self) -> Value {
        error_marker(self.code(), &self.to_string())
    }
}

pub fn error_marker(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

impl From<EnvelopeError> for AppError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::MalformedEnvelope(_) => {
                Self::bad_request("malformed_envelope", err.to_string())
            }
            EnvelopeError::MalformedMethod { .. } => {
                Self::bad_request("malformed_method", err.to_string())
            }
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::UnknownMethod { .. } => Self::NotFound {
                code: "unknown_method",
                message,
            },
            DispatchError::Tool { source, .. } => match source {
                ToolError::InvalidParams(_) => Self::bad_request("invalid_params", message),
                ToolError::UpstreamUnavailable { .. } => Self::BadGateway {
                    code: "upstream_unavailable",
                    message,
                },
                ToolError::Timeout { .. } => Self::GatewayTimeout {
                    code: "timeout",
                    message,
                },
                ToolError::Unhandled(_) => Self::Internal {
                    code: "unhandled_failure",
                    message,
                },
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            Self::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, code, message.to_string())
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            Self::BadGateway { code, message } => (StatusCode::BAD_GATEWAY, code, message),
            Self::GatewayTimeout { code, message } => {
                (StatusCode::GATEWAY_TIMEOUT, code, message)
            }
            Self::Internal { code, message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}
