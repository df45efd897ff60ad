//! Batch dispatcher
//!
//! Routes every sub-request of an envelope to its tool, prompt or resource handler and
//! assembles the correlated response. Sub-requests run through a bounded stream:
//! `max_concurrency = 1` processes the batch strictly in sequence, larger values keep that
//! many handlers in flight. Items settle in completion order and are put back into input
//! order, so a strict-mode failure aborts the batch as soon as it settles.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    time::{Duration, Instant},
};

use futures::{stream, FutureExt, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::domain::{
    prompts::{PromptRegistry, LIST_PROMPTS},
    resources::ResourceRegistry,
    tools::ToolRegistry,
};
use crate::errors::{error_marker, ToolError};
use crate::protocol::envelope::{
    Namespace, RequestEnvelope, ResponseEnvelope, SubRequest, SubResult,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// A failing item carries an error marker; the rest of the batch completes.
    #[default]
    Isolate,
    /// The first failure aborts the batch and cancels in-flight siblings.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownMethodPolicy {
    #[default]
    Ignore,
    Report,
}

impl FailurePolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "isolate" => Some(Self::Isolate),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

impl UnknownMethodPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ignore" => Some(Self::Ignore),
            "report" => Some(Self::Report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub failure: FailurePolicy,
    pub unknown_method: UnknownMethodPolicy,
    pub max_concurrency: usize,
    /// Per sub-request bound; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            failure: FailurePolicy::Isolate,
            unknown_method: UnknownMethodPolicy::Ignore,
            max_concurrency: 1,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

/// Batch-level failure, only raised under [`FailurePolicy::Strict`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("request `{id}` ({method}) failed: {source}")]
    Tool {
        id: String,
        method: String,
        source: ToolError,
    },
    #[error("request `{id}` addresses unknown method `{method}`")]
    UnknownMethod { id: String, method: String },
}

enum Outcome {
    Success(Vec<Value>),
    Unknown,
    Failed(ToolError),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Unknown => "unknown",
            Self::Failed(_) => "failure",
        }
    }
}

pub struct Dispatcher {
    tools: ToolRegistry,
    prompts: PromptRegistry,
    resources: ResourceRegistry,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(tools: ToolRegistry, resources: ResourceRegistry, policy: DispatchPolicy) -> Self {
        let prompts = PromptRegistry::new(tools.catalog());
        Self {
            tools,
            prompts,
            resources,
            policy,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub async fn dispatch(
        &self,
        envelope: RequestEnvelope,
    ) -> Result<ResponseEnvelope, DispatchError> {
        let RequestEnvelope { id, requests } = envelope;
        let envelope_id = id.as_deref();

        // Dropping the stream on the first `Err` cancels every sibling still in flight.
        let mut settled = stream::iter(requests.into_iter().enumerate().map(|(index, request)| {
            self.dispatch_one(envelope_id, request)
                .map(move |result| result.map(|item| (index, item)))
        }))
        .buffer_unordered(self.policy.max_concurrency.max(1))
        .try_collect::<Vec<_>>()
        .await?;

        settled.sort_unstable_by_key(|(index, _)| *index);
        let results = settled.into_iter().map(|(_, item)| item).collect();

        Ok(ResponseEnvelope { id, results })
    }

    async fn dispatch_one(
        &self,
        envelope_id: Option<&str>,
        request: SubRequest,
    ) -> Result<SubResult, DispatchError> {
        let started = Instant::now();
        let outcome = self.run_bounded(&request).await;

        info!(
            envelope_id = envelope_id.unwrap_or_default(),
            request_id = %request.id,
            method = %request.method,
            params = %redact_audit_params(request.params.as_ref()),
            outcome = outcome.label(),
            duration_ms = started.elapsed().as_millis() as u64,
            "dispatch audited"
        );

        let SubRequest { id, method, .. } = request;
        let strict = self.policy.failure == FailurePolicy::Strict;
        let results = match outcome {
            Outcome::Success(results) => results,
            Outcome::Unknown => match self.policy.unknown_method {
                UnknownMethodPolicy::Ignore => Vec::new(),
                UnknownMethodPolicy::Report if strict => {
                    return Err(DispatchError::UnknownMethod { id, method })
                }
                UnknownMethodPolicy::Report => vec![error_marker(
                    "unknown_method",
                    &format!("unknown method `{method}`"),
                )],
            },
            Outcome::Failed(source) if strict => {
                return Err(DispatchError::Tool { id, method, source })
            }
            Outcome::Failed(err) => vec![err.to_marker()],
        };

        Ok(SubResult { id, method, results })
    }

    /// Runs the handler under the configured timeout. A panicking handler is contained
    /// and reported as an unhandled failure of its own item.
    async fn run_bounded(&self, request: &SubRequest) -> Outcome {
        let guarded = AssertUnwindSafe(self.execute(request)).catch_unwind();
        let settled = match self.policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(settled) => settled,
                Err(_) => {
                    return Outcome::Failed(ToolError::Timeout {
                        after_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => guarded.await,
        };

        settled.unwrap_or_else(|panic| Outcome::Failed(ToolError::Unhandled(panic_message(panic))))
    }

    async fn execute(&self, request: &SubRequest) -> Outcome {
        let Some(address) = request.address() else {
            return Outcome::Unknown;
        };

        match address.namespace {
            Namespace::Tools => {
                let Some(tool) = self.tools.resolve(&address.name) else {
                    return Outcome::Unknown;
                };
                match self.tools.invoke(tool, request.params.as_ref()).await {
                    Ok(result) => Outcome::Success(vec![result]),
                    Err(err) => Outcome::Failed(err),
                }
            }
            Namespace::Prompt if address.name == LIST_PROMPTS => Outcome::Success(
                self.prompts
                    .list()
                    .into_iter()
                    .map(|name| Value::String(name.to_string()))
                    .collect(),
            ),
            Namespace::Prompt => match self.prompts.get(&address.name) {
                Ok(content) => Outcome::Success(vec![Value::String(content.to_string())]),
                Err(_) => Outcome::Unknown,
            },
            Namespace::Resources => {
                let Some(handler) = self.resources.resolve(&address.name) else {
                    return Outcome::Unknown;
                };
                match handler.read(request.action.as_deref().unwrap_or_default()).await {
                    Ok(results) => Outcome::Success(results),
                    Err(err) => Outcome::Failed(err),
                }
            }
            Namespace::Other(_) => Outcome::Unknown,
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

pub fn redact_audit_params(params: Option<&Map<String, Value>>) -> Value {
    params.map(redact_audit_map).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => redact_audit_map(map),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

fn redact_audit_map(map: &Map<String, Value>) -> Value {
    Value::Object(
        map.iter()
            .map(|(key, item)| {
                if is_sensitive_key(key) {
                    (key.clone(), Value::String("[REDACTED]".to_string()))
                } else {
                    (key.clone(), redact_audit_value(item))
                }
            })
            .collect(),
    )
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey" | "pass" | "mail_pass"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
