//! Client orchestration loop
//!
//! Fetches the main prompt from the dispatcher, asks the language model to turn a user
//! query into a request envelope, submits that envelope and has the model summarise the
//! correlated results.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::ToolError;
use crate::protocol::envelope::{
    decode_response, encode_request, request_from_value, EnvelopeError, RequestEnvelope,
    ResponseEnvelope, SubRequest,
};
use crate::upstream::LanguageModel;

pub mod extract;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5001/requests";
const MAIN_PROMPT_METHOD: &str = "prompt/main_prompt";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server answered {status}: {body}")]
    Server { status: u16, body: String },
    #[error("server response carried no main prompt")]
    MissingPrompt,
    #[error("language model failed: {0}")]
    Model(#[from] ToolError),
    #[error("no JSON object found in the model output")]
    NoJson,
    #[error("could not decode JSON from the model output: {0}")]
    InvalidJson(String),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("failed to encode JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait EnvelopeTransport: Send + Sync {
    async fn send(&self, envelope: &RequestEnvelope) -> Result<ResponseEnvelope, ClientError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_token,
        }
    }
}

#[async_trait]
impl EnvelopeTransport for HttpTransport {
    async fn send(&self, envelope: &RequestEnvelope) -> Result<ResponseEnvelope, ClientError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(encode_request(envelope)?);
        if let Some(token) = self.api_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(ClientError::Server {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(decode_response(&body)?)
    }
}

/// Outcome of one orchestration run.
#[derive(Debug, Clone)]
pub struct Investigation {
    pub request: RequestEnvelope,
    pub response: ResponseEnvelope,
    pub answer: String,
}

pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    transport: Arc<dyn EnvelopeTransport>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, transport: Arc<dyn EnvelopeTransport>) -> Self {
        Self { model, transport }
    }

    pub async fn run(&self, query: &str) -> Result<Investigation, ClientError> {
        let main_prompt = self.fetch_main_prompt().await?;

        let generated = self
            .model
            .complete(&request_prompt(&main_prompt, query))
            .await?;
        debug!(output_chars = generated.len(), "model generated request");

        let request = parse_generated_request(&generated)?;
        info!(
            envelope_id = request.id.as_deref().unwrap_or_default(),
            requests = request.requests.len(),
            "submitting generated envelope"
        );
        let response = self.transport.send(&request).await?;

        let answer = self.model.complete(&summary_prompt(query, &response)?).await?;

        Ok(Investigation {
            request,
            response,
            answer,
        })
    }

    async fn fetch_main_prompt(&self) -> Result<String, ClientError> {
        let envelope = RequestEnvelope {
            id: Some(format!("prompt-request-{}", Uuid::new_v4())),
            requests: vec![SubRequest::new(
                format!("prompt-main-{}", Uuid::new_v4()),
                MAIN_PROMPT_METHOD,
            )],
        };

        let response = self.transport.send(&envelope).await?;
        response
            .results
            .first()
            .and_then(|item| item.results.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ClientError::MissingPrompt)
    }
}

pub fn parse_generated_request(output: &str) -> Result<RequestEnvelope, ClientError> {
    let candidate = extract::extract_json(output).ok_or(ClientError::NoJson)?;
    let payload: Value = serde_json::from_str(candidate)
        .map_err(|err| ClientError::InvalidJson(format!("{err}: {candidate}")))?;
    Ok(request_from_value(payload)?)
}

fn request_prompt(main_prompt: &str, query: &str) -> String {
    format!("{main_prompt}\n\nHere is the user's query:\n---{query}\n---")
}

fn summary_prompt(query: &str, response: &ResponseEnvelope) -> serde_json::Result<String> {
    let results = serde_json::to_string_pretty(response)?;
    Ok(format!(
        "Based on the original query and the results from the tools, provide a comprehensive answer.

Original User Query:
---
{query}
---

Tool Results:
---
{results}
---

Final Answer:
"
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::domain::{resources::ResourceRegistry, tools::ToolRegistry};
    use crate::{build_app, AppState};
    use crate::protocol::dispatcher::{DispatchPolicy, Dispatcher};
    use crate::upstream::testing::Stubs;

    /// Replays scripted completions in order and records every prompt.
    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str) -> Result<String, ToolError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(prompt.to_string());
            self.replies
                .lock()
                .expect("replies lock")
                .pop()
                .ok_or_else(|| ToolError::upstream("language model", "script exhausted"))
        }
    }

    /// Routes envelopes straight into an in-process dispatcher.
    struct InProcess {
        dispatcher: Dispatcher,
        sent: Mutex<Vec<RequestEnvelope>>,
    }

    impl InProcess {
        fn new() -> Self {
            Self {
                dispatcher: Dispatcher::new(
                    ToolRegistry::new(Stubs::new().upstreams()),
                    ResourceRegistry::new(),
                    DispatchPolicy::default(),
                ),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EnvelopeTransport for InProcess {
        async fn send(&self, envelope: &RequestEnvelope) -> Result<ResponseEnvelope, ClientError> {
            self.sent.lock().expect("sent lock").push(envelope.clone());
            self.dispatcher
                .dispatch(envelope.clone())
                .await
                .map_err(|err| ClientError::Transport(err.to_string()))
        }
    }

    #[tokio::test]
    async fn runs_full_investigation() {
        let generated = r#"Here is the plan:
```json
{"id": "inv-1", "requests": [
  {"id": "a", "method": "tools/financial_descriptor", "params": {"ticker": "ACME"}},
  {"id": "b", "method": "tools/news", "params": {"name": "Acme"}}
]}
```"#;
        let model = Arc::new(ScriptedModel::new(&[generated, "Acme looks healthy."]));
        let transport = Arc::new(InProcess::new());
        let orchestrator = Orchestrator::new(model.clone(), transport.clone());

        let investigation = orchestrator.run("Is Acme a safe partner?").await.expect("run");

        assert_eq!(investigation.answer, "Acme looks healthy.");
        assert_eq!(investigation.request.id.as_deref(), Some("inv-1"));
        assert_eq!(investigation.response.results.len(), 2);
        assert_eq!(
            investigation.response.results[0].results,
            [json!("Company: ACME\n\nNot found")]
        );

        let sent = transport.sent.lock().expect("sent lock").clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].requests[0].method, "prompt/main_prompt");
        assert!(sent[0]
            .id
            .as_deref()
            .is_some_and(|id| id.starts_with("prompt-request-")));

        let prompts = model.prompts();
        assert!(prompts[0].contains("**User Query** :"));
        assert!(prompts[0].ends_with("Here is the user's query:\n---Is Acme a safe partner?\n---"));
        assert!(prompts[1].contains("Original User Query:\n---\nIs Acme a safe partner?"));
        assert!(prompts[1].contains("\"id\": \"inv-1\""));
    }

    #[tokio::test]
    async fn model_output_without_json_fails() {
        let model = Arc::new(ScriptedModel::new(&["I cannot help with that."]));
        let orchestrator = Orchestrator::new(model, Arc::new(InProcess::new()));

        let err = orchestrator.run("anything").await.expect_err("no json");
        assert!(matches!(err, ClientError::NoJson));
    }

    #[test]
    fn generated_envelope_is_validated() {
        let generated = r#"{"id": "x", "requests": [{"id": "1", "method": "websearch"}]}"#;
        let err = parse_generated_request(generated).expect_err("malformed method");
        assert!(matches!(
            err,
            ClientError::Envelope(EnvelopeError::MalformedMethod { index: 0, .. })
        ));

        let err = parse_generated_request("{not json}").expect_err("invalid json");
        assert!(matches!(err, ClientError::InvalidJson(_)));
    }

    #[tokio::test]
    async fn missing_prompt_is_reported() {
        struct Empty;

        #[async_trait]
        impl EnvelopeTransport for Empty {
            async fn send(
                &self,
                envelope: &RequestEnvelope,
            ) -> Result<ResponseEnvelope, ClientError> {
                Ok(ResponseEnvelope {
                    id: envelope.id.clone(),
                    results: Vec::new(),
                })
            }
        }

        let orchestrator = Orchestrator::new(Arc::new(ScriptedModel::new(&[])), Arc::new(Empty));
        let err = orchestrator.run("anything").await.expect_err("no prompt");
        assert!(matches!(err, ClientError::MissingPrompt));
    }

    const TOKEN: &str = "token-1234567890ab";

    /// Serves the dispatcher router on an ephemeral loopback port.
    async fn serve(api_token: Option<&str>) -> String {
        let dispatcher = Dispatcher::new(
            ToolRegistry::new(Stubs::new().upstreams()),
            ResourceRegistry::new(),
            DispatchPolicy::default(),
        );
        let app = build_app(AppState::new(api_token.map(str::to_string), dispatcher));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .await
                .expect("serve router");
        });
        format!("http://{addr}/requests")
    }

    fn loopback_client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("http client")
    }

    fn prompt_list_envelope() -> RequestEnvelope {
        RequestEnvelope {
            id: Some("env-1".to_string()),
            requests: vec![SubRequest::new("1", "prompt/list")],
        }
    }

    #[tokio::test]
    async fn http_transport_round_trips_with_bearer_token() {
        let url = serve(Some(TOKEN)).await;
        let transport = HttpTransport::new(loopback_client(), url, Some(TOKEN.to_string()));

        let response = transport
            .send(&prompt_list_envelope())
            .await
            .expect("round trip");

        assert_eq!(response.id.as_deref(), Some("env-1"));
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].id, "1");
        assert_eq!(
            response.results[0].results,
            [json!("request_template"), json!("main_prompt")]
        );
    }

    #[tokio::test]
    async fn http_transport_surfaces_rejected_token() {
        let url = serve(Some(TOKEN)).await;

        for api_token in [None, Some("wrong-token".to_string())] {
            let transport = HttpTransport::new(loopback_client(), url.clone(), api_token);
            let err = transport
                .send(&prompt_list_envelope())
                .await
                .expect_err("unauthorized");

            match err {
                ClientError::Server { status, body } => {
                    assert_eq!(status, 401);
                    assert!(body.contains("_token"), "{body}");
                }
                other => panic!("expected server error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn http_transport_surfaces_malformed_envelope() {
        let url = serve(None).await;
        let transport = HttpTransport::new(loopback_client(), url, None);
        let envelope = RequestEnvelope {
            id: Some("env-2".to_string()),
            requests: vec![SubRequest::new("1", "websearch")],
        };

        let err = transport.send(&envelope).await.expect_err("bad request");

        match err {
            ClientError::Server { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("malformed_method"), "{body}");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn orchestrator_runs_over_http() {
        let url = serve(Some(TOKEN)).await;
        let generated = r#"{"id": "inv-2", "requests": [{"id": "a", "method": "tools/list"}]}"#;
        let model = Arc::new(ScriptedModel::new(&[generated, "Catalog reviewed."]));
        let transport = Arc::new(HttpTransport::new(
            loopback_client(),
            url,
            Some(TOKEN.to_string()),
        ));

        let investigation = Orchestrator::new(model, transport)
            .run("What can you do?")
            .await
            .expect("run");

        assert_eq!(investigation.answer, "Catalog reviewed.");
        let catalog = investigation.response.results[0].results[0]
            .as_str()
            .expect("catalog text");
        assert!(catalog.contains("name : \"websearch\""));
    }
}
