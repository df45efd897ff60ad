//! Batch envelope codec
//!
//! Decodes inbound `{id, requests}` batches, validating the `namespace/name` address of
//! every sub-request, and encodes outbound `{id, results}` batches.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("malformed method `{method}` at requests[{index}]: expected `<namespace>/<name>`")]
    MalformedMethod { index: usize, method: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub requests: Vec<SubRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRequest {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    /// Resource actions, only meaningful in the `resources` namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: Option<String>,
    pub results: Vec<SubResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResult {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub results: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    Tools,
    Prompt,
    Resources,
    /// Well-formed but unregistered; routes like an unknown method.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodAddress {
    pub namespace: Namespace,
    pub name: String,
}

impl Namespace {
    pub fn from_segment(segment: &str) -> Self {
        match segment {
            "tools" => Self::Tools,
            "prompt" => Self::Prompt,
            "resources" => Self::Resources,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Tools => "tools",
            Self::Prompt => "prompt",
            Self::Resources => "resources",
            Self::Other(segment) => segment,
        }
    }
}

impl MethodAddress {
    /// Splits `method` into exactly two non-empty segments on `/`.
    pub fn parse(method: &str) -> Option<Self> {
        let mut segments = method.trim().split('/');
        let namespace = segments.next().filter(|segment| !segment.is_empty())?;
        let name = segments.next().filter(|segment| !segment.is_empty())?;
        if segments.next().is_some() {
            return None;
        }

        Some(Self {
            namespace: Namespace::from_segment(namespace),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for MethodAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace.as_str(), self.name)
    }
}

impl SubRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: None,
            action: None,
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn address(&self) -> Option<MethodAddress> {
        MethodAddress::parse(&self.method)
    }
}

pub fn decode_request(raw: &[u8]) -> Result<RequestEnvelope, EnvelopeError> {
    let payload: Value = serde_json::from_slice(raw)
        .map_err(|err| EnvelopeError::MalformedEnvelope(format!("invalid JSON: {err}")))?;
    request_from_value(payload)
}

pub fn request_from_value(payload: Value) -> Result<RequestEnvelope, EnvelopeError> {
    let Value::Object(mut envelope) = payload else {
        return Err(malformed("envelope must be a JSON object"));
    };

    let id = match envelope.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id),
        Some(_) => return Err(malformed("envelope id must be a string")),
    };

    let items = match envelope.remove("requests") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(malformed("requests must be a sequence")),
        None => return Err(malformed("requests is missing")),
    };

    let requests = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| decode_sub_request(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RequestEnvelope { id, requests })
}

fn decode_sub_request(index: usize, item: Value) -> Result<SubRequest, EnvelopeError> {
    let Some(object) = item.as_object() else {
        return Err(malformed(format!("requests[{index}] must be an object")));
    };

    for field in ["id", "method"] {
        match object.get(field) {
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(malformed(format!(
                    "requests[{index}].{field} must be a string"
                )))
            }
            None => return Err(malformed(format!("requests[{index}] lacks `{field}`"))),
        }
    }

    let request: SubRequest = serde_json::from_value(item)
        .map_err(|err| malformed(format!("requests[{index}]: {err}")))?;

    if request.address().is_none() {
        return Err(EnvelopeError::MalformedMethod {
            index,
            method: request.method,
        });
    }

    Ok(request)
}

pub fn encode_request(envelope: &RequestEnvelope) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(envelope)
}

pub fn decode_response(raw: &[u8]) -> Result<ResponseEnvelope, EnvelopeError> {
    serde_json::from_slice(raw).map_err(|err| malformed(format!("invalid response: {err}")))
}

pub fn encode_response(envelope: &ResponseEnvelope) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(envelope)
}

fn malformed(message: impl Into<String>) -> EnvelopeError {
    EnvelopeError::MalformedEnvelope(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Result<RequestEnvelope, EnvelopeError> {
        decode_request(value.to_string().as_bytes())
    }

    #[test]
    fn decodes_mixed_batch_in_order() {
        let envelope = decode(json!({
            "id": "r1",
            "requests": [
                {"id": "a", "method": "tools/websearch", "params": {"query": "Acme Corp profile"}},
                {"id": "b", "method": "prompt/main_prompt"},
                {"id": "c", "method": "resources/filings", "action": ["refresh"]}
            ]
        }))
        .expect("valid envelope");

        assert_eq!(envelope.id.as_deref(), Some("r1"));
        let ids: Vec<_> = envelope.requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(
            envelope.requests[0].params.as_ref().unwrap()["query"],
            "Acme Corp profile"
        );
        assert!(envelope.requests[1].params.is_none());
        assert_eq!(envelope.requests[2].action, Some(vec![json!("refresh")]));
    }

    #[test]
    fn envelope_id_is_optional() {
        let envelope = decode(json!({"requests": []})).expect("valid envelope");
        assert_eq!(envelope.id, None);
        assert!(envelope.requests.is_empty());
    }

    #[test]
    fn rejects_missing_or_non_sequence_requests() {
        let err = decode(json!({"id": "x"})).expect_err("missing requests");
        assert!(matches!(err, EnvelopeError::MalformedEnvelope(_)));

        let err = decode(json!({"id": "x", "requests": {"id": "a"}})).expect_err("not a list");
        assert_eq!(
            err,
            EnvelopeError::MalformedEnvelope("requests must be a sequence".to_string())
        );
    }

    #[test]
    fn rejects_invalid_json() {
        let err = decode_request(b"{").expect_err("invalid json");
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn rejects_sub_request_without_id_or_method() {
        let err = decode(json!({"requests": [{"method": "tools/list"}]})).expect_err("no id");
        assert_eq!(
            err,
            EnvelopeError::MalformedEnvelope("requests[0] lacks `id`".to_string())
        );

        let err = decode(json!({"requests": [{"id": "a"}]})).expect_err("no method");
        assert!(matches!(err, EnvelopeError::MalformedEnvelope(_)));

        let err = decode(json!({"requests": [{"id": 7, "method": "tools/list"}]}))
            .expect_err("numeric id");
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn rejects_params_that_are_not_a_mapping() {
        let err = decode(json!({
            "requests": [{"id": "a", "method": "tools/websearch", "params": ["q"]}]
        }))
        .expect_err("params list");
        assert!(matches!(err, EnvelopeError::MalformedEnvelope(_)));
    }

    #[test]
    fn rejects_methods_without_exactly_two_segments() {
        for method in ["websearch", "tools/", "/list", "tools/a/b", ""] {
            let err = decode(json!({
                "requests": [
                    {"id": "ok", "method": "tools/list"},
                    {"id": "bad", "method": method}
                ]
            }))
            .expect_err("malformed method");
            assert_eq!(
                err,
                EnvelopeError::MalformedMethod {
                    index: 1,
                    method: method.to_string()
                }
            );
        }
    }

    #[test]
    fn unregistered_namespace_is_well_formed() {
        let envelope = decode(json!({"requests": [{"id": "a", "method": "foo/bar"}]}))
            .expect("two segments decode");
        let address = envelope.requests[0].address().expect("address");
        assert_eq!(address.namespace, Namespace::Other("foo".to_string()));
        assert_eq!(address.to_string(), "foo/bar");
    }

    #[test]
    fn method_parse_trims_surrounding_whitespace() {
        let address = MethodAddress::parse(" tools/news ").expect("address");
        assert_eq!(address.namespace, Namespace::Tools);
        assert_eq!(address.name, "news");
    }

    #[test]
    fn request_encoding_preserves_fields_and_order() {
        let raw = json!({
            "id": "r1",
            "requests": [
                {"id": "2", "method": "tools/news", "params": {"name": "Acme"}},
                {"id": "1", "method": "prompt/list"}
            ]
        });
        let envelope = decode(raw.clone()).expect("valid envelope");
        let encoded: Value =
            serde_json::from_slice(&encode_request(&envelope).expect("encoded request"))
                .expect("json output");
        assert_eq!(encoded, raw);
    }

    #[test]
    fn response_decodes_what_it_encodes() {
        let response = ResponseEnvelope {
            id: Some("x".to_string()),
            results: vec![
                SubResult {
                    id: "1".to_string(),
                    method: "prompt/list".to_string(),
                    results: vec![json!("request_template"), json!("main_prompt")],
                },
                SubResult {
                    id: "2".to_string(),
                    method: "tools/bogus".to_string(),
                    results: vec![],
                },
            ],
        };

        let encoded = encode_response(&response).expect("encoded response");
        let decoded = decode_response(&encoded).expect("valid response");
        assert_eq!(decoded, response);
    }
}
