//! Parameter extraction shared by the tools

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::ToolError;

/// Stand-in for an identifier the caller could not supply.
pub const UNKNOWN: &str = "Unknown";
pub const DEFAULT_NUM_RESULTS: u32 = 5;

/// Deserializes a sub-request's `params` into a tool's parameter struct. Absent params
/// behave like an empty mapping.
pub fn parse_params<T: DeserializeOwned>(
    params: Option<&Map<String, Value>>,
) -> Result<T, ToolError> {
    let params = params.cloned().unwrap_or_default();
    serde_json::from_value(Value::Object(params))
        .map_err(|err| ToolError::InvalidParams(err.to_string()))
}

pub fn require_text(field: &str, value: &str) -> Result<String, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidParams(format!(
            "`{field}` must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn risk_news_query(company: &str) -> String {
    format!("{company} lawsuit fraud OR scandal OR investigation OR controversy")
}
