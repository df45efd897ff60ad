//! Locating the request envelope inside free-form model output

use std::sync::LazyLock;

use regex::Regex;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced json pattern")
});

/// Returns the JSON object text in `output`: the first fenced block when there is one,
/// otherwise the span from the first `{` to the last `}`.
pub fn extract_json(output: &str) -> Option<&str> {
    if let Some(block) = FENCED_JSON.captures(output).and_then(|caps| caps.get(1)) {
        return Some(block.as_str());
    }

    let start = output.find('{')?;
    let end = output.rfind('}')?;
    (start < end).then(|| &output[start..=end])
}
