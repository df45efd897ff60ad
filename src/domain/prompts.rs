//! Prompt registry
//!
//! Static prompt assets served to the client. `main_prompt` instructs the language model
//! to translate a user query into a request envelope and embeds the tool catalog, so it
//! is rendered once when the registry is built.

use thiserror::Error;

pub const LIST_PROMPTS: &str = "list";

pub const REQUEST_TEMPLATE: &str = r#"{
    "id": "<id>",
    "requests": [
        {
            "id": "<request_id>",
            "method": "tools/<tool_name>",
            "params": {
                "<param1>": "<value1>",
                "<param2>": "<value2>"
            }
        },
        {
            "id": "<request_id>",
            "method": "tools/<tool_name>",
            "params": {
                "<param1>": "<value1>"
            }
        }
    ]
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptName {
    RequestTemplate,
    MainPrompt,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("unknown prompt `{0}`")]
    UnknownPrompt(String),
}

impl PromptName {
    /// Catalog order of `prompt/list`.
    pub const ALL: [PromptName; 2] = [PromptName::RequestTemplate, PromptName::MainPrompt];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|prompt| prompt.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestTemplate => "request_template",
            Self::MainPrompt => "main_prompt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptRegistry {
    main_prompt: String,
}

impl PromptRegistry {
    pub fn new(tool_catalog: &str) -> Self {
        Self {
            main_prompt: render_main_prompt(tool_catalog),
        }
    }

    pub fn get(&self, name: &str) -> Result<&str, PromptError> {
        match PromptName::from_name(name) {
            Some(PromptName::RequestTemplate) => Ok(REQUEST_TEMPLATE),
            Some(PromptName::MainPrompt) => Ok(&self.main_prompt),
            None => Err(PromptError::UnknownPrompt(name.to_string())),
        }
    }

    pub fn list(&self) -> Vec<&'static str> {
        PromptName::ALL.iter().map(|prompt| prompt.as_str()).collect()
    }
}

fn render_main_prompt(tool_catalog: &str) -> String {
    format!(
        "You are an intelligent agent system equipped with the following tools. Based on a \
user's query, you must generate a structured list of tool calls in JSON format. Each call \
must include the tool method, the required parameters, and a unique request ID. All \
requests will be sent together in a single JSON payload.

Here are the available tools:
{tool_catalog}
Your task is: **Given a user's natural language query, generate a structured tool invocation \
JSON** in the following format:

```json
{REQUEST_TEMPLATE}
```
**User Query** :
"
    )
}
