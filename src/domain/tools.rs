//! Tool registry
//!
//! Tools are a closed set: `ToolName` enumerates every routable tool and
//! `ToolRegistry::invoke` matches on it exhaustively, so each registered name is
//! guaranteed a handler. Parameter structs double as the descriptors rendered into the
//! `tools/list` catalog, one per `ToolName` in `ToolName::ALL` order.

use rust_mcp_sdk::{macros, schema::Tool};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::utils::{
    or_unknown, parse_params, require_text, risk_news_query, DEFAULT_NUM_RESULTS, UNKNOWN,
};
use crate::errors::ToolError;
use crate::upstream::Upstreams;

pub const NO_SEARCH_RESULTS: &str = "No relevant search results found.";
pub const NO_FINANCIAL_DATA: &str = "No data";
pub const NO_FILINGS: &str = "Not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    Websearch,
    FinancialDescriptor,
    News,
    SendMail,
    List,
    Gemini,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::Websearch,
        ToolName::FinancialDescriptor,
        ToolName::News,
        ToolName::SendMail,
        ToolName::List,
        ToolName::Gemini,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Websearch => "websearch",
            Self::FinancialDescriptor => "financial_descriptor",
            Self::News => "news",
            Self::SendMail => "send_mail",
            Self::List => "list",
            Self::Gemini => "gemini",
        }
    }
}

#[macros::mcp_tool(
    name = "websearch",
    description = "Searches the web about the company named in `query` and returns a detailed report. Mainly used for gathering publicly available data."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct WebsearchTool {
    /// Search query about a company, e.g. "Detailed company profile of <company name> site:crunchbase.com OR site:sec.gov"
    pub query: String,
    /// Maximum number of hits (default 5)
    pub num_results: Option<u32>,
}

#[macros::mcp_tool(
    name = "financial_descriptor",
    description = "Returns the current financial report of a company from its ticker, followed by its recent SEC filings from its CIK number."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct FinancialDescriptorTool {
    /// Stock ticker of the company
    pub ticker: Option<String>,
    /// SEC CIK number of the company
    pub cik: Option<String>,
}

#[macros::mcp_tool(
    name = "news",
    description = "Scans recent news articles about lawsuits, fraud, or other risks for the given company."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct NewsTool {
    /// Name of the company
    pub name: String,
}

#[macros::mcp_tool(
    name = "send_mail",
    description = "Sends a plain-text mail to the designated receiver."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct SendMailTool {
    /// Subject of the mail
    pub subject: String,
    /// The mail body
    pub message: String,
    /// Mail address of the receiver
    pub receiver: String,
}

#[macros::mcp_tool(
    name = "list",
    description = "Returns this catalog of every registered tool and its parameters."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct ListTool {}

#[macros::mcp_tool(
    name = "gemini",
    description = "Answers a free-form query with the language model."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GeminiTool {
    /// The question or instruction for the model
    pub query: String,
}

pub fn build_tools_list() -> Vec<Tool> {
    vec![
        WebsearchTool::tool(),
        FinancialDescriptorTool::tool(),
        NewsTool::tool(),
        SendMailTool::tool(),
        ListTool::tool(),
        GeminiTool::tool(),
    ]
}

/// Renders the human-readable catalog served by `tools/list` and embedded in the main
/// prompt. Required params come first, in declaration order; optional ones follow sorted.
pub fn render_catalog(tools: &[Tool]) -> String {
    let mut catalog = String::new();
    for (index, tool) in tools.iter().enumerate() {
        let descriptor = serde_json::to_value(tool).unwrap_or_default();
        let schema = &descriptor["inputSchema"];
        let properties = schema["properties"].as_object().cloned().unwrap_or_default();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut optional: Vec<&String> = properties
            .keys()
            .filter(|name| !required.contains(&name.as_str()))
            .collect();
        optional.sort();

        catalog.push_str(&format!("Tool {}:\n", index + 1));
        catalog.push_str(&format!("    name : \"{}\"\n", tool.name));
        catalog.push_str("    params :\n");
        let ordered = required
            .iter()
            .map(|name| (*name, true))
            .chain(optional.iter().map(|name| (name.as_str(), false)));
        for (position, (name, is_required)) in ordered.enumerate() {
            let property = properties.get(name).cloned().unwrap_or_default();
            catalog.push_str(&format!(
                "        {}. {}:{} ({}){}\n",
                position + 1,
                name,
                property_type(&property),
                if is_required { "required" } else { "optional" },
                property
                    .get("description")
                    .and_then(Value::as_str)
                    .map(|text| format!(" {text}"))
                    .unwrap_or_default()
            ));
        }
        catalog.push_str(&format!(
            "    description : {}\n",
            tool.description.as_deref().unwrap_or_default()
        ));
    }
    catalog
}

fn property_type(property: &Value) -> &str {
    match property.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .find(|kind| *kind != "null")
            .unwrap_or("any"),
        _ => "any",
    }
}

pub struct ToolRegistry {
    upstreams: Upstreams,
    catalog: String,
}

impl ToolRegistry {
    pub fn new(upstreams: Upstreams) -> Self {
        Self {
            upstreams,
            catalog: render_catalog(&build_tools_list()),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<ToolName> {
        ToolName::from_name(name)
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub async fn invoke(
        &self,
        tool: ToolName,
        params: Option<&Map<String, Value>>,
    ) -> Result<Value, ToolError> {
        match tool {
            ToolName::Websearch => {
                let params: WebsearchTool = parse_params(params)?;
                let query = require_text("query", &params.query)?;
                let num_results = params.num_results.unwrap_or(DEFAULT_NUM_RESULTS);
                self.web_search(&query, num_results).await.map(Value::String)
            }
            ToolName::FinancialDescriptor => {
                let params: FinancialDescriptorTool = parse_params(params)?;
                self.financial_descriptor(or_unknown(params.ticker), or_unknown(params.cik))
                    .await
                    .map(Value::String)
            }
            ToolName::News => {
                let params: NewsTool = parse_params(params)?;
                let name = require_text("name", &params.name)?;
                self.web_search(&risk_news_query(&name), DEFAULT_NUM_RESULTS)
                    .await
                    .map(Value::String)
            }
            ToolName::SendMail => {
                let params: SendMailTool = parse_params(params)?;
                let receiver = require_text("receiver", &params.receiver)?;
                self.upstreams
                    .mailer
                    .send_mail(&params.subject, &params.message, &receiver)
                    .await
                    .map(Value::Bool)
            }
            ToolName::List => Ok(Value::String(self.catalog.clone())),
            ToolName::Gemini => {
                let params: GeminiTool = parse_params(params)?;
                let query = require_text("query", &params.query)?;
                self.upstreams
                    .model
                    .complete(&query)
                    .await
                    .map(Value::String)
            }
        }
    }

    async fn web_search(&self, query: &str, num_results: u32) -> Result<String, ToolError> {
        let hits = self.upstreams.search.search(query, num_results).await?;
        if hits.is_empty() {
            return Ok(NO_SEARCH_RESULTS.to_string());
        }
        Ok(hits.join("\n\n"))
    }

    /// Each half is looked up only when its identifier is known, and degrades to a
    /// placeholder when the upstream fails.
    async fn financial_descriptor(&self, ticker: String, cik: String) -> Result<String, ToolError> {
        let financials = if ticker == UNKNOWN {
            NO_FINANCIAL_DATA.to_string()
        } else {
            match self.upstreams.financials.company_report(&ticker).await {
                Ok(report) => report,
                Err(err) => {
                    warn!(ticker = %ticker, error = %err, "financial data lookup failed");
                    format!("Failed to fetch data for {ticker}.")
                }
            }
        };

        let filings = if cik == UNKNOWN {
            NO_FILINGS.to_string()
        } else {
            match self.upstreams.filings.recent_filings(&cik).await {
                Ok(filings) => filings,
                Err(err) => {
                    warn!(cik = %cik, error = %err, "filings lookup failed");
                    "Unable to retrieve filings.".to_string()
                }
            }
        };

        Ok(format!("{financials}\n\n{filings}"))
    }
}
