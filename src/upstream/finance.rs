//! Company financials (Yahoo Finance quote summary) and SEC EDGAR filings lookups

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{transport_error, FilingsProvider, FinancialDataProvider};
use crate::errors::ToolError;

const YAHOO_ENDPOINT: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const YAHOO_MODULES: &str = "price,assetProfile,summaryDetail,financialData";
const EDGAR_ENDPOINT: &str = "https://data.sec.gov/submissions";
const FILINGS_LIMIT: usize = 3;
const REPORTED_FORMS: [&str; 2] = ["10-K", "10-Q"];

pub struct YahooFinance {
    client: reqwest::Client,
}

impl YahooFinance {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FinancialDataProvider for YahooFinance {
    async fn company_report(&self, ticker: &str) -> Result<String, ToolError> {
        debug!(ticker = %ticker, "fetching financials");
        let response = self
            .client
            .get(format!("{YAHOO_ENDPOINT}/{}", ticker.trim()))
            .query(&[("modules", YAHOO_MODULES)])
            .send()
            .await
            .map_err(|err| transport_error("financial data", err))?;

        if !response.status().is_success() {
            return Err(ToolError::upstream(
                "financial data",
                format!("status {}", response.status()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| transport_error("financial data", err))?;

        let summary = body
            .pointer("/quoteSummary/result/0")
            .ok_or_else(|| ToolError::upstream("financial data", "empty quote summary"))?;

        Ok(render_company_report(summary))
    }
}

pub struct SecEdgar {
    client: reqwest::Client,
    user_agent: String,
}

impl SecEdgar {
    pub fn new(client: reqwest::Client, user_agent: String) -> Self {
        Self { client, user_agent }
    }
}

#[async_trait]
impl FilingsProvider for SecEdgar {
    async fn recent_filings(&self, cik: &str) -> Result<String, ToolError> {
        debug!(cik = %cik, "fetching filings");
        let response = self
            .client
            .get(format!("{EDGAR_ENDPOINT}/CIK{}.json", pad_cik(cik)))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|err| transport_error("filings registry", err))?;

        if !response.status().is_success() {
            return Err(ToolError::upstream(
                "filings registry",
                format!("status {}", response.status()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| transport_error("filings registry", err))?;

        Ok(render_filings(&body))
    }
}

/// EDGAR submission files are keyed by the CIK zero-padded to ten digits.
pub fn pad_cik(cik: &str) -> String {
    format!("{:0>10}", cik.trim())
}

pub fn render_company_report(summary: &Value) -> String {
    let field = |pointer: &str| -> String {
        match summary.pointer(pointer) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            Some(Value::Object(object)) => object
                .get("fmt")
                .or_else(|| object.get("raw"))
                .map(|value| match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "N/A".to_string()),
            _ => "N/A".to_string(),
        }
    };

    let business_summary = summary
        .pointer("/assetProfile/longBusinessSummary")
        .and_then(Value::as_str)
        .unwrap_or_default();

    format!(
        "Company: {}\nSector: {}\nMarket Cap: {}\nP/E Ratio: {}\nRevenue: {}\nSummary:\n{}",
        field("/price/longName"),
        field("/assetProfile/sector"),
        field("/price/marketCap"),
        field("/summaryDetail/trailingPE"),
        field("/financialData/totalRevenue"),
        business_summary
    )
}

pub fn render_filings(submissions: &Value) -> String {
    let forms = recent_column(submissions, "form");
    let dates = recent_column(submissions, "filingDate");
    let documents = recent_column(submissions, "primaryDocument");

    let filings: Vec<String> = forms
        .iter()
        .zip(dates.iter())
        .zip(documents.iter())
        .filter(|((form, _), _)| REPORTED_FORMS.contains(*form))
        .take(FILINGS_LIMIT)
        .map(|((form, date), document)| {
            format!("{form} | {date} | https://www.sec.gov/Archives/{document}")
        })
        .collect();

    if filings.is_empty() {
        "No recent filings found.".to_string()
    } else {
        filings.join("\n")
    }
}

fn recent_column<'a>(submissions: &'a Value, name: &str) -> Vec<&'a str> {
    submissions
        .pointer(&format!("/filings/recent/{name}"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| item.as_str().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}
