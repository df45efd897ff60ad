//! External services the tools delegate to
//!
//! Every collaborator sits behind a narrow async trait so the dispatcher can be exercised
//! against stubs. The concrete clients talk to Google Custom Search / SerpAPI, Yahoo
//! Finance, SEC EDGAR, an SMTP relay and the Gemini API.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::warn;

use crate::{config::UpstreamConfig, errors::ToolError};

pub mod finance;
pub mod gemini;
pub mod mail;
pub mod search;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Returns formatted hits, best first. An empty list means nothing matched.
    async fn search(&self, query: &str, num_results: u32) -> Result<Vec<String>, ToolError>;
}

#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    async fn company_report(&self, ticker: &str) -> Result<String, ToolError>;
}

#[async_trait]
pub trait FilingsProvider: Send + Sync {
    async fn recent_filings(&self, cik: &str) -> Result<String, ToolError>;
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    /// `Ok(false)` means the relay rejected the message.
    async fn send_mail(
        &self,
        subject: &str,
        message: &str,
        receiver: &str,
    ) -> Result<bool, ToolError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ToolError>;
}

/// The process-wide set of collaborators, built once at startup.
#[derive(Clone)]
pub struct Upstreams {
    pub search: Arc<dyn WebSearchProvider>,
    pub financials: Arc<dyn FinancialDataProvider>,
    pub filings: Arc<dyn FilingsProvider>,
    pub mailer: Arc<dyn MailProvider>,
    pub model: Arc<dyn LanguageModel>,
}

impl Upstreams {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        let http = http_client();

        let google = search::GoogleCustomSearch::new(
            http.clone(),
            config.google_search_key.clone(),
            config.google_cse_id.clone(),
        );
        let serp = search::SerpApiSearch::new(http.clone(), config.serp_api_key.clone());

        Self {
            search: Arc::new(search::FallbackSearch::new(Arc::new(google), Arc::new(serp))),
            financials: Arc::new(finance::YahooFinance::new(http.clone())),
            filings: Arc::new(finance::SecEdgar::new(
                http.clone(),
                config.sec_user_agent.clone(),
            )),
            mailer: Arc::new(mail::SmtpMailer::from_config(config)),
            model: Arc::new(gemini::GeminiClient::new(
                http,
                config.gemini_api_key.clone(),
                config.gemini_model.clone(),
            )),
        }
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|err| {
            warn!(error = %err, "falling back to default http client");
            reqwest::Client::new()
        })
}

pub(crate) fn transport_error(service: &'static str, err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        ToolError::upstream(service, "request timed out")
    } else {
        ToolError::upstream(service, err.to_string())
    }
}
