//! Web search providers
//!
//! Google Custom Search is queried first; SerpAPI serves as the fallback when Google is
//! unconfigured, failing, or returns nothing.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{transport_error, WebSearchProvider};
use crate::errors::ToolError;

const GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const SERP_ENDPOINT: &str = "https://serpapi.com/search";
const GOOGLE_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
// Custom Search rejects `num` outside 1..=10.
const GOOGLE_MAX_RESULTS: u32 = 10;

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SerpItem>,
}

#[derive(Debug, Deserialize)]
struct SerpItem {
    snippet: Option<String>,
    link: Option<String>,
}

pub struct GoogleCustomSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    cse_id: Option<String>,
}

impl GoogleCustomSearch {
    pub fn new(client: reqwest::Client, api_key: Option<String>, cse_id: Option<String>) -> Self {
        Self {
            client,
            api_key,
            cse_id,
        }
    }

    async fn search_once(
        &self,
        api_key: &str,
        cse_id: &str,
        query: &str,
        num_results: u32,
    ) -> Result<Vec<String>, ToolError> {
        let num = num_results.clamp(1, GOOGLE_MAX_RESULTS).to_string();
        let response = self
            .client
            .get(GOOGLE_ENDPOINT)
            .query(&[("key", api_key), ("cx", cse_id), ("q", query), ("num", num.as_str())])
            .send()
            .await
            .map_err(|err| transport_error("google search", err))?;

        if !response.status().is_success() {
            return Err(ToolError::upstream(
                "google search",
                format!("status {}", response.status()),
            ));
        }

        let body: GoogleResponse = response
            .json()
            .await
            .map_err(|err| transport_error("google search", err))?;

        Ok(body.items.iter().map(format_google_item).collect())
    }
}

#[async_trait]
impl WebSearchProvider for GoogleCustomSearch {
    async fn search(&self, query: &str, num_results: u32) -> Result<Vec<String>, ToolError> {
        let (Some(api_key), Some(cse_id)) = (self.api_key.as_deref(), self.cse_id.as_deref())
        else {
            return Err(ToolError::not_configured("google search"));
        };

        debug!(query = %query, "searching google");
        let mut last_error = None;
        for attempt in 1..=GOOGLE_ATTEMPTS {
            match self.search_once(api_key, cse_id, query, num_results).await {
                Ok(hits) => return Ok(hits),
                Err(err) => {
                    warn!(attempt, error = %err, "google search attempt failed");
                    last_error = Some(err);
                    if attempt < GOOGLE_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ToolError::upstream("google search", "no attempts made")))
    }
}

pub struct SerpApiSearch {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl SerpApiSearch {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl WebSearchProvider for SerpApiSearch {
    async fn search(&self, query: &str, num_results: u32) -> Result<Vec<String>, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ToolError::not_configured("serpapi"));
        };

        debug!(query = %query, "searching serpapi");
        let num = num_results.max(1).to_string();
        let response = self
            .client
            .get(SERP_ENDPOINT)
            .query(&[
                ("q", query),
                ("api_key", api_key),
                ("engine", "google"),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|err| transport_error("serpapi", err))?;

        if !response.status().is_success() {
            return Err(ToolError::upstream(
                "serpapi",
                format!("status {}", response.status()),
            ));
        }

        let body: SerpResponse = response
            .json()
            .await
            .map_err(|err| transport_error("serpapi", err))?;

        Ok(body
            .organic_results
            .iter()
            .filter_map(format_serp_item)
            .collect())
    }
}

pub struct FallbackSearch {
    primary: Arc<dyn WebSearchProvider>,
    fallback: Arc<dyn WebSearchProvider>,
}

impl FallbackSearch {
    pub fn new(primary: Arc<dyn WebSearchProvider>, fallback: Arc<dyn WebSearchProvider>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl WebSearchProvider for FallbackSearch {
    async fn search(&self, query: &str, num_results: u32) -> Result<Vec<String>, ToolError> {
        let primary_answered = match self.primary.search(query, num_results).await {
            Ok(hits) if !hits.is_empty() => return Ok(hits),
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "primary search unavailable, trying fallback");
                false
            }
        };

        match self.fallback.search(query, num_results).await {
            Ok(hits) => Ok(hits),
            Err(_) if primary_answered => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

fn format_google_item(item: &GoogleItem) -> String {
    format!(
        "Title : {}\n Body : {}\nSource : {}",
        item.title.as_deref().unwrap_or_default(),
        item.snippet.as_deref().unwrap_or_default(),
        item.link.as_deref().unwrap_or_default()
    )
}

fn format_serp_item(item: &SerpItem) -> Option<String> {
    let snippet = item.snippet.as_deref().filter(|snippet| !snippet.is_empty())?;
    Some(format!(
        "{snippet}\n(Source: {})",
        item.link.as_deref().unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::testing::StubSearch;

    #[test]
    fn formats_google_items() {
        let body: GoogleResponse = serde_json::from_str(
            r#"{"items":[{"title":"Acme","snippet":"Widgets","link":"https://acme.test"}]}"#,
        )
        .expect("valid body");

        let hits: Vec<_> = body.items.iter().map(format_google_item).collect();
        assert_eq!(hits, ["Title : Acme\n Body : Widgets\nSource : https://acme.test"]);
    }

    #[test]
    fn serp_items_without_snippet_are_skipped() {
        let body: SerpResponse = serde_json::from_str(
            r#"{"organic_results":[{"link":"https://a.test"},{"snippet":"Found","link":"https://b.test"}]}"#,
        )
        .expect("valid body");

        let hits: Vec<_> = body.organic_results.iter().filter_map(format_serp_item).collect();
        assert_eq!(hits, ["Found\n(Source: https://b.test)"]);
    }

    #[test]
    fn missing_result_lists_decode_as_empty() {
        let google: GoogleResponse = serde_json::from_str("{}").expect("valid body");
        assert!(google.items.is_empty());
        let serp: SerpResponse = serde_json::from_str("{}").expect("valid body");
        assert!(serp.organic_results.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_google_reports_upstream_unavailable() {
        let google = GoogleCustomSearch::new(reqwest::Client::new(), None, Some("cse".into()));
        let err = google.search("acme", 5).await.expect_err("no key");
        assert_eq!(err, ToolError::not_configured("google search"));
    }

    #[tokio::test]
    async fn fallback_used_when_primary_fails() {
        let primary = Arc::new(StubSearch::failing(ToolError::not_configured("google search")));
        let fallback = Arc::new(StubSearch::with_hits(&["serp hit"]));
        let search = FallbackSearch::new(primary.clone(), fallback.clone());

        let hits = search.search("acme", 5).await.expect("fallback hits");
        assert_eq!(hits, ["serp hit"]);
        assert_eq!(fallback.recorded_queries(), ["acme"]);
    }

    #[tokio::test]
    async fn fallback_skipped_when_primary_has_hits() {
        let primary = Arc::new(StubSearch::with_hits(&["google hit"]));
        let fallback = Arc::new(StubSearch::with_hits(&["serp hit"]));
        let search = FallbackSearch::new(primary, fallback.clone());

        let hits = search.search("acme", 5).await.expect("primary hits");
        assert_eq!(hits, ["google hit"]);
        assert!(fallback.recorded_queries().is_empty());
    }

    #[tokio::test]
    async fn empty_primary_and_failing_fallback_yield_no_hits() {
        let primary = Arc::new(StubSearch::with_hits(&[]));
        let fallback = Arc::new(StubSearch::failing(ToolError::not_configured("serpapi")));
        let search = FallbackSearch::new(primary, fallback);

        let hits = search.search("acme", 5).await.expect("empty result");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn both_providers_failing_is_an_error() {
        let primary = Arc::new(StubSearch::failing(ToolError::not_configured("google search")));
        let fallback = Arc::new(StubSearch::failing(ToolError::not_configured("serpapi")));
        let search = FallbackSearch::new(primary, fallback);

        let err = search.search("acme", 5).await.expect_err("both failed");
        assert_eq!(err, ToolError::not_configured("serpapi"));
    }
}
