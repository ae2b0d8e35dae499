//! Search backends queried by the source fetcher

use super::models::Source;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

/// Backend error types
///
/// These never leave the fetcher: a failing backend contributes zero sources.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Circuit breaker is open: {0}")]
    CircuitOpen(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else {
            FetchError::RequestFailed(e.to_string())
        }
    }
}

/// A web or search service that turns a query into candidate sources
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name (must be unique within a fetcher)
    fn name(&self) -> &str;

    /// Search for a query, results in the backend's native relevance order
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, FetchError>;
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(FetchError::UpstreamError(format!(
            "Status {}: {}",
            status, error_text
        )));
    }

    // Some endpoints answer JSON with a javascript content type
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| FetchError::InvalidResponse(e.to_string()))
}

/// DuckDuckGo Instant Answer API
pub struct DuckDuckGoBackend {
    http: Client,
    base_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "Heading")]
    heading: String,
    #[serde(rename = "Abstract")]
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<serde_json::Value>,
}

/// Related topics shown after the abstract
const MAX_RELATED_TOPICS: usize = 3;

impl DuckDuckGoBackend {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn parse(answer: InstantAnswer, max_results: usize) -> Vec<Source> {
        let mut sources = Vec::new();

        if !answer.abstract_text.is_empty() {
            let title = if answer.heading.is_empty() {
                "Unknown".to_string()
            } else {
                answer.heading.clone()
            };
            sources.push(Source::new(
                answer.abstract_url.clone(),
                title,
                answer.abstract_text.clone(),
                "duckduckgo",
            ));
        }

        // Grouped topics ({"Name": .., "Topics": [..]}) have no Text and are skipped
        let related = answer
            .related_topics
            .iter()
            .filter_map(|topic| {
                let text = topic.get("Text")?.as_str()?;
                let url = topic.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
                if text.is_empty() {
                    return None;
                }
                let title: String = text.chars().take(100).collect();
                Some(Source::new(url, title, text, "duckduckgo"))
            })
            .take(MAX_RELATED_TOPICS);

        sources.extend(related);
        sources.truncate(max_results);
        sources
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, FetchError> {
        let url = format!("{}/", self.base_url.trim_end_matches('/'));
        debug!("Calling DuckDuckGo instant answer API: query={}", query);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let answer: InstantAnswer = read_json(response).await?;
        Ok(Self::parse(answer, max_results))
    }
}

/// Wikipedia REST page summary endpoint
pub struct WikipediaBackend {
    http: Client,
    base_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageSummary {
    #[serde(rename = "type")]
    page_type: String,
    title: String,
    extract: String,
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageUrl {
    page: String,
}

impl WikipediaBackend {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn summary_url(&self, query: &str) -> Result<Url, FetchError> {
        let title = query.trim().replace(' ', "_");
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| FetchError::RequestFailed(format!("Bad base url: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| FetchError::RequestFailed("Base url cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "rest_v1", "page", "summary", title.as_str()]);

        Ok(url)
    }

    fn parse(summary: PageSummary) -> Vec<Source> {
        if summary.extract.trim().is_empty() || summary.page_type == "disambiguation" {
            return Vec::new();
        }

        let url = summary
            .content_urls
            .and_then(|urls| urls.desktop)
            .map(|desktop| desktop.page)
            .unwrap_or_default();

        let title = if summary.title.is_empty() {
            "Unknown".to_string()
        } else {
            summary.title
        };

        vec![Source::new(url, title, summary.extract, "wikipedia")]
    }
}

#[async_trait]
impl SearchBackend for WikipediaBackend {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, FetchError> {
        if query.trim().is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let url = self.summary_url(query)?;
        debug!("Calling Wikipedia summary API: {}", url);

        let response = self.http.get(url).send().await?;

        // A missing article is an empty answer, not a failure
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let summary: PageSummary = read_json(response).await?;
        Ok(Self::parse(summary))
    }
}
