//! Data models for fetched sources

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// A raw candidate document returned by a search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    /// Snippet or body text, whatever the backend returned
    pub snippet: String,
    pub domain: String,
    pub retrieved_at: DateTime<Utc>,
    /// Name of the backend that produced this source
    pub backend: String,
}

impl Source {
    /// Create a source retrieved now
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let domain = domain_of(&url);

        Self {
            url,
            title: title.into(),
            snippet: snippet.into(),
            domain,
            retrieved_at: Utc::now(),
            backend: backend.into(),
        }
    }

    pub fn with_retrieved_at(mut self, retrieved_at: DateTime<Utc>) -> Self {
        self.retrieved_at = retrieved_at;
        self
    }

    /// Sources without a URL cannot give provenance to a fact
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Extract the host of a URL, lower-cased and without a leading `www.`
///
/// Returns an empty string for anything that does not parse as a URL.
pub fn domain_of(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .map(|host| host.trim_start_matches("www.").to_string())
        .unwrap_or_default()
}
