//! LibreTranslate HTTP client

use super::{language_code, TranslationConfig, Translator};
use crate::error::{LearningError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for one or more LibreTranslate instances
///
/// Endpoints are tried in order until one answers. Successful translations
/// are cached in memory for the lifetime of the client.
pub struct LibreTranslateClient {
    http: Client,
    endpoints: Vec<String>,
    api_key: Option<String>,
    source_lang: String,
    cache: DashMap<(String, String), String>,
}

impl LibreTranslateClient {
    pub fn new(http: Client, endpoints: Vec<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoints,
            api_key,
            source_lang: "en".to_string(),
            cache: DashMap::new(),
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::new(http, config.endpoints.clone(), config.api_key.clone()))
    }

    pub fn cached_translations(&self) -> usize {
        self.cache.len()
    }

    async fn call(&self, endpoint: &str, text: &str, target: &str) -> Result<String> {
        let request = TranslateRequest {
            q: text,
            source: &self.source_lang,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self.http.post(endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LearningError::Translation(format!(
                "{} answered with status {}",
                endpoint, status
            )));
        }

        let body: TranslateResponse = response.json().await?;
        Ok(body.translated_text)
    }
}

#[async_trait]
impl Translator for LibreTranslateClient {
    fn name(&self) -> &str {
        "libretranslate"
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let target = language_code(target_lang);
        if target.is_empty() || target == self.source_lang || text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let key = (text.to_string(), target.clone());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        for endpoint in &self.endpoints {
            match self.call(endpoint, text, &target).await {
                Ok(translated) => {
                    debug!(endpoint = %endpoint, target = %target, "Translated message");
                    self.cache.insert(key, translated.clone());
                    return Ok(translated);
                }
                Err(e) => warn!(endpoint = %endpoint, error = %e, "Translation endpoint failed"),
            }
        }

        Err(LearningError::Translation(format!(
            "no endpoint could translate into '{}'",
            target
        )))
    }
}
