//! Outbound translation of user-facing messages
//!
//! Facts are always stored in the canonical language. Only the final
//! message handed back to the user goes through a [`Translator`].

pub mod libretranslate;

pub use libretranslate::LibreTranslateClient;

use crate::error::{LearningError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Translation capability
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    /// Translate canonical-language text into `target_lang`
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

/// Returns text unchanged
#[derive(Debug, Clone, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn translate(&self, text: &str, _target_lang: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Translation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// When false, messages are returned in the canonical language
    #[serde(default)]
    pub enabled: bool,

    /// LibreTranslate `/translate` endpoints, tried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_endpoints() -> Vec<String> {
    vec![
        "https://libretranslate.de/translate".to_string(),
        "https://libretranslate.com/translate".to_string(),
    ]
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoints: default_endpoints(),
            timeout_ms: default_timeout_ms(),
            api_key: None,
        }
    }
}

impl TranslationConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.endpoints.is_empty() {
            return Err(LearningError::Config(
                "translation is enabled but no endpoints are configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build the translator selected by the config
pub fn from_config(config: &TranslationConfig) -> Result<Arc<dyn Translator>> {
    if !config.enabled {
        return Ok(Arc::new(PassthroughTranslator));
    }
    Ok(Arc::new(LibreTranslateClient::from_config(config)?))
}

/// Map a language name or code to a two-letter code
///
/// Unknown input is passed through lower-cased.
pub fn language_code(language: &str) -> String {
    let language = language.trim().to_lowercase();
    let code = match language.as_str() {
        "english" => "en",
        "spanish" | "español" => "es",
        "french" | "français" => "fr",
        "german" | "deutsch" => "de",
        "italian" => "it",
        "portuguese" => "pt",
        "japanese" => "ja",
        "chinese" => "zh",
        "korean" => "ko",
        "russian" => "ru",
        "arabic" => "ar",
        "hindi" => "hi",
        _ => {
            return language
                .split(|c: char| c == '-' || c == '_')
                .next()
                .unwrap_or_default()
                .to_string()
        }
    };
    code.to_string()
}
