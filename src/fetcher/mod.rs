//! Source fetching from web search backends
//!
//! Every configured backend is queried concurrently. Each backend call has
//! its own timeout covering retries, and a failing backend contributes zero
//! sources instead of failing the whole fetch.

pub mod backends;
pub mod circuit_breaker;
pub mod models;

pub use backends::{DuckDuckGoBackend, FetchError, SearchBackend, WikipediaBackend};
pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use models::{domain_of, Source};

use crate::error::{LearningError, Result};
use crate::metrics::METRICS;
use futures::future::join_all;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Source fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Backends to query, in result order
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,

    #[serde(default = "default_duckduckgo_url")]
    pub duckduckgo_url: String,

    #[serde(default = "default_wikipedia_url")]
    pub wikipedia_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-backend timeout in milliseconds, retries included
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Extra attempts after the first failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_breaker_failures")]
    pub circuit_breaker_failures: usize,

    #[serde(default = "default_breaker_reset")]
    pub circuit_breaker_reset_secs: u64,
}

fn default_backends() -> Vec<String> {
    vec!["duckduckgo".to_string(), "wikipedia".to_string()]
}
fn default_duckduckgo_url() -> String { "https://api.duckduckgo.com".to_string() }
fn default_wikipedia_url() -> String { "https://en.wikipedia.org".to_string() }
fn default_user_agent() -> String {
    concat!("internet-learning/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_timeout_ms() -> u64 { 5000 }
fn default_max_results() -> usize { 5 }
fn default_retry_attempts() -> usize { 1 }
fn default_retry_backoff_ms() -> u64 { 200 }
fn default_breaker_failures() -> usize { 5 }
fn default_breaker_reset() -> u64 { 30 }

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            duckduckgo_url: default_duckduckgo_url(),
            wikipedia_url: default_wikipedia_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_results: default_max_results(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            circuit_breaker_failures: default_breaker_failures(),
            circuit_breaker_reset_secs: default_breaker_reset(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_reset_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(LearningError::Config("fetcher.timeout_ms must be > 0".to_string()));
        }
        if self.max_results == 0 {
            return Err(LearningError::Config("fetcher.max_results must be > 0".to_string()));
        }
        if self.circuit_breaker_failures == 0 {
            return Err(LearningError::Config(
                "fetcher.circuit_breaker_failures must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Concurrent, failure-isolated fetcher over a set of search backends
pub struct SourceFetcher {
    backends: Vec<Arc<dyn SearchBackend>>,
    config: FetcherConfig,
    breaker: CircuitBreaker,
}

impl SourceFetcher {
    pub fn new(backends: Vec<Arc<dyn SearchBackend>>, config: FetcherConfig) -> Self {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        });

        Self {
            backends,
            config,
            breaker,
        }
    }

    /// Build the HTTP backends named in the configuration
    pub fn from_config(config: FetcherConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;

        let mut backends: Vec<Arc<dyn SearchBackend>> = Vec::new();
        for name in &config.backends {
            match name.as_str() {
                "duckduckgo" => backends.push(Arc::new(DuckDuckGoBackend::new(
                    http.clone(),
                    config.duckduckgo_url.clone(),
                ))),
                "wikipedia" => backends.push(Arc::new(WikipediaBackend::new(
                    http.clone(),
                    config.wikipedia_url.clone(),
                ))),
                other => {
                    return Err(LearningError::Config(format!("Unknown search backend: {}", other)))
                }
            }
        }

        info!("Initialized {} search backends", backends.len());
        Ok(Self::new(backends, config))
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn breaker_state(&self, backend: &str) -> BreakerState {
        self.breaker.state(backend)
    }

    /// Fetch candidate sources for a query
    ///
    /// Backends run concurrently and are all joined (or timed out) before
    /// returning. Results keep backend order, then each backend's own
    /// ranking. Sources without a URL and duplicate URLs are dropped. An
    /// empty vector is a normal outcome.
    pub async fn fetch(&self, query: &str, max_results: usize) -> Vec<Source> {
        let start = Instant::now();

        let calls = self
            .backends
            .iter()
            .map(|backend| self.fetch_backend(backend.as_ref(), query, max_results));
        let batches = join_all(calls).await;

        let mut seen = HashSet::new();
        let mut sources: Vec<Source> = batches
            .into_iter()
            .flatten()
            .filter(|source| source.has_url())
            .filter(|source| seen.insert(source.url.clone()))
            .collect();
        sources.truncate(max_results);

        info!(
            "Fetched {} sources for '{}' from {} backends in {:?}",
            sources.len(),
            query,
            self.backends.len(),
            start.elapsed()
        );

        sources
    }

    async fn fetch_backend(
        &self,
        backend: &dyn SearchBackend,
        query: &str,
        max_results: usize,
    ) -> Vec<Source> {
        let name = backend.name();

        if self.breaker.is_open(name) {
            METRICS.record_backend_request(name, "circuit_open");
            warn!("{}", FetchError::CircuitOpen(name.to_string()));
            return Vec::new();
        }

        let start = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.timeout(),
            self.search_with_retry(backend, query, max_results),
        )
        .await
        .unwrap_or_else(|_| {
            Err(FetchError::Timeout(format!(
                "{} did not answer within {:?}",
                name,
                self.config.timeout()
            )))
        });

        METRICS
            .fetch_duration
            .with_label_values(&[name])
            .observe(start.elapsed().as_secs_f64());

        match outcome {
            Ok(sources) => {
                self.breaker.mark_success(name);
                METRICS.record_backend_request(name, "success");
                debug!("Backend {} returned {} sources", name, sources.len());
                sources
            }
            Err(e) => {
                self.breaker.mark_failure(name);
                let status = if matches!(e, FetchError::Timeout(_)) { "timeout" } else { "error" };
                METRICS.record_backend_request(name, status);
                warn!("Backend {} failed, continuing without it: {}", name, e);
                Vec::new()
            }
        }
    }

    /// Retry with exponential backoff; the caller's timeout bounds the loop
    async fn search_with_retry(
        &self,
        backend: &dyn SearchBackend,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Vec<Source>, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            match backend.search(query, max_results).await {
                Ok(sources) => return Ok(sources),
                Err(e) => {
                    if attempt > self.config.retry_attempts {
                        return Err(e);
                    }

                    let backoff = self.calculate_backoff(attempt);
                    debug!(
                        "Backend {} attempt {} failed: {}, retrying in {:?}",
                        backend.name(),
                        attempt,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Exponential backoff with up to 25% jitter
    fn calculate_backoff(&self, attempt: usize) -> Duration {
        let base = self.config.retry_backoff();
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1) as u32);
        let backoff = base.saturating_mul(multiplier);

        let jitter_ceiling = (backoff.as_millis() / 4) as u64;
        let jitter = if jitter_ceiling > 0 {
            rand::thread_rng().gen_range(0..=jitter_ceiling)
        } else {
            0
        };

        backoff + Duration::from_millis(jitter)
    }
}
