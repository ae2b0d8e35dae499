//! Query orchestration: fetch, score, extract, merge

use super::query::Query;
use super::state::{LearningState, StateMachine};
use crate::config::Config;
use crate::error::{LearningError, Result};
use crate::extractor::FactExtractor;
use crate::fetcher::{domain_of, Source, SourceFetcher};
use crate::knowledge::{Fact, KnowledgeStore, MergeReport, PruneReport, RecentUpdate};
use crate::metrics::METRICS;
use crate::reliability::ReliabilityScorer;
use crate::translate::{self, language_code, Translator};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

const SEARCHES_PERFORMED: &str = "searches_performed";
const QUERIES_HANDLED: &str = "queries_handled";
const ANSWERED_FROM_STORE: &str = "answered_from_store";
const FAILURES: &str = "failures";

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Sources scoring below this are dropped before extraction
    #[serde(default = "default_min_reliability")]
    pub min_reliability: f32,

    /// Facts returned per answer
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Trust at which a stored topic answers a non-question without a fetch
    #[serde(default = "default_acceptable_trust")]
    pub acceptable_trust: f32,

    /// Language facts are stored and reasoned in
    #[serde(default = "default_canonical_language")]
    pub canonical_language: String,
}

fn default_min_reliability() -> f32 { 0.3 }
fn default_top_k() -> usize { 3 }
fn default_acceptable_trust() -> f32 { 0.5 }
fn default_canonical_language() -> String { "en".to_string() }

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_reliability: default_min_reliability(),
            top_k: default_top_k(),
            acceptable_trust: default_acceptable_trust(),
            canonical_language: default_canonical_language(),
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("coordinator.min_reliability", self.min_reliability),
            ("coordinator.acceptable_trust", self.acceptable_trust),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LearningError::Config(format!(
                    "{} must be within [0.0, 1.0], got {}",
                    name, value
                )));
            }
        }
        if self.top_k == 0 {
            return Err(LearningError::Config("coordinator.top_k must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Why a query ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    #[serde(rename = "no-sources")]
    NoSourcesFound,
    #[serde(rename = "low-reliability")]
    LowReliability,
    #[serde(rename = "empty-query")]
    EmptyQuery,
    #[serde(rename = "internal")]
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoSourcesFound => "no-sources",
            FailureReason::LowReliability => "low-reliability",
            FailureReason::EmptyQuery => "empty-query",
            FailureReason::Internal => "internal",
        }
    }

    /// Canonical-language fallback message shown to the user
    fn message(&self, topic: &str) -> String {
        match self {
            FailureReason::NoSourcesFound => {
                format!("I could not find information about {}.", topic)
            }
            FailureReason::LowReliability => format!(
                "I found some sources about {}, but none were reliable enough to learn from.",
                topic
            ),
            FailureReason::EmptyQuery => "Please ask me about a topic.".to_string(),
            FailureReason::Internal => {
                "Something went wrong while I was learning about that. Please try again."
                    .to_string()
            }
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful outcome of a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningAnswer {
    pub topic: String,
    /// Top facts of the topic, highest trust first
    pub facts: Vec<Fact>,
    pub report: MergeReport,
    /// Localized answer text
    pub message: String,
    /// Set when learned facts could not be persisted
    pub warning: Option<String>,
    /// True when the answer came from the store without fetching
    pub from_store: bool,
    pub sources_used: usize,
    pub trace: Vec<LearningState>,
}

/// Terminal failure of a query
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("learning failed ({reason}): {message}")]
pub struct LearningFailure {
    pub topic: String,
    pub reason: FailureReason,
    /// Localized fallback message
    pub message: String,
    pub trace: Vec<LearningState>,
}

/// Status surface for the chat loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub cached_topics: usize,
    pub total_facts: usize,
    pub average_reliability: f32,
    pub searches_performed: u64,
    pub queries_handled: u64,
    pub answered_from_store: u64,
    pub failures: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub recent_updates: Vec<RecentUpdate>,
}

/// Internal result of the pipeline, before localization
struct Learned {
    facts: Vec<Fact>,
    report: MergeReport,
    from_store: bool,
    sources_used: usize,
}

/// Drives one query at a time through fetch, score, extract and merge
///
/// The store sits behind a mutex held across each merge, so concurrent
/// callers never interleave two merges. Feedback-adjusted reputations and
/// the counters are saved with the store and restored on construction.
pub struct LearningCoordinator {
    fetcher: SourceFetcher,
    scorer: RwLock<ReliabilityScorer>,
    extractor: FactExtractor,
    store: Mutex<KnowledgeStore>,
    translator: Arc<dyn Translator>,
    counters: DashMap<String, u64>,
    config: CoordinatorConfig,
}

impl LearningCoordinator {
    pub fn new(
        fetcher: SourceFetcher,
        scorer: ReliabilityScorer,
        extractor: FactExtractor,
        store: KnowledgeStore,
        translator: Arc<dyn Translator>,
        config: CoordinatorConfig,
    ) -> Self {
        let mut scorer = scorer;
        scorer.restore_reputation(store.reputation());
        let counters: DashMap<String, u64> = store
            .counters()
            .iter()
            .map(|(key, value)| (key.clone(), *value))
            .collect();

        if !counters.is_empty() || !store.reputation().is_empty() {
            debug!(
                counters = counters.len(),
                reputations = store.reputation().len(),
                "Restored learning history"
            );
        }

        Self {
            fetcher,
            scorer: RwLock::new(scorer),
            extractor,
            store: Mutex::new(store),
            translator,
            counters,
            config,
        }
    }

    /// Wire every component from configuration and open the store
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = SourceFetcher::from_config(config.fetcher.clone())?;
        let scorer = ReliabilityScorer::new(config.reliability.clone());
        let extractor = FactExtractor::new(config.extractor.clone())?;
        let store = KnowledgeStore::open(config.store.clone())?;
        let translator = translate::from_config(&config.translation)?;

        info!(
            backends = ?fetcher.backend_names(),
            translator = translator.name(),
            store = %config.store.path,
            "Learning coordinator ready"
        );

        Ok(Self::new(
            fetcher,
            scorer,
            extractor,
            store,
            translator,
            config.coordinator.clone(),
        ))
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Handle one chat turn
    ///
    /// Never panics and never leaks internal errors: every failure becomes a
    /// [`LearningFailure`] carrying a localized fallback message.
    pub async fn handle_query(
        &self,
        text: &str,
        user_language: &str,
    ) -> std::result::Result<LearningAnswer, LearningFailure> {
        let start = Instant::now();
        let query = Query::new(text, user_language);
        let mut machine = StateMachine::new();
        self.bump(QUERIES_HANDLED);

        info!(topic = %query.normalized_topic, language = %query.user_language, "Handling query");

        let result = self.run(&query, &mut machine).await;

        let outcome = match &result {
            Ok(learned) if learned.from_store => "from_store",
            Ok(_) => "learned",
            Err(reason) => reason.as_str(),
        };
        self.bump(&format!("outcome.{}", outcome));
        match &result {
            Ok(learned) if learned.from_store => self.bump(ANSWERED_FROM_STORE),
            Ok(_) => {}
            Err(_) => self.bump(FAILURES),
        }
        self.persist_counters().await;
        METRICS.record_query(outcome, start.elapsed().as_secs_f64());

        match result {
            Ok(learned) => {
                let warning = (!learned.report.persisted).then(|| {
                    "Learned facts could not be saved and may be lost on restart.".to_string()
                });
                let message = self
                    .localize(&compose_answer(&query.normalized_topic, &learned), &query.user_language)
                    .await;

                Ok(LearningAnswer {
                    topic: query.normalized_topic,
                    facts: learned.facts,
                    report: learned.report,
                    message,
                    warning,
                    from_store: learned.from_store,
                    sources_used: learned.sources_used,
                    trace: machine.into_trace(),
                })
            }
            Err(reason) => {
                machine.fail();
                info!(topic = %query.normalized_topic, reason = %reason, "Query failed");

                let message = self
                    .localize(&reason.message(&query.normalized_topic), &query.user_language)
                    .await;

                Err(LearningFailure {
                    topic: query.normalized_topic,
                    reason,
                    message,
                    trace: machine.into_trace(),
                })
            }
        }
    }

    async fn run(
        &self,
        query: &Query,
        machine: &mut StateMachine,
    ) -> std::result::Result<Learned, FailureReason> {
        if query.is_empty() {
            return Err(FailureReason::EmptyQuery);
        }
        let topic = query.normalized_topic.as_str();

        if !query.is_interrogative() {
            if let Some(facts) = self.answer_from_store(topic).await {
                step(machine, LearningState::Done)?;
                return Ok(Learned {
                    facts,
                    report: MergeReport {
                        persisted: true,
                        ..MergeReport::default()
                    },
                    from_store: true,
                    sources_used: 0,
                });
            }
        }

        step(machine, LearningState::Fetching)?;
        self.bump(SEARCHES_PERFORMED);
        let sources = self.fetcher.fetch(topic, self.fetcher.config().max_results).await;
        if sources.is_empty() {
            return Err(FailureReason::NoSourcesFound);
        }

        step(machine, LearningState::Scoring)?;
        let accepted = self.score_sources(sources).await;
        if accepted.is_empty() {
            return Err(FailureReason::LowReliability);
        }

        step(machine, LearningState::Extracting)?;
        let facts = self.extract_facts(topic, &accepted);
        METRICS.facts_extracted.inc_by(facts.len() as f64);
        if facts.is_empty() {
            debug!(topic, sources = accepted.len(), "No facts extracted");
            return Err(FailureReason::LowReliability);
        }

        step(machine, LearningState::Merging)?;
        let (report, top) = {
            let mut store = self.store.lock().await;
            let report = store.merge(topic, facts);
            let top: Vec<Fact> = store.lookup(topic).into_iter().take(self.config.top_k).collect();
            (report, top)
        };

        step(machine, LearningState::Done)?;
        Ok(Learned {
            facts: top,
            report,
            from_store: false,
            sources_used: accepted.len(),
        })
    }

    /// Top facts when the stored topic is already trusted enough
    async fn answer_from_store(&self, topic: &str) -> Option<Vec<Fact>> {
        let store = self.store.lock().await;
        let best = store.best_trust(topic)?;
        if best < self.config.acceptable_trust {
            return None;
        }
        Some(store.lookup(topic).into_iter().take(self.config.top_k).collect())
    }

    /// Score every source and keep those at or above `min_reliability`
    async fn score_sources(&self, sources: Vec<Source>) -> Vec<(Source, f32)> {
        let scorer = self.scorer.read().await;

        sources
            .into_iter()
            .filter_map(|source| {
                let score = scorer.score(&source);
                METRICS.record_reliability(score.score);

                if score.score >= self.config.min_reliability {
                    Some((source, score.score))
                } else {
                    debug!(
                        url = %source.url,
                        score = score.score,
                        tags = ?score.rationale_tags,
                        "Dropping unreliable source"
                    );
                    None
                }
            })
            .collect()
    }

    fn extract_facts(&self, topic: &str, sources: &[(Source, f32)]) -> Vec<Fact> {
        sources
            .iter()
            .flat_map(|(source, score)| {
                self.extractor.extract(source).filter_map(move |candidate| {
                    Fact::from_candidate(topic, candidate, &source.url, *score)
                        .map_err(|e| debug!(url = %source.url, error = %e, "Skipping candidate"))
                        .ok()
                })
            })
            .collect()
    }

    async fn localize(&self, text: &str, user_language: &str) -> String {
        let target = language_code(user_language);
        if target.is_empty() || target == language_code(&self.config.canonical_language) {
            return text.to_string();
        }

        match self.translator.translate(text, &target).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!(target = %target, error = %e, "Translation failed, answering in canonical language");
                text.to_string()
            }
        }
    }

    /// Facts of a topic, highest trust first
    pub async fn lookup(&self, topic: &str) -> Vec<Fact> {
        self.store.lock().await.lookup(topic)
    }

    /// Stored facts relevant to free text, for enriching chat replies
    pub async fn relevant_facts(&self, text: &str, k: usize) -> Vec<Fact> {
        self.store.lock().await.relevant(text, k)
    }

    /// Remove facts older than the configured maximum age
    pub async fn prune_stale(&self) -> PruneReport {
        self.store.lock().await.prune_stale()
    }

    /// Adjust the reputation of a source's domain after user feedback
    ///
    /// The adjusted reputation is written through to the store.
    pub async fn record_feedback(&self, source_url: &str, accurate: bool) -> Option<f32> {
        let domain = domain_of(source_url);
        let (updated, learned) = {
            let mut scorer = self.scorer.write().await;
            let updated = scorer.record_feedback(&domain, accurate);
            (updated, scorer.learned_reputation().clone())
        };

        match updated {
            Some(score) => {
                info!(domain = %domain, accurate, score, "Recorded source feedback");
                self.store.lock().await.record_reputation(learned);
            }
            None => warn!(url = %source_url, "Ignoring feedback for unusable domain"),
        }
        updated
    }

    /// Current base reputation of a source's domain
    pub async fn source_reputation(&self, source_url: &str) -> f32 {
        let domain = domain_of(source_url);
        self.scorer.read().await.table().lookup(&domain).0
    }

    pub async fn stats(&self) -> LearningStats {
        let store = self.store.lock().await;

        let outcomes = self
            .counters
            .iter()
            .filter_map(|entry| {
                entry
                    .key()
                    .strip_prefix("outcome.")
                    .map(|outcome| (outcome.to_string(), *entry.value()))
            })
            .collect();

        LearningStats {
            cached_topics: store.topics().len(),
            total_facts: store.fact_count(),
            average_reliability: store.average_reliability(),
            searches_performed: self.counter(SEARCHES_PERFORMED),
            queries_handled: self.counter(QUERIES_HANDLED),
            answered_from_store: self.counter(ANSWERED_FROM_STORE),
            failures: self.counter(FAILURES),
            outcomes,
            recent_updates: store.recent_updates(),
        }
    }

    fn bump(&self, key: &str) {
        *self.counters.entry(key.to_string()).or_insert(0) += 1;
    }

    async fn persist_counters(&self) {
        let counters: BTreeMap<String, u64> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        self.store.lock().await.record_counters(counters);
    }

    fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).map(|v| *v).unwrap_or(0)
    }
}

fn step(machine: &mut StateMachine, next: LearningState) -> std::result::Result<(), FailureReason> {
    machine.advance(next).map_err(|e| {
        error!(error = %e, "Learning pipeline reached an illegal state");
        FailureReason::Internal
    })
}

fn compose_answer(topic: &str, learned: &Learned) -> String {
    let statements: Vec<String> = learned
        .facts
        .iter()
        .map(|f| format!("{} {} {}", f.subject, f.predicate.replace('_', " "), f.object))
        .collect();

    let lead = if learned.from_store {
        "Here is what I know about"
    } else {
        "Here is what I learned about"
    };

    format!("{} {}: {}.", lead, topic, statements.join("; "))
}
