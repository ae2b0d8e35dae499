//! End-to-end learning scenarios with in-process search backends

use async_trait::async_trait;
use internet_learning::error::{LearningError, Result};
use internet_learning::extractor::{ExtractorConfig, FactExtractor};
use internet_learning::fetcher::{FetchError, FetcherConfig, SearchBackend, Source, SourceFetcher};
use internet_learning::knowledge::{
    KnowledgeStore, MemoryBackend, Snapshot, SnapshotBackend, StoreConfig,
};
use internet_learning::learning::{
    CoordinatorConfig, FailureReason, LearningCoordinator, LearningState,
};
use internet_learning::reliability::{ReliabilityConfig, ReliabilityScorer};
use internet_learning::translate::PassthroughTranslator;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Returns a different batch of sources on every call
struct ScriptedBackend {
    name: String,
    batches: Mutex<VecDeque<Vec<Source>>>,
}

impl ScriptedBackend {
    fn new(name: &str, batches: Vec<Vec<Source>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            batches: Mutex::new(batches.into()),
        })
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> std::result::Result<Vec<Source>, FetchError> {
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

struct DownBackend;

#[async_trait]
impl SearchBackend for DownBackend {
    fn name(&self) -> &str {
        "down"
    }

    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> std::result::Result<Vec<Source>, FetchError> {
        Err(FetchError::UpstreamError("Status 503".to_string()))
    }
}

#[derive(Debug)]
struct ReadOnlyDisk;

impl SnapshotBackend for ReadOnlyDisk {
    fn load(&self) -> Result<Option<Snapshot>> {
        Ok(None)
    }

    fn save(&self, _snapshot: &Snapshot) -> Result<()> {
        Err(LearningError::Persistence("read-only file system".to_string()))
    }
}

fn fetcher_config() -> FetcherConfig {
    FetcherConfig {
        retry_attempts: 0,
        ..FetcherConfig::default()
    }
}

fn coordinator(backends: Vec<Arc<dyn SearchBackend>>, store: KnowledgeStore) -> LearningCoordinator {
    let reliability = ReliabilityConfig {
        blocked_domains: vec!["contentfarm.example".to_string()],
        ..ReliabilityConfig::default()
    };

    LearningCoordinator::new(
        SourceFetcher::new(backends, fetcher_config()),
        ReliabilityScorer::new(reliability),
        FactExtractor::new(ExtractorConfig::default()).unwrap(),
        store,
        Arc::new(PassthroughTranslator),
        CoordinatorConfig::default(),
    )
}

fn memory_store() -> KnowledgeStore {
    KnowledgeStore::with_backend(Arc::new(MemoryBackend::new()), StoreConfig::default()).unwrap()
}

fn wikipedia_photosynthesis() -> Source {
    Source::new(
        "https://en.wikipedia.org/wiki/Photosynthesis",
        "Photosynthesis",
        "Photosynthesis is a process used by plants.",
        "scripted",
    )
}

#[tokio::test]
async fn test_photosynthesis_scenario() {
    let backend = ScriptedBackend::new("scripted", vec![vec![wikipedia_photosynthesis()]]);
    let coordinator = coordinator(vec![backend], memory_store());

    let answer = coordinator
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap();
    assert_eq!(answer.report.added, 1);
    assert_eq!(
        answer.trace,
        vec![
            LearningState::Idle,
            LearningState::Fetching,
            LearningState::Scoring,
            LearningState::Extracting,
            LearningState::Merging,
            LearningState::Done,
        ]
    );

    let facts = coordinator.lookup("photosynthesis").await;
    let first = &facts[0];
    assert_eq!(first.topic, "photosynthesis");
    assert_eq!(first.subject, "photosynthesis");
    assert_eq!(first.predicate, "is");
    assert_eq!(first.object, "a process used by plants");
    assert!((first.confidence - 0.8).abs() < 1e-6);
    assert_eq!(first.source_url, "https://en.wikipedia.org/wiki/Photosynthesis");
}

#[tokio::test]
async fn test_repeat_query_rejects_less_trusted_contradiction() {
    let blog = Source::new(
        "https://plantfacts.example/photosynthesis",
        "Plant facts",
        "Photosynthesis is a kind of magic performed by leaves.",
        "scripted",
    );
    let backend = ScriptedBackend::new(
        "scripted",
        vec![vec![wikipedia_photosynthesis()], vec![blog]],
    );
    let coordinator = coordinator(vec![backend], memory_store());

    coordinator
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap();
    let answer = coordinator
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap();

    assert_eq!(answer.report.added, 0);
    assert_eq!(answer.report.updated, 0);
    assert_eq!(answer.report.rejected, 1);
    assert_eq!(answer.facts[0].object, "a process used by plants");

    let stats = coordinator.stats().await;
    assert_eq!(stats.searches_performed, 2);
    assert_eq!(stats.total_facts, 1);
}

#[tokio::test]
async fn test_failing_backend_is_isolated() {
    let working = ScriptedBackend::new("scripted", vec![vec![wikipedia_photosynthesis()]]);
    let backends: Vec<Arc<dyn SearchBackend>> = vec![Arc::new(DownBackend), working];
    let coordinator = coordinator(backends, memory_store());

    let answer = coordinator
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap();
    assert_eq!(answer.sources_used, 1);
    assert_eq!(answer.report.added, 1);
}

#[tokio::test]
async fn test_no_sources() {
    let backends: Vec<Arc<dyn SearchBackend>> = vec![Arc::new(DownBackend)];
    let coordinator = coordinator(backends, memory_store());

    let failure = coordinator
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::NoSourcesFound);
    assert!(failure.message.contains("could not find information"));
    assert_eq!(
        failure.trace,
        vec![LearningState::Idle, LearningState::Fetching, LearningState::Failed]
    );

    let stats = coordinator.stats().await;
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.outcomes.get("no-sources"), Some(&1));
}

#[tokio::test]
async fn test_unreliable_sources_dropped() {
    let farm = Source::new(
        "https://www.contentfarm.example/photosynthesis",
        "Photosynthesis",
        "Photosynthesis is a conspiracy.",
        "scripted",
    );
    let backend = ScriptedBackend::new("scripted", vec![vec![farm]]);
    let coordinator = coordinator(vec![backend], memory_store());

    let failure = coordinator
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap_err();
    assert_eq!(failure.reason, FailureReason::LowReliability);
    assert!(coordinator.lookup("photosynthesis").await.is_empty());
}

#[tokio::test]
async fn test_persistence_failure_surfaces_warning() {
    let store = KnowledgeStore::with_backend(Arc::new(ReadOnlyDisk), StoreConfig::default()).unwrap();
    let backend = ScriptedBackend::new("scripted", vec![vec![wikipedia_photosynthesis()]]);
    let coordinator = coordinator(vec![backend], store);

    let answer = coordinator
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap();
    assert!(!answer.report.persisted);
    assert!(answer.warning.is_some());
    assert_eq!(coordinator.lookup("photosynthesis").await.len(), 1);
}

#[tokio::test]
async fn test_learned_facts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("knowledge.json").display().to_string(),
        ..StoreConfig::default()
    };

    let backend = ScriptedBackend::new("scripted", vec![vec![wikipedia_photosynthesis()]]);
    let coordinator = coordinator(vec![backend], KnowledgeStore::open(config.clone()).unwrap());
    coordinator
        .handle_query("Tell me about photosynthesis", "en")
        .await
        .unwrap();

    let reopened = KnowledgeStore::open(config).unwrap();
    assert_eq!(reopened.lookup("photosynthesis"), coordinator.lookup("photosynthesis").await);
    assert_eq!(reopened.recent_updates().len(), 1);
}

#[tokio::test]
async fn test_feedback_and_counters_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("knowledge.json").display().to_string(),
        ..StoreConfig::default()
    };

    let backend = ScriptedBackend::new("scripted", vec![vec![wikipedia_photosynthesis()]]);
    let first = coordinator(vec![backend], KnowledgeStore::open(config.clone()).unwrap());
    first
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap();
    let raised = first
        .record_feedback("https://smallblog.example/x", true)
        .await
        .unwrap();
    assert!(raised > 0.4);

    let idle = ScriptedBackend::new("scripted", Vec::new());
    let second = coordinator(vec![idle], KnowledgeStore::open(config).unwrap());

    assert_eq!(second.source_reputation("https://smallblog.example/y").await, raised);
    assert_eq!(
        second.source_reputation("https://unheard-of.example/").await,
        ReliabilityConfig::default().default_score
    );

    let stats = second.stats().await;
    assert_eq!(stats.searches_performed, 1);
    assert_eq!(stats.queries_handled, 1);
    assert_eq!(stats.outcomes.get("learned"), Some(&1));
}

#[tokio::test]
async fn test_relevant_facts_for_chat() {
    let backend = ScriptedBackend::new("scripted", vec![vec![wikipedia_photosynthesis()]]);
    let coordinator = coordinator(vec![backend], memory_store());
    coordinator
        .handle_query("What is photosynthesis?", "en")
        .await
        .unwrap();

    let facts = coordinator
        .relevant_facts("I was reading about photosynthesis today", 3)
        .await;
    assert_eq!(facts.len(), 1);
    assert!(coordinator.relevant_facts("nothing related", 3).await.is_empty());
}
