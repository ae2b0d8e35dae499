//! Topic-keyed fact store with trust-based merge and write-through snapshots

use super::models::*;
use super::persistence::{JsonFileBackend, Snapshot, SnapshotBackend};
use crate::error::Result;
use crate::metrics::METRICS;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Facts taken from each matching topic by [`KnowledgeStore::relevant`]
const RELEVANT_FACTS_PER_TOPIC: usize = 2;

/// Knowledge store
///
/// All state lives in memory and is flushed to the snapshot backend after
/// every change. The in-memory copy stays authoritative if a flush fails.
#[derive(Debug)]
pub struct KnowledgeStore {
    topics: BTreeMap<String, Topic>,
    recent_updates: VecDeque<RecentUpdate>,
    reputation: BTreeMap<String, f32>,
    counters: BTreeMap<String, u64>,
    backend: Arc<dyn SnapshotBackend>,
    config: StoreConfig,
}

impl KnowledgeStore {
    /// Open the JSON snapshot named by the config, creating an empty store
    /// when it does not exist yet
    pub fn open(config: StoreConfig) -> Result<Self> {
        let backend = Arc::new(JsonFileBackend::new(&config.path));
        Self::with_backend(backend, config)
    }

    pub fn with_backend(backend: Arc<dyn SnapshotBackend>, config: StoreConfig) -> Result<Self> {
        let snapshot = backend.load()?;

        let snapshot = match snapshot {
            Some(snapshot) => {
                info!(
                    topics = snapshot.topics.len(),
                    reputations = snapshot.reputation.len(),
                    saved_at = %snapshot.saved_at,
                    "Loaded knowledge snapshot"
                );
                snapshot
            }
            None => {
                info!("No knowledge snapshot found, starting empty");
                Snapshot::new(BTreeMap::new(), Vec::new())
            }
        };

        Ok(Self {
            topics: snapshot.topics,
            recent_updates: snapshot.recent_updates.into_iter().collect(),
            reputation: snapshot.reputation,
            counters: snapshot.counters,
            backend,
            config,
        })
    }

    /// Merge facts into a topic
    ///
    /// A fact is added when its (subject, predicate) slot is empty, replaces
    /// the stored fact only when its trust is strictly greater, and is
    /// rejected otherwise. A newer copy of the stored fact from the same
    /// source refreshes its source score and age instead. Candidates are
    /// applied in order.
    pub fn merge(&mut self, topic: &str, facts: Vec<Fact>) -> MergeReport {
        let key = normalize_topic(topic);
        let mut report = MergeReport {
            persisted: true,
            ..MergeReport::default()
        };

        let entry = self
            .topics
            .entry(key.clone())
            .or_insert_with(|| Topic::new(key.clone()));

        for mut fact in facts {
            fact.topic = key.clone();

            match entry.facts.iter().position(|existing| existing.same_slot(&fact)) {
                None => {
                    entry.facts.push(fact);
                    report.added += 1;
                }
                Some(idx) if entry.facts[idx].is_relearned(&fact) => {
                    if entry.facts[idx].refresh_from(&fact) {
                        report.refreshed += 1;
                    } else {
                        report.rejected += 1;
                    }
                }
                Some(idx) if fact.trust() > entry.facts[idx].trust() => {
                    debug!(
                        topic = %key,
                        subject = %fact.subject,
                        predicate = %fact.predicate,
                        old = entry.facts[idx].trust(),
                        new = fact.trust(),
                        "Replacing dominated fact"
                    );
                    entry.facts[idx] = fact;
                    report.updated += 1;
                }
                Some(_) => report.rejected += 1,
            }
        }

        if entry.facts.is_empty() {
            self.topics.remove(&key);
        } else if report.touched() {
            entry.last_updated = Utc::now();
        }

        METRICS.record_merge(&report);

        if report.changed() {
            self.push_recent(RecentUpdate {
                topic: key.clone(),
                added: report.added,
                updated: report.updated,
                at: Utc::now(),
            });
        }
        if report.touched() {
            report.persisted = self.flush();
        }

        info!(
            topic = %key,
            added = report.added,
            updated = report.updated,
            refreshed = report.refreshed,
            rejected = report.rejected,
            persisted = report.persisted,
            "Merged facts"
        );

        report
    }

    /// Facts of a topic, highest trust first, newest first on ties
    pub fn lookup(&self, topic: &str) -> Vec<Fact> {
        let mut facts = self
            .topics
            .get(&normalize_topic(topic))
            .map(|t| t.facts.clone())
            .unwrap_or_default();
        sort_by_trust(&mut facts);
        facts
    }

    /// Highest trust among a topic's facts
    pub fn best_trust(&self, topic: &str) -> Option<f32> {
        self.topics
            .get(&normalize_topic(topic))?
            .facts
            .iter()
            .map(Fact::trust)
            .reduce(f32::max)
    }

    /// Delete the facts of a topic matching `filter`
    ///
    /// This is the only way facts leave the store. Topics left empty are
    /// removed.
    pub fn prune<F>(&mut self, topic: &str, filter: F) -> PruneReport
    where
        F: Fn(&Fact) -> bool,
    {
        let key = normalize_topic(topic);
        let report = self.remove_where(|fact| fact.topic == key && filter(fact));
        if report.removed > 0 {
            info!(topic = %key, removed = report.removed, persisted = report.persisted, "Pruned facts");
        }
        report
    }

    /// Delete facts learned longer ago than `max_age`
    pub fn prune_older_than(&mut self, max_age: chrono::Duration) -> PruneReport {
        let cutoff = Utc::now() - max_age;
        let report = self.remove_where(|fact| fact.learned_at < cutoff);
        if report.removed > 0 {
            info!(
                removed = report.removed,
                persisted = report.persisted,
                cutoff = %cutoff,
                "Pruned stale facts"
            );
        }
        report
    }

    /// Prune with the configured maximum fact age
    pub fn prune_stale(&mut self) -> PruneReport {
        let max_age = self.config.max_fact_age();
        self.prune_older_than(max_age)
    }

    /// Best facts from topics whose names share words with `text`
    ///
    /// Topics are ranked by the number of shared words; each contributes
    /// its top facts.
    pub fn relevant(&self, text: &str, k: usize) -> Vec<Fact> {
        let words = significant_words(text);
        if words.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, Fact)> = Vec::new();
        for (name, topic) in &self.topics {
            let topic_words = significant_words(name);
            let relevance = words.iter().filter(|w| topic_words.contains(w)).count();
            if relevance == 0 {
                continue;
            }

            let mut facts = topic.facts.clone();
            sort_by_trust(&mut facts);
            scored.extend(
                facts
                    .into_iter()
                    .take(RELEVANT_FACTS_PER_TOPIC)
                    .map(|fact| (relevance, fact)),
            );
        }

        scored.sort_by(|(ra, a), (rb, b)| {
            rb.cmp(ra)
                .then_with(|| b.trust().total_cmp(&a.trust()))
                .then_with(|| b.learned_at.cmp(&a.learned_at))
        });
        scored.into_iter().take(k).map(|(_, fact)| fact).collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    pub fn topic(&self, topic: &str) -> Option<&Topic> {
        self.topics.get(&normalize_topic(topic))
    }

    pub fn fact_count(&self) -> usize {
        self.topics.values().map(|t| t.facts.len()).sum()
    }

    /// Mean source score over all facts, 0.0 for an empty store
    pub fn average_reliability(&self) -> f32 {
        let (sum, count) = self
            .topics
            .values()
            .flat_map(|t| t.facts.iter())
            .fold((0.0f32, 0usize), |(sum, count), f| (sum + f.source_score, count + 1));

        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Most recent merges that changed the store, oldest first
    pub fn recent_updates(&self) -> Vec<RecentUpdate> {
        self.recent_updates.iter().cloned().collect()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Feedback-adjusted domain reputations saved with the store
    pub fn reputation(&self) -> &BTreeMap<String, f32> {
        &self.reputation
    }

    /// Replace the saved reputations and write them through
    ///
    /// Returns whether the snapshot was written.
    pub fn record_reputation(&mut self, reputation: BTreeMap<String, f32>) -> bool {
        if reputation == self.reputation {
            return true;
        }
        self.reputation = reputation;
        self.flush()
    }

    /// Coordinator counters saved with the store
    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    /// Replace the saved counters and write them through
    pub fn record_counters(&mut self, counters: BTreeMap<String, u64>) -> bool {
        if counters == self.counters {
            return true;
        }
        self.counters = counters;
        self.flush()
    }

    /// Write the current state to the backend, retrying once
    ///
    /// Returns whether the snapshot was written.
    pub fn flush(&self) -> bool {
        let snapshot = self.snapshot();

        match self.backend.save(&snapshot) {
            Ok(()) => true,
            Err(first) => {
                warn!(error = %first, "Snapshot write failed, retrying");
                match self.backend.save(&snapshot) {
                    Ok(()) => true,
                    Err(second) => {
                        METRICS.persistence_failures.inc();
                        error!(
                            error = %second,
                            "Snapshot write failed twice, keeping in-memory state only"
                        );
                        false
                    }
                }
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            reputation: self.reputation.clone(),
            counters: self.counters.clone(),
            ..Snapshot::new(self.topics.clone(), self.recent_updates())
        }
    }

    fn remove_where<F>(&mut self, predicate: F) -> PruneReport
    where
        F: Fn(&Fact) -> bool,
    {
        let mut removed = 0;
        for topic in self.topics.values_mut() {
            let before = topic.facts.len();
            topic.facts.retain(|fact| !predicate(fact));
            let delta = before - topic.facts.len();
            if delta > 0 {
                topic.last_updated = Utc::now();
                removed += delta;
            }
        }
        self.topics.retain(|_, topic| !topic.facts.is_empty());

        let persisted = removed == 0 || self.flush();
        PruneReport { removed, persisted }
    }

    fn push_recent(&mut self, update: RecentUpdate) {
        self.recent_updates.push_back(update);
        while self.recent_updates.len() > self.config.recent_updates_cap {
            self.recent_updates.pop_front();
        }
    }
}

/// Canonical topic key: trimmed, lower-cased, single-spaced
pub fn normalize_topic(topic: &str) -> String {
    topic
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn sort_by_trust(facts: &mut [Fact]) {
    facts.sort_by(|a, b| {
        b.trust()
            .total_cmp(&a.trust())
            .then_with(|| b.learned_at.cmp(&a.learned_at))
    });
}

fn significant_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LearningError;
    use crate::knowledge::persistence::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> KnowledgeStore {
        KnowledgeStore::with_backend(Arc::new(MemoryBackend::new()), StoreConfig::default()).unwrap()
    }

    fn fact(subject: &str, predicate: &str, object: &str, confidence: f32, score: f32) -> Fact {
        Fact::new(
            "ignored",
            subject,
            predicate,
            object,
            confidence,
            "https://en.wikipedia.org/wiki/Test",
            score,
        )
        .unwrap()
    }

    #[derive(Debug, Default)]
    struct FailingBackend {
        attempts: AtomicUsize,
    }

    impl SnapshotBackend for FailingBackend {
        fn load(&self) -> Result<Option<Snapshot>> {
            Ok(None)
        }

        fn save(&self, _snapshot: &Snapshot) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(LearningError::Persistence("disk full".to_string()))
        }
    }

    #[test]
    fn test_merge_adds_new_slots() {
        let mut store = store();
        let report = store.merge(
            "Photosynthesis",
            vec![
                fact("photosynthesis", "is", "a process", 0.8, 0.9),
                fact("photosynthesis", "discovered_by", "Jan Ingenhousz", 0.85, 0.9),
            ],
        );

        assert_eq!(report.added, 2);
        assert_eq!(report.rejected, 0);
        assert!(report.persisted);
        assert_eq!(store.topics(), vec!["photosynthesis"]);
        assert!(store.lookup("photosynthesis").iter().all(|f| f.topic == "photosynthesis"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut store = store();
        let facts = vec![fact("rust", "is", "a language", 0.8, 0.9)];

        store.merge("rust", facts.clone());
        let report = store.merge("rust", facts);

        assert_eq!(report.added, 0);
        assert_eq!(report.updated, 0);
        assert_eq!(report.rejected, 1);
        assert_eq!(store.fact_count(), 1);
    }

    #[test]
    fn test_dominant_fact_wins_in_either_order() {
        let weak = fact("rust", "is", "a game", 0.5, 0.4);
        let strong = fact("rust", "is", "a language", 0.8, 0.9);

        let mut a = store();
        a.merge("rust", vec![weak.clone()]);
        let report = a.merge("rust", vec![strong.clone()]);
        assert_eq!(report.updated, 1);

        let mut b = store();
        b.merge("rust", vec![strong.clone()]);
        let report = b.merge("rust", vec![weak.clone()]);
        assert_eq!(report.rejected, 1);

        let mut c = store();
        c.merge("rust", vec![weak, strong]);

        for store in [a, b, c] {
            let facts = store.lookup("rust");
            assert_eq!(facts.len(), 1);
            assert_eq!(facts[0].object, "a language");
        }
    }

    #[test]
    fn test_tie_keeps_existing() {
        let mut store = store();
        store.merge("rust", vec![fact("rust", "is", "first", 0.8, 0.5)]);
        let report = store.merge("rust", vec![fact("rust", "is", "second", 0.5, 0.8)]);

        assert_eq!(report.rejected, 1);
        assert_eq!(store.lookup("rust")[0].object, "first");
    }

    #[test]
    fn test_lookup_ordering() {
        let mut store = store();
        store.merge(
            "rust",
            vec![
                fact("rust", "is", "a language", 0.6, 0.9),
                fact("rust", "designed_by", "Graydon Hoare", 0.85, 0.9),
                fact("rust", "has_been", "popular", 0.65, 0.4),
            ],
        );

        let predicates: Vec<String> =
            store.lookup("RUST").into_iter().map(|f| f.predicate).collect();
        assert_eq!(predicates, vec!["designed_by", "is", "has_been"]);
        assert!(store.lookup("unknown").is_empty());
    }

    #[test]
    fn test_lookup_equal_trust_newest_first() {
        let mut store = store();
        let now = Utc::now();
        store.merge(
            "rust",
            vec![
                fact("rust", "is", "a language", 0.8, 0.9)
                    .with_learned_at(now - chrono::Duration::days(3)),
                fact("rust", "designed_by", "Graydon Hoare", 0.8, 0.9)
                    .with_learned_at(now - chrono::Duration::days(1)),
                fact("rust", "released_in", "2015", 0.9, 0.8)
                    .with_learned_at(now - chrono::Duration::days(2)),
            ],
        );

        let predicates: Vec<String> = store.lookup("rust").into_iter().map(|f| f.predicate).collect();
        assert_eq!(predicates, vec!["designed_by", "released_in", "is"]);
    }

    #[test]
    fn test_relearned_fact_refreshes_score() {
        let mut store = store();
        let original = fact("rust", "is", "a language", 0.8, 0.6)
            .with_learned_at(Utc::now() - chrono::Duration::days(40));
        store.merge("rust", vec![original.clone()]);

        let report = store.merge("rust", vec![fact("rust", "is", "a language", 0.8, 0.9)]);
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.added + report.updated + report.rejected, 0);
        assert!(report.persisted);

        let stored = &store.lookup("rust")[0];
        assert_eq!(stored.id, original.id);
        assert_eq!(stored.source_score, 0.9);
        assert!(stored.learned_at > original.learned_at);

        // A refresh is not logged as a content change and keeps the fact from going stale
        assert_eq!(store.recent_updates().len(), 1);
        assert_eq!(store.prune_stale().removed, 0);
    }

    #[test]
    fn test_prune_removes_empty_topics() {
        let mut store = store();
        store.merge(
            "rust",
            vec![
                fact("rust", "is", "a language", 0.8, 0.9),
                fact("cargo", "is", "a build tool", 0.8, 0.9),
            ],
        );

        assert_eq!(store.prune("photosynthesis", |_| true).removed, 0);
        assert_eq!(store.prune("rust", |f| f.subject == "cargo").removed, 1);
        let report = store.prune("rust", |f| f.predicate == "is");
        assert_eq!(report, PruneReport { removed: 1, persisted: true });
        assert!(store.topics().is_empty());
        assert_eq!(store.prune("rust", |_| true).removed, 0);
    }

    #[test]
    fn test_prune_older_than() {
        let mut store = store();
        let old = fact("rust", "is", "old news", 0.8, 0.9)
            .with_learned_at(Utc::now() - chrono::Duration::days(60));
        let fresh = fact("rust", "designed_by", "Graydon Hoare", 0.8, 0.9);
        store.merge("rust", vec![old, fresh]);

        assert_eq!(store.prune_stale().removed, 1);
        assert_eq!(store.fact_count(), 1);
    }

    #[test]
    fn test_failed_prune_write_is_reported() {
        let backend = Arc::new(FailingBackend::default());
        let mut store = KnowledgeStore::with_backend(backend.clone(), StoreConfig::default()).unwrap();
        store.merge("rust", vec![fact("rust", "is", "a language", 0.8, 0.9)]);

        let report = store.prune("rust", |_| true);
        assert_eq!(report.removed, 1);
        assert!(!report.persisted);
        assert_eq!(store.fact_count(), 0);

        // Nothing removed, nothing to write
        let attempts = backend.attempts.load(Ordering::SeqCst);
        assert!(store.prune_stale().persisted);
        assert_eq!(backend.attempts.load(Ordering::SeqCst), attempts);
    }

    #[test]
    fn test_relevant_by_topic_words() {
        let mut store = store();
        store.merge("rust programming", vec![fact("rust", "is", "a language", 0.8, 0.9)]);
        store.merge("photosynthesis", vec![fact("photosynthesis", "is", "a process", 0.8, 0.9)]);

        let facts = store.relevant("Tell me about programming in Rust", 3);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].topic, "rust programming");
        assert!(store.relevant("a b", 3).is_empty());
    }

    #[test]
    fn test_stats() {
        let mut store = store();
        assert_eq!(store.average_reliability(), 0.0);

        store.merge("a topic", vec![fact("x", "is", "y", 0.8, 0.9)]);
        store.merge("b topic", vec![fact("x", "is", "y", 0.8, 0.5)]);

        assert_eq!(store.fact_count(), 2);
        assert!((store.average_reliability() - 0.7).abs() < 1e-6);
        assert_eq!(store.recent_updates().len(), 2);
    }

    #[test]
    fn test_recent_updates_bounded() {
        let config = StoreConfig {
            recent_updates_cap: 3,
            ..StoreConfig::default()
        };
        let mut store = KnowledgeStore::with_backend(Arc::new(MemoryBackend::new()), config).unwrap();

        for i in 0..5 {
            store.merge(&format!("topic {}", i), vec![fact("x", "is", "y", 0.8, 0.9)]);
        }

        let recent = store.recent_updates();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].topic, "topic 2");
    }

    #[test]
    fn test_reload_reproduces_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("knowledge.json").display().to_string(),
            ..StoreConfig::default()
        };

        let mut store = KnowledgeStore::open(config.clone()).unwrap();
        store.merge("rust", vec![fact("rust", "is", "a language", 0.8, 0.9)]);
        store.merge("photosynthesis", vec![fact("photosynthesis", "is", "a process", 0.8, 0.9)]);

        let reloaded = KnowledgeStore::open(config).unwrap();
        assert_eq!(reloaded.topics(), store.topics());
        assert_eq!(reloaded.lookup("rust"), store.lookup("rust"));
        assert_eq!(reloaded.recent_updates(), store.recent_updates());
    }

    #[test]
    fn test_reputation_and_counters_survive_reopen() {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = KnowledgeStore::with_backend(backend.clone(), StoreConfig::default()).unwrap();

        let reputation = BTreeMap::from([("smallblog.example".to_string(), 0.52)]);
        let counters = BTreeMap::from([
            ("searches_performed".to_string(), 4),
            ("outcome.learned".to_string(), 3),
        ]);
        assert!(store.record_reputation(reputation.clone()));
        assert!(store.record_counters(counters.clone()));

        let reopened = KnowledgeStore::with_backend(backend, StoreConfig::default()).unwrap();
        assert_eq!(reopened.reputation(), &reputation);
        assert_eq!(reopened.counters(), &counters);
    }

    #[test]
    fn test_failed_flush_keeps_memory_state() {
        let backend = Arc::new(FailingBackend::default());
        let mut store = KnowledgeStore::with_backend(backend.clone(), StoreConfig::default()).unwrap();

        let report = store.merge("rust", vec![fact("rust", "is", "a language", 0.8, 0.9)]);

        assert_eq!(report.added, 1);
        assert!(!report.persisted);
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.fact_count(), 1);
    }

    #[test]
    fn test_unchanged_merge_does_not_write() {
        let backend = Arc::new(FailingBackend::default());
        let mut store = KnowledgeStore::with_backend(backend.clone(), StoreConfig::default()).unwrap();

        let report = store.merge("rust", Vec::new());
        assert!(report.persisted);
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 0);
        assert!(store.topics().is_empty());
    }
}
