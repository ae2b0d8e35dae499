//! Data models for the knowledge store

use crate::error::{LearningError, Result};
use crate::extractor::CandidateFact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A learned (subject, predicate, object) triple with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: Uuid,
    pub topic: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Extraction confidence in [0, 1]
    pub confidence: f32,
    pub source_url: String,
    /// Reliability of the source in [0, 1]
    pub source_score: f32,
    pub learned_at: DateTime<Utc>,
    /// Digest of subject, predicate, object and source url
    pub hash: String,
}

impl Fact {
    /// Create a new fact; confidence and source score are clamped into [0, 1]
    ///
    /// Fails when the source URL is empty, since every fact must be traceable.
    pub fn new(
        topic: impl Into<String>,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        confidence: f32,
        source_url: impl Into<String>,
        source_score: f32,
    ) -> Result<Self> {
        let source_url = source_url.into();
        if source_url.trim().is_empty() {
            return Err(LearningError::InvalidFact("fact has no source url".to_string()));
        }

        let subject = subject.into();
        let predicate = predicate.into();
        let object = object.into();
        if subject.trim().is_empty() || predicate.trim().is_empty() || object.trim().is_empty() {
            return Err(LearningError::InvalidFact(
                "subject, predicate and object must be non-empty".to_string(),
            ));
        }

        let hash = Self::compute_hash(&subject, &predicate, &object, &source_url);

        Ok(Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            subject,
            predicate,
            object,
            confidence: clamp_unit(confidence),
            source_url,
            source_score: clamp_unit(source_score),
            learned_at: Utc::now(),
            hash,
        })
    }

    /// Build a fact from an extractor candidate
    pub fn from_candidate(
        topic: &str,
        candidate: CandidateFact,
        source_url: &str,
        source_score: f32,
    ) -> Result<Self> {
        Self::new(
            topic,
            candidate.subject,
            candidate.predicate,
            candidate.object,
            candidate.confidence,
            source_url,
            source_score,
        )
    }

    pub fn with_learned_at(mut self, learned_at: DateTime<Utc>) -> Self {
        self.learned_at = learned_at;
        self
    }

    /// Content hash; the same triple from the same source always hashes alike
    pub fn compute_hash(subject: &str, predicate: &str, object: &str, source_url: &str) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(subject.as_bytes());
        hasher.update(b"|");
        hasher.update(predicate.as_bytes());
        hasher.update(b"|");
        hasher.update(object.as_bytes());
        hasher.update(b"|");
        hasher.update(source_url.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Effective trust: confidence weighted by source reliability
    pub fn trust(&self) -> f32 {
        self.confidence * self.source_score
    }

    /// Two facts describe the same slot when subject and predicate agree
    pub fn same_slot(&self, other: &Fact) -> bool {
        self.subject == other.subject && self.predicate == other.predicate
    }

    /// Same triple learned again from the same source
    pub fn is_relearned(&self, other: &Fact) -> bool {
        self.hash == other.hash
    }

    /// Take the newer provenance of a re-learned copy of this fact
    ///
    /// Identity, content and slot stay untouched. Returns whether anything
    /// changed.
    pub fn refresh_from(&mut self, relearned: &Fact) -> bool {
        if relearned.learned_at <= self.learned_at {
            return false;
        }

        self.source_score = relearned.source_score;
        self.confidence = self.confidence.max(relearned.confidence);
        self.learned_at = relearned.learned_at;
        true
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// All facts known about one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub facts: Vec<Fact>,
    pub last_updated: DateTime<Utc>,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            facts: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Outcome of a merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub added: usize,
    pub updated: usize,
    pub rejected: usize,
    /// Stored facts whose source score and age were renewed by a re-learned copy
    #[serde(default)]
    pub refreshed: usize,
    /// False when the write-through failed and only memory holds the change
    pub persisted: bool,
}

impl MergeReport {
    /// Whether the topic gained or replaced facts
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0
    }

    /// Whether the store needs writing
    pub fn touched(&self) -> bool {
        self.changed() || self.refreshed > 0
    }
}

/// Outcome of a prune
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub removed: usize,
    /// False when the removal could not be written to the snapshot
    pub persisted: bool,
}

/// Entry in the bounded log of merges that changed the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentUpdate {
    pub topic: String,
    pub added: usize,
    pub updated: usize,
    pub at: DateTime<Utc>,
}

/// Knowledge store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file
    #[serde(default = "default_path")]
    pub path: String,

    /// Facts older than this are removed by `prune_older_than`
    #[serde(default = "default_max_fact_age_days")]
    pub max_fact_age_days: i64,

    #[serde(default = "default_recent_updates_cap")]
    pub recent_updates_cap: usize,
}

fn default_path() -> String {
    "data/knowledge.json".to_string()
}

fn default_max_fact_age_days() -> i64 {
    30
}

fn default_recent_updates_cap() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_fact_age_days: default_max_fact_age_days(),
            recent_updates_cap: default_recent_updates_cap(),
        }
    }
}

impl StoreConfig {
    pub fn max_fact_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.max_fact_age_days)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(LearningError::Config("store.path must not be empty".to_string()));
        }
        if self.max_fact_age_days <= 0 {
            return Err(LearningError::Config("store.max_fact_age_days must be > 0".to_string()));
        }
        Ok(())
    }
}
