//! Source reliability scoring
//!
//! A source's trust score combines:
//! - Domain reputation (configured table, institutional TLDs, feedback)
//! - A staleness penalty when the text only mentions old years
//! - A bonus for citation-like markers in the snippet
//!
//! Scoring is a pure function of the source and the reputation table.

pub mod reputation;

pub use reputation::{DomainClass, ReputationTable};

use crate::error::{LearningError, Result};
use crate::fetcher::Source;
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").expect("year regex is valid"));

static CITATION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\[\d{1,3}\]",
        r"(?i)\baccording to\b",
        r"(?i)\bet al\.?",
        r"(?i)\bdoi:\s*10\.",
        r"(?i)\bpublished (in|by)\b",
        r"(?i)\b(study|survey|report) (found|shows|showed)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("citation regex is valid"))
    .collect()
});

/// Reliability scoring configuration
///
/// The reputation table and every threshold are data so they can be tuned
/// without touching the merge logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Score for domains with no table entry
    #[serde(default = "default_score")]
    pub default_score: f32,

    /// Domain -> reputation in [0, 1]
    #[serde(default = "default_domains")]
    pub domains: HashMap<String, f32>,

    /// TLD (or second-level suffix such as `ac.uk`) -> reputation
    #[serde(default = "default_institutional_tlds")]
    pub institutional_tlds: HashMap<String, f32>,

    #[serde(default)]
    pub blocked_domains: Vec<String>,

    /// Bonus per distinct citation marker found
    #[serde(default = "default_citation_bonus")]
    pub citation_bonus: f32,

    #[serde(default = "default_max_citation_bonus")]
    pub max_citation_bonus: f32,

    /// Text whose newest year is older than this is considered stale
    #[serde(default = "default_stale_after_years")]
    pub stale_after_years: i32,

    #[serde(default = "default_stale_penalty")]
    pub stale_penalty: f32,

    /// Weight of a single feedback signal in the moving average
    #[serde(default = "default_feedback_weight")]
    pub feedback_weight: f32,
}

fn default_score() -> f32 { 0.4 }
fn default_citation_bonus() -> f32 { 0.05 }
fn default_max_citation_bonus() -> f32 { 0.1 }
fn default_stale_after_years() -> i32 { 10 }
fn default_stale_penalty() -> f32 { 0.1 }
fn default_feedback_weight() -> f32 { 0.2 }

fn default_domains() -> HashMap<String, f32> {
    [
        ("wikipedia.org", 0.9),
        ("britannica.com", 0.9),
        ("nature.com", 0.9),
        ("science.org", 0.9),
        ("nih.gov", 0.9),
        ("reuters.com", 0.8),
        ("bbc.com", 0.8),
        ("bbc.co.uk", 0.8),
        ("nationalgeographic.com", 0.8),
        ("sciencedaily.com", 0.8),
        ("arxiv.org", 0.8),
        ("cnn.com", 0.7),
        ("stackoverflow.com", 0.7),
        ("github.com", 0.7),
        ("duckduckgo.com", 0.6),
    ]
    .into_iter()
    .map(|(domain, score)| (domain.to_string(), score))
    .collect()
}

fn default_institutional_tlds() -> HashMap<String, f32> {
    [
        ("gov", 0.85),
        ("edu", 0.8),
        ("int", 0.8),
        ("mil", 0.75),
        ("ac.uk", 0.8),
        ("gov.uk", 0.85),
        ("edu.au", 0.8),
    ]
    .into_iter()
    .map(|(tld, score)| (tld.to_string(), score))
    .collect()
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            default_score: default_score(),
            domains: default_domains(),
            institutional_tlds: default_institutional_tlds(),
            blocked_domains: Vec::new(),
            citation_bonus: default_citation_bonus(),
            max_citation_bonus: default_max_citation_bonus(),
            stale_after_years: default_stale_after_years(),
            stale_penalty: default_stale_penalty(),
            feedback_weight: default_feedback_weight(),
        }
    }
}

impl ReliabilityConfig {
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);

        if !in_unit(self.default_score) {
            return Err(LearningError::Config(format!(
                "reliability.default_score {} is out of range [0.0, 1.0]",
                self.default_score
            )));
        }
        if let Some((domain, score)) = self.domains.iter().find(|(_, s)| !in_unit(**s)) {
            return Err(LearningError::Config(format!(
                "reliability.domains.{} score {} is out of range [0.0, 1.0]",
                domain, score
            )));
        }
        if !in_unit(self.feedback_weight) {
            return Err(LearningError::Config(
                "reliability.feedback_weight must be within [0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which scoring rules fired for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RationaleTag {
    KnownDomain,
    InstitutionalTld,
    UnknownDomain,
    BlockedDomain,
    MalformedDomain,
    CitationMarkers,
    Stale,
}

impl From<DomainClass> for RationaleTag {
    fn from(class: DomainClass) -> Self {
        match class {
            DomainClass::Known => RationaleTag::KnownDomain,
            DomainClass::InstitutionalTld => RationaleTag::InstitutionalTld,
            DomainClass::Unknown => RationaleTag::UnknownDomain,
            DomainClass::Blocked => RationaleTag::BlockedDomain,
            DomainClass::Malformed => RationaleTag::MalformedDomain,
        }
    }
}

/// Trust assigned to one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityScore {
    pub source_url: String,
    pub score: f32,
    pub rationale_tags: Vec<RationaleTag>,
}

/// Deterministic source scorer
#[derive(Debug, Clone)]
pub struct ReliabilityScorer {
    table: ReputationTable,
    config: ReliabilityConfig,
}

impl ReliabilityScorer {
    pub fn new(config: ReliabilityConfig) -> Self {
        let table = ReputationTable::from_config(&config);
        Self { table, config }
    }

    pub fn table(&self) -> &ReputationTable {
        &self.table
    }

    /// Feedback from the chat loop about an answer's accuracy
    pub fn record_feedback(&mut self, domain: &str, accurate: bool) -> Option<f32> {
        self.table.record_feedback(domain, accurate)
    }

    /// Reputations learned from feedback, for persisting across restarts
    pub fn learned_reputation(&self) -> &BTreeMap<String, f32> {
        self.table.learned()
    }

    pub fn restore_reputation(&mut self, learned: &BTreeMap<String, f32>) {
        self.table.restore_learned(learned);
    }

    /// Score a source
    pub fn score(&self, source: &Source) -> ReliabilityScore {
        let (base, class) = self.table.lookup(&source.domain);
        let mut tags = vec![RationaleTag::from(class)];

        // Blocked domains stay at zero whatever the text looks like
        if class == DomainClass::Blocked {
            return ReliabilityScore {
                source_url: source.url.clone(),
                score: 0.0,
                rationale_tags: tags,
            };
        }

        let mut score = base;

        let markers = CITATION_RES
            .iter()
            .filter(|re| re.is_match(&source.snippet))
            .count();
        if markers > 0 {
            score += (markers as f32 * self.config.citation_bonus).min(self.config.max_citation_bonus);
            tags.push(RationaleTag::CitationMarkers);
        }

        if self.is_stale(source) {
            score -= self.config.stale_penalty;
            tags.push(RationaleTag::Stale);
        }

        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { self.table.default_score() };

        ReliabilityScore {
            source_url: source.url.clone(),
            score,
            rationale_tags: tags,
        }
    }

    /// Newest year mentioned in the text is far behind the retrieval year
    fn is_stale(&self, source: &Source) -> bool {
        let newest = YEAR_RE
            .find_iter(&source.snippet)
            .filter_map(|m| m.as_str().parse::<i32>().ok())
            .max();

        match newest {
            Some(year) => source.retrieved_at.year() - year > self.config.stale_after_years,
            None => false,
        }
    }
}
