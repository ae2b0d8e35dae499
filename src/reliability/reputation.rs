//! Domain reputation table

use super::ReliabilityConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Why a domain received its base score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainClass {
    Known,
    InstitutionalTld,
    Unknown,
    Blocked,
    Malformed,
}

/// Static domain reputations plus accumulated feedback
#[derive(Debug, Clone)]
pub struct ReputationTable {
    domains: HashMap<String, f32>,
    tld_scores: HashMap<String, f32>,
    blocked: HashSet<String>,
    default_score: f32,
    feedback_weight: f32,
    /// Scores set by feedback, kept apart so they can be saved and restored
    learned: BTreeMap<String, f32>,
}

impl ReputationTable {
    pub fn from_config(config: &ReliabilityConfig) -> Self {
        Self {
            domains: config
                .domains
                .iter()
                .map(|(domain, score)| (normalize_domain(domain), score.clamp(0.0, 1.0)))
                .collect(),
            tld_scores: config
                .institutional_tlds
                .iter()
                .map(|(tld, score)| (tld.trim_matches('.').to_lowercase(), score.clamp(0.0, 1.0)))
                .collect(),
            blocked: config.blocked_domains.iter().map(|d| normalize_domain(d)).collect(),
            default_score: config.default_score.clamp(0.0, 1.0),
            feedback_weight: config.feedback_weight.clamp(0.0, 1.0),
            learned: BTreeMap::new(),
        }
    }

    /// Feedback-adjusted scores by normalized domain
    pub fn learned(&self) -> &BTreeMap<String, f32> {
        &self.learned
    }

    /// Re-apply feedback recorded in an earlier run
    ///
    /// Malformed and blocked domains are skipped; a domain blocked since
    /// stays blocked.
    pub fn restore_learned(&mut self, learned: &BTreeMap<String, f32>) {
        for (domain, score) in learned {
            let (_, class) = self.lookup(domain);
            if matches!(class, DomainClass::Malformed | DomainClass::Blocked) || score.is_nan() {
                continue;
            }
            let domain = normalize_domain(domain);
            let score = score.clamp(0.0, 1.0);
            self.domains.insert(domain.clone(), score);
            self.learned.insert(domain, score);
        }
    }

    pub fn default_score(&self) -> f32 {
        self.default_score
    }

    /// Base score for a domain and the rule that produced it
    ///
    /// Entries match on any dotted suffix, so `en.wikipedia.org` picks up the
    /// `wikipedia.org` entry. Never fails: anything unparsable gets the
    /// default score.
    pub fn lookup(&self, domain: &str) -> (f32, DomainClass) {
        let domain = normalize_domain(domain);
        if !is_plausible_domain(&domain) {
            return (self.default_score, DomainClass::Malformed);
        }

        let suffixes = dotted_suffixes(&domain);

        if suffixes.iter().any(|suffix| self.blocked.contains(*suffix)) {
            return (0.0, DomainClass::Blocked);
        }

        // Longest suffix first, so feedback on a subdomain wins over its parent
        if let Some(score) = suffixes.iter().find_map(|suffix| self.domains.get(*suffix)) {
            return (*score, DomainClass::Known);
        }

        let labels: Vec<&str> = domain.split('.').collect();
        let tld_candidates = [
            labels.len().checked_sub(2).map(|i| labels[i..].join(".")),
            labels.last().map(|tld| tld.to_string()),
        ];
        if let Some(score) = tld_candidates
            .iter()
            .flatten()
            .find_map(|tld| self.tld_scores.get(tld))
        {
            return (*score, DomainClass::InstitutionalTld);
        }

        (self.default_score, DomainClass::Unknown)
    }

    /// Nudge a domain's reputation toward 1.0 (accurate) or 0.0 (inaccurate)
    ///
    /// Returns the new score, or `None` for malformed or blocked domains.
    pub fn record_feedback(&mut self, domain: &str, accurate: bool) -> Option<f32> {
        let (current, class) = self.lookup(domain);
        if matches!(class, DomainClass::Malformed | DomainClass::Blocked) {
            return None;
        }

        let target = if accurate { 1.0 } else { 0.0 };
        let updated = (current * (1.0 - self.feedback_weight) + target * self.feedback_weight)
            .clamp(0.0, 1.0);

        let domain = normalize_domain(domain);
        self.domains.insert(domain.clone(), updated);
        self.learned.insert(domain, updated);
        Some(updated)
    }
}

fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('.').to_lowercase();
    domain.strip_prefix("www.").map(str::to_string).unwrap_or(domain)
}

fn is_plausible_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.contains("..")
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// `a.b.c.org` -> [`a.b.c.org`, `b.c.org`, `c.org`]
fn dotted_suffixes(domain: &str) -> Vec<&str> {
    let mut suffixes = vec![domain];
    let mut rest = domain;
    while let Some(pos) = rest.find('.') {
        rest = &rest[pos + 1..];
        if rest.contains('.') {
            suffixes.push(rest);
        }
    }
    suffixes
}
