//! Pattern-based fact extraction from noisy web text
//!
//! Text is cleaned, split into sentences and run through an ordered
//! [`RuleSet`]. Extraction never fails on bad input: unparsable sentences
//! are skipped and the worst case is an empty sequence.

pub mod rules;

pub use rules::{PatternRule, RuleMatch, RuleSet, RuleSpec};

use crate::error::{LearningError, Result};
use crate::fetcher::Source;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PARENTHETICAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^()]*\)").expect("parenthetical regex is valid"));
static BRACKET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]*\]").expect("bracket regex is valid"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

const PRONOUNS: &[&str] = &["it", "this", "that", "they", "these", "those", "he", "she"];
const ARTICLES: &[&str] = &["the ", "a ", "an "];
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "st", "jr", "sr", "vs", "e.g", "i.e", "approx", "u.s", "u.k",
];

/// Abbreviations that are also ordinary sentence-final words; they only
/// continue the sentence when a number or lower-case word follows
const TRAILING_ABBREVIATIONS: &[&str] = &["no", "co", "inc", "ltd", "etc"];

/// Fact extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_min_sentence_chars")]
    pub min_sentence_chars: usize,

    #[serde(default = "default_max_sentence_chars")]
    pub max_sentence_chars: usize,

    #[serde(default = "default_max_subject_words")]
    pub max_subject_words: usize,

    #[serde(default = "default_max_object_chars")]
    pub max_object_chars: usize,

    /// Confidence removed when a pronoun subject is resolved from the title
    #[serde(default = "default_pronoun_penalty")]
    pub pronoun_penalty: f32,

    #[serde(default = "default_max_facts_per_source")]
    pub max_facts_per_source: usize,

    /// Extra rules, tried before the built-in ones
    #[serde(default)]
    pub custom_rules: Vec<RuleSpec>,
}

fn default_min_sentence_chars() -> usize { 15 }
fn default_max_sentence_chars() -> usize { 500 }
fn default_max_subject_words() -> usize { 6 }
fn default_max_object_chars() -> usize { 300 }
fn default_pronoun_penalty() -> f32 { 0.1 }
fn default_max_facts_per_source() -> usize { 20 }

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: default_min_sentence_chars(),
            max_sentence_chars: default_max_sentence_chars(),
            max_subject_words: default_max_subject_words(),
            max_object_chars: default_max_object_chars(),
            pronoun_penalty: default_pronoun_penalty(),
            max_facts_per_source: default_max_facts_per_source(),
            custom_rules: Vec::new(),
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_sentence_chars > self.max_sentence_chars {
            return Err(LearningError::Config(
                "extractor.min_sentence_chars exceeds max_sentence_chars".to_string(),
            ));
        }
        if self.max_subject_words == 0 {
            return Err(LearningError::Config("extractor.max_subject_words must be > 0".to_string()));
        }
        Ok(())
    }
}

/// A triple extracted from text, before it is tied to a topic and source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFact {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f32,
    /// Name of the rule that produced it
    pub rule: String,
}

/// Rule-driven fact extractor
#[derive(Debug, Clone)]
pub struct FactExtractor {
    rules: RuleSet,
    config: ExtractorConfig,
}

impl FactExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let rules = RuleSet::with_custom(&config.custom_rules)?;
        Ok(Self { rules, config })
    }

    pub fn with_rules(rules: RuleSet, config: ExtractorConfig) -> Self {
        Self { rules, config }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Extract candidate facts from a source's snippet
    ///
    /// Pronoun subjects ("It is ...") are attributed to the source title.
    pub fn extract<'a>(&'a self, source: &Source) -> impl Iterator<Item = CandidateFact> + 'a {
        let hint = normalize_subject(&clean_text(&source.title));
        self.extract_with_hint(&source.snippet, hint)
    }

    /// Extract from raw text with no title to resolve pronouns against
    pub fn extract_text<'a>(&'a self, text: &str) -> impl Iterator<Item = CandidateFact> + 'a {
        self.extract_with_hint(text, String::new())
    }

    /// Extract from arbitrary bytes; invalid UTF-8 is replaced, never rejected
    pub fn extract_bytes<'a>(&'a self, bytes: &[u8]) -> impl Iterator<Item = CandidateFact> + 'a {
        self.extract_with_hint(&String::from_utf8_lossy(bytes), String::new())
    }

    fn extract_with_hint<'a>(
        &'a self,
        text: &str,
        subject_hint: String,
    ) -> impl Iterator<Item = CandidateFact> + 'a {
        let sentences = split_sentences(&clean_text(text));

        sentences
            .into_iter()
            .filter(move |s| {
                let len = s.chars().count();
                len >= self.config.min_sentence_chars && len <= self.config.max_sentence_chars
            })
            .filter_map(move |sentence| {
                let m = self.rules.first_match(&sentence)?;
                self.finish(m, &subject_hint)
            })
            .take(self.config.max_facts_per_source)
    }

    /// Normalize a raw rule match, or drop it
    fn finish(&self, m: RuleMatch, subject_hint: &str) -> Option<CandidateFact> {
        let mut subject = normalize_subject(&m.subject);
        let mut confidence = m.confidence;

        if PRONOUNS.contains(&subject.as_str()) {
            if subject_hint.is_empty() {
                return None;
            }
            subject = subject_hint.to_string();
            confidence -= self.config.pronoun_penalty;
        }

        if subject.is_empty()
            || subject.split_whitespace().count() > self.config.max_subject_words
            || !subject.chars().any(char::is_alphanumeric)
        {
            return None;
        }

        let object = m
            .object
            .trim()
            .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ';' | ':' | ','))
            .trim()
            .to_string();
        if object.is_empty()
            || object.chars().count() > self.config.max_object_chars
            || !object.chars().any(char::is_alphanumeric)
        {
            return None;
        }

        Some(CandidateFact {
            subject,
            predicate: m.predicate,
            object,
            confidence: confidence.clamp(0.0, 1.0),
            rule: m.rule,
        })
    }
}

/// Drop parentheticals and bracketed citation markers, collapse whitespace
pub fn clean_text(text: &str) -> String {
    let text = PARENTHETICAL_RE.replace_all(text, "");
    let text = BRACKET_RE.replace_all(&text, "");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Lower-case, trim and drop a leading article
pub fn normalize_subject(subject: &str) -> String {
    let subject = subject
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    ARTICLES
        .iter()
        .find_map(|article| subject.strip_prefix(article))
        .map(|rest| rest.trim().to_string())
        .unwrap_or(subject)
}

/// Split on `.`, `!`, `?` followed by whitespace or end of text
///
/// A period after a known abbreviation or a single-letter initial does not
/// end a sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        if !matches!(c, '.' | '!' | '?') {
            continue;
        }

        let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
        if !at_boundary {
            continue;
        }
        if c == '.' {
            let next_word = chars.clone().find(|next| !next.is_whitespace());
            if ends_with_abbreviation(&current, next_word) {
                continue;
            }
        }

        let sentence = current
            .trim()
            .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?'))
            .trim()
            .to_string();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        current.clear();
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    sentences
}

fn ends_with_abbreviation(fragment: &str, next_word: Option<char>) -> bool {
    let last_word = fragment
        .trim_end_matches('.')
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .to_lowercase();

    let is_initial = last_word.chars().count() == 1
        && last_word.chars().all(char::is_alphabetic)
        && fragment.trim_end_matches('.').chars().last().map_or(false, char::is_uppercase);

    if is_initial || ABBREVIATIONS.contains(&last_word.as_str()) {
        return true;
    }

    TRAILING_ABBREVIATIONS.contains(&last_word.as_str())
        && next_word.map_or(false, |c| c.is_ascii_digit() || c.is_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FactExtractor {
        FactExtractor::new(ExtractorConfig::default()).unwrap()
    }

    #[test]
    fn test_extract_photosynthesis() {
        let source = Source::new(
            "https://en.wikipedia.org/wiki/Photosynthesis",
            "Photosynthesis",
            "Photosynthesis is a process used by plants.",
            "wikipedia",
        );

        let facts: Vec<CandidateFact> = extractor().extract(&source).collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].subject, "photosynthesis");
        assert_eq!(facts[0].predicate, "is");
        assert_eq!(facts[0].object, "a process used by plants");
        assert!((facts[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_pronoun_resolved_from_title() {
        let source = Source::new(
            "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "Rust (programming language)",
            "Rust is a systems programming language. It was designed by Graydon Hoare.",
            "wikipedia",
        );

        let facts: Vec<CandidateFact> = extractor().extract(&source).collect();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[1].subject, "rust");
        assert_eq!(facts[1].predicate, "designed_by");
        assert!((facts[1].confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_pronoun_without_hint_is_dropped() {
        let facts: Vec<CandidateFact> =
            extractor().extract_text("It is a very common mistake to make.").collect();
        assert!(facts.is_empty());
    }

    #[test]
    fn test_cleaning_removes_noise() {
        assert_eq!(
            clean_text("Photosynthesis (FOH-tə-SINTH) is  a process[1] used\nby plants."),
            "Photosynthesis is a process used by plants."
        );
    }

    #[test]
    fn test_sentence_splitting() {
        let sentences = split_sentences(
            "Dr. Smith lives in the U.S. today. J. R. R. Tolkien was a writer! Was he? Yes",
        );
        assert_eq!(
            sentences,
            vec![
                "Dr. Smith lives in the U.S. today",
                "J. R. R. Tolkien was a writer",
                "Was he",
                "Yes",
            ]
        );
    }

    #[test]
    fn test_sentence_final_abbreviation_words() {
        let sentences = split_sentences(
            "The answer is no. Water is a liquid. Apple Inc. is a company. It ranked No. 5 overall.",
        );
        assert_eq!(
            sentences,
            vec![
                "The answer is no",
                "Water is a liquid",
                "Apple Inc. is a company",
                "It ranked No. 5 overall",
            ]
        );

        let facts: Vec<CandidateFact> = extractor()
            .extract_text("The answer is no. Water is a liquid at room temperature.")
            .collect();
        assert!(facts.iter().all(|f| !f.object.contains("Water")));
        assert!(facts
            .iter()
            .any(|f| f.subject == "water" && f.object == "a liquid at room temperature"));
    }

    #[test]
    fn test_normalize_subject() {
        assert_eq!(normalize_subject("The Eiffel Tower"), "eiffel tower");
        assert_eq!(normalize_subject("  \"Photosynthesis\" "), "photosynthesis");
        assert_eq!(normalize_subject("Another thing"), "another thing");
    }

    #[test]
    fn test_long_subject_rejected() {
        let facts: Vec<CandidateFact> = extractor()
            .extract_text("The very long and winding list of many different things here is boring.")
            .collect();
        assert!(facts.is_empty());
    }

    #[test]
    fn test_robust_on_arbitrary_input() {
        let extractor = extractor();
        let inputs: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"....!!!???".to_vec(),
            vec![0xff, 0xfe, 0x00, 0x80, 0x2e, 0x20],
            "🦀🦀🦀 is 🦀. ((((".as_bytes().to_vec(),
            "is is is is is is is".as_bytes().to_vec(),
            "[[[[]]]] (((( )))) was was".as_bytes().to_vec(),
            "a".repeat(10_000).into_bytes(),
            (0u8..=255).collect(),
        ];

        for input in inputs {
            let facts: Vec<CandidateFact> = extractor.extract_bytes(&input).collect();
            for fact in facts {
                assert!((0.0..=1.0).contains(&fact.confidence));
                assert!(!fact.subject.is_empty());
                assert!(!fact.object.is_empty());
            }
        }
    }

    #[test]
    fn test_max_facts_per_source() {
        let config = ExtractorConfig {
            max_facts_per_source: 2,
            ..ExtractorConfig::default()
        };
        let extractor = FactExtractor::new(config).unwrap();
        let text = "Cats are small mammals. Dogs are loyal animals. Birds are feathered animals.";
        assert_eq!(extractor.extract_text(text).count(), 2);
    }
}
