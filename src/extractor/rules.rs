//! Declarative pattern-to-triple rules
//!
//! Each rule is a regex with named groups `subj` and `obj` (plus optional
//! `verb` and `prep`) and a predicate template. Rules are tried in order and
//! the first match wins, so more specific rules come first.

use crate::error::{LearningError, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Rule definition as it appears in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub pattern: String,
    /// Predicate template; `{verb}` and `{prep}` are replaced by the
    /// lower-cased captures of the same name
    pub predicate: String,
    pub confidence: f32,
}

/// Raw triple produced by a single rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f32,
    pub rule: String,
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    regex: Regex,
    predicate: String,
    confidence: f32,
}

impl PatternRule {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        predicate: impl Into<String>,
        confidence: f32,
    ) -> Result<Self> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|e| {
            LearningError::Config(format!("Invalid pattern for rule '{}': {}", name, e))
        })?;

        let groups: Vec<&str> = regex.capture_names().flatten().collect();
        for required in ["subj", "obj"] {
            if !groups.contains(&required) {
                return Err(LearningError::Config(format!(
                    "Rule '{}' is missing the named group '{}'",
                    name, required
                )));
            }
        }

        if !(0.0..=1.0).contains(&confidence) {
            return Err(LearningError::Config(format!(
                "Rule '{}' confidence {} is out of range [0.0, 1.0]",
                name, confidence
            )));
        }

        Ok(Self {
            name,
            regex,
            predicate: predicate.into(),
            confidence,
        })
    }

    pub fn from_spec(spec: &RuleSpec) -> Result<Self> {
        Self::new(spec.name.clone(), &spec.pattern, spec.predicate.clone(), spec.confidence)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Apply the rule to one sentence
    pub fn apply(&self, sentence: &str) -> Option<RuleMatch> {
        let caps = self.regex.captures(sentence)?;
        let subject = caps.name("subj")?.as_str().trim();
        let object = caps.name("obj")?.as_str().trim();

        if subject.is_empty() || object.is_empty() {
            return None;
        }

        let predicate = self.render_predicate(&caps);
        if predicate.is_empty() {
            return None;
        }

        Some(RuleMatch {
            subject: subject.to_string(),
            predicate,
            object: object.to_string(),
            confidence: self.confidence,
            rule: self.name.clone(),
        })
    }

    fn render_predicate(&self, caps: &Captures<'_>) -> String {
        let capture = |group: &str| {
            caps.name(group)
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_default()
        };

        self.predicate
            .replace("{verb}", &capture("verb"))
            .replace("{prep}", &capture("prep"))
            .trim_matches('_')
            .to_string()
    }
}

/// Ordered collection of rules
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    /// Built-in rules, most specific first
    pub fn builtin() -> Result<Self> {
        let rules = vec![
            PatternRule::new(
                "passive_agent",
                r"(?i)^(?P<subj>.+?)\s+(?:was|were|is|are)\s+(?:(?:first|originally|jointly|independently|co-)\s*)?(?P<verb>invented|discovered|created|founded|established|developed|written|designed|built|composed|painted|directed)\s+by\s+(?P<obj>.+)$",
                "{verb}_by",
                0.85,
            )?,
            PatternRule::new(
                "birth_death",
                r"(?i)^(?P<subj>.+?)\s+(?:was\s+)?(?P<verb>born|died)\s+(?P<prep>in|on|at)\s+(?P<obj>.+)$",
                "{verb}_{prep}",
                0.8,
            )?,
            PatternRule::new(
                "location",
                r"(?i)^(?P<subj>.+?)\s+(?:is|are|was|were)\s+(?:located|situated|found)\s+(?P<prep>in|on|at|near)\s+(?P<obj>.+)$",
                "located_{prep}",
                0.8,
            )?,
            PatternRule::new(
                "copula",
                r"(?i)^(?P<subj>.+?)\s+(?P<verb>is|are|was|were)\s+(?P<obj>.+)$",
                "{verb}",
                0.8,
            )?,
            PatternRule::new(
                "perfect",
                r"(?i)^(?P<subj>.+?)\s+(?:has|have)\s+been\s+(?P<obj>.+)$",
                "has_been",
                0.65,
            )?,
            PatternRule::new(
                "dated_event",
                r"(?i)^(?P<subj>.+?)\s+(?P<verb>[a-z]+ed)\b.*?\b(?:in|during|since)\s+(?P<obj>1[5-9]\d{2}|20\d{2})\b",
                "{verb}_in",
                0.5,
            )?,
        ];

        Ok(Self::new(rules))
    }

    /// Custom rules are tried before the built-in ones
    pub fn with_custom(specs: &[RuleSpec]) -> Result<Self> {
        let mut rules = specs
            .iter()
            .map(PatternRule::from_spec)
            .collect::<Result<Vec<_>>>()?;
        rules.extend(Self::builtin()?.rules);
        Ok(Self::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// First rule that matches the sentence
    pub fn first_match(&self, sentence: &str) -> Option<RuleMatch> {
        self.rules.iter().find_map(|rule| rule.apply(sentence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::builtin().unwrap()
    }

    fn matched(sentence: &str) -> RuleMatch {
        rules().first_match(sentence).unwrap()
    }

    #[test]
    fn test_copula_rule() {
        let m = matched("Photosynthesis is a process used by plants");
        assert_eq!(m.rule, "copula");
        assert_eq!(m.subject, "Photosynthesis");
        assert_eq!(m.predicate, "is");
        assert_eq!(m.object, "a process used by plants");
        assert!((m.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_passive_agent_rule() {
        let m = matched("The telephone was invented by Alexander Graham Bell");
        assert_eq!(m.rule, "passive_agent");
        assert_eq!(m.predicate, "invented_by");
        assert_eq!(m.object, "Alexander Graham Bell");
        assert!(m.confidence > rules().rules[3].confidence());
    }

    #[test]
    fn test_birth_death_rule() {
        let m = matched("Albert Einstein was born in Ulm");
        assert_eq!(m.rule, "birth_death");
        assert_eq!(m.predicate, "born_in");
        assert_eq!(m.object, "Ulm");

        let m = matched("Marie Curie died on 4 July 1934");
        assert_eq!(m.predicate, "died_on");
    }

    #[test]
    fn test_location_rule() {
        let m = matched("The Eiffel Tower is located in Paris");
        assert_eq!(m.rule, "location");
        assert_eq!(m.predicate, "located_in");
        assert_eq!(m.object, "Paris");
    }

    #[test]
    fn test_perfect_rule() {
        let m = matched("Rust has been the most loved language for years");
        assert_eq!(m.rule, "perfect");
        assert_eq!(m.predicate, "has_been");
    }

    #[test]
    fn test_dated_event_rule() {
        let m = matched("Linux kernel development started in 1991 at Helsinki");
        assert_eq!(m.rule, "dated_event");
        assert_eq!(m.subject, "Linux kernel development");
        assert_eq!(m.predicate, "started_in");
        assert_eq!(m.object, "1991");
    }

    #[test]
    fn test_no_rule_matches() {
        assert!(rules().first_match("Hello there").is_none());
        assert!(rules().first_match("").is_none());
    }

    #[test]
    fn test_custom_rule_precedes_builtin() {
        let spec = RuleSpec {
            name: "capital".to_string(),
            pattern: r"(?i)^(?P<subj>.+?)\s+is the capital of\s+(?P<obj>.+)$".to_string(),
            predicate: "capital_of".to_string(),
            confidence: 0.9,
        };
        let rules = RuleSet::with_custom(&[spec]).unwrap();

        let m = rules.first_match("Paris is the capital of France").unwrap();
        assert_eq!(m.rule, "capital");
        assert_eq!(m.predicate, "capital_of");
        assert_eq!(rules.names()[0], "capital");
    }

    #[test]
    fn test_rule_validation() {
        assert!(PatternRule::new("bad", r"(", "p", 0.5).is_err());
        assert!(PatternRule::new("no_groups", r"^(.+) is (.+)$", "p", 0.5).is_err());
        assert!(PatternRule::new("range", r"^(?P<subj>.+) is (?P<obj>.+)$", "p", 1.5).is_err());
    }
}
