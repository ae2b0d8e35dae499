//! Incoming chat queries and topic normalization

use crate::knowledge::normalize_topic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const INTERROGATIVES: &[&str] = &["what", "how", "why", "when", "where", "who", "which"];
const REQUEST_MARKERS: &[&str] = &["tell me about", "explain"];

/// Lead-ins stripped from the front of a query, longest first
const LEAD_INS: &[&str] = &[
    "can you tell me about",
    "tell me about",
    "what do you know about",
    "what is the",
    "what are the",
    "what is",
    "what are",
    "what was",
    "what were",
    "who is",
    "who was",
    "who were",
    "where is",
    "where was",
    "when was",
    "when did",
    "how does",
    "how do",
    "how is",
    "why is",
    "why does",
    "why do",
    "which is",
    "explain",
    "define",
    "describe",
    "what's",
    "who's",
    "what",
    "who",
    "where",
    "when",
    "how",
    "why",
    "which",
];

const ARTICLES: &[&str] = &["the", "a", "an"];

/// One chat turn handed to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub normalized_topic: String,
    pub user_language: String,
    pub timestamp: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>, user_language: impl Into<String>) -> Self {
        let text = text.into();
        let normalized_topic = topic_of(&text);

        Self {
            text,
            normalized_topic,
            user_language: user_language.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized_topic.is_empty()
    }

    /// Whether the text asks for information rather than stating something
    pub fn is_interrogative(&self) -> bool {
        let lower = self.text.to_lowercase();
        if lower.trim_end().ends_with('?') {
            return true;
        }
        if REQUEST_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return true;
        }
        words(&lower).iter().any(|w| INTERROGATIVES.contains(&w.as_str()))
    }
}

/// Derive the topic key from free text
///
/// `"What is photosynthesis?"` becomes `"photosynthesis"`.
pub fn topic_of(text: &str) -> String {
    let words = words(&text.to_lowercase());
    let mut rest: &[String] = &words;

    if let Some(lead_in) = LEAD_INS.iter().find(|lead_in| starts_with_words(rest, lead_in)) {
        rest = &rest[lead_in.split_whitespace().count()..];
    }

    while let Some(first) = rest.first() {
        if ARTICLES.contains(&first.as_str()) {
            rest = &rest[1..];
        } else {
            break;
        }
    }

    normalize_topic(&rest.join(" "))
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn starts_with_words(words: &[String], phrase: &str) -> bool {
    let phrase: Vec<&str> = phrase.split_whitespace().collect();
    words.len() >= phrase.len() && words.iter().zip(&phrase).all(|(w, p)| w == p)
}
