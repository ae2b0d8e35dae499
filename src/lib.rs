//! Internet learning core
//!
//! Turns user questions into durable knowledge: sources are fetched from web
//! search backends, scored for reliability, mined for subject-predicate-object
//! facts and merged into a topic-keyed knowledge store that keeps only the
//! most trusted fact per (subject, predicate).

pub mod api;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod knowledge;
pub mod learning;
pub mod logging;
pub mod metrics;
pub mod reliability;
pub mod translate;

pub use config::Config;
pub use error::{LearningError, Result};
pub use extractor::{CandidateFact, FactExtractor};
pub use fetcher::{Source, SourceFetcher};
pub use knowledge::{Fact, KnowledgeStore, MergeReport, Topic};
pub use learning::{
    FailureReason, LearningAnswer, LearningCoordinator, LearningFailure, LearningStats, Query,
};
pub use reliability::{ReliabilityScore, ReliabilityScorer};
pub use translate::Translator;
