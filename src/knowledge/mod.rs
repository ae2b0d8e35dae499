//! Persistent knowledge store
//!
//! Facts are grouped by topic and keyed by (subject, predicate) within a
//! topic. When two facts compete for the same slot the one with the higher
//! `confidence × source_score` is kept.

pub mod models;
pub mod persistence;
pub mod store;

pub use models::{Fact, MergeReport, PruneReport, RecentUpdate, StoreConfig, Topic};
pub use persistence::{JsonFileBackend, MemoryBackend, Snapshot, SnapshotBackend};
pub use store::{normalize_topic, KnowledgeStore};
