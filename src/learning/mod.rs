//! Per-query learning pipeline

pub mod coordinator;
pub mod query;
pub mod state;

pub use coordinator::{
    CoordinatorConfig, FailureReason, LearningAnswer, LearningCoordinator, LearningFailure,
    LearningStats,
};
pub use query::{topic_of, Query};
pub use state::{LearningState, StateMachine};
