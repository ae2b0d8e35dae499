//! Per-query learning state machine

use crate::error::{LearningError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningState {
    Idle,
    Fetching,
    Scoring,
    Extracting,
    Merging,
    Done,
    Failed,
}

impl LearningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningState::Idle => "idle",
            LearningState::Fetching => "fetching",
            LearningState::Scoring => "scoring",
            LearningState::Extracting => "extracting",
            LearningState::Merging => "merging",
            LearningState::Done => "done",
            LearningState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LearningState::Done | LearningState::Failed)
    }

    /// Legal transitions; any non-terminal state may fail
    pub fn can_transition_to(&self, next: LearningState) -> bool {
        use LearningState::*;

        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Idle, Fetching) | (Idle, Done) => true,
            (Fetching, Scoring) => true,
            (Scoring, Extracting) => true,
            (Extracting, Merging) => true,
            (Merging, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LearningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state and every state visited
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: LearningState,
    trace: Vec<LearningState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: LearningState::Idle,
            trace: vec![LearningState::Idle],
        }
    }

    pub fn current(&self) -> LearningState {
        self.current
    }

    pub fn trace(&self) -> &[LearningState] {
        &self.trace
    }

    pub fn advance(&mut self, next: LearningState) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(LearningError::IllegalTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }
        self.current = next;
        self.trace.push(next);
        Ok(())
    }

    /// Move to `Failed` from any non-terminal state
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.current = LearningState::Failed;
            self.trace.push(LearningState::Failed);
        }
    }

    pub fn into_trace(self) -> Vec<LearningState> {
        self.trace
    }
}
