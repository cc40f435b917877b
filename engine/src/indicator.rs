//! Per-entity status badge derived from registry state.

use crate::change::{ChangeLevel, ChangeRecord, ChangeStatus};
use crate::conflict::Conflict;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndicatorState {
    Idle,
    Saved,
    Processing,
    Saving,
    Conflicted,
}

impl IndicatorState {
    pub fn label(self) -> &'static str {
        match self {
            IndicatorState::Idle => "Up to date",
            IndicatorState::Saved => "Saved",
            IndicatorState::Processing => "Processing",
            IndicatorState::Saving => "Saving",
            IndicatorState::Conflicted => "Conflict",
        }
    }
}

/// Badge for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub state: IndicatorState,
    /// In-flight changes for the entity
    pub pending: usize,
    pub conflicts: usize,
    pub label: String,
}

impl Indicator {
    /// Highest-precedence state wins: conflicted, saving, processing, saved, idle.
    pub fn derive(changes: &[&ChangeRecord], conflicts: &[Conflict]) -> Self {
        let mut state = if changes.is_empty() {
            IndicatorState::Idle
        } else {
            IndicatorState::Saved
        };

        for change in changes {
            let candidate = if change.status == ChangeStatus::Conflicted {
                IndicatorState::Conflicted
            } else {
                match change.level {
                    ChangeLevel::Optimistic => IndicatorState::Saving,
                    ChangeLevel::Processing => IndicatorState::Processing,
                    ChangeLevel::Committed => IndicatorState::Saved,
                }
            };
            state = state.max(candidate);
        }

        if !conflicts.is_empty() {
            state = IndicatorState::Conflicted;
        }

        Self {
            state,
            pending: changes.len(),
            conflicts: conflicts.len(),
            label: state.label().to_string(),
        }
    }
}
