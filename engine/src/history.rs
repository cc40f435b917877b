//! Change history view for one entity.
//!
//! Records are held newest-first exactly as the server returned them.
//! Rollback is offered on `APPLIED` items other than the newest one, and must
//! be confirmed before a request is issued. The view never mutates its list;
//! a refreshed history arrives through normal invalidation.

use crate::change::{ChangeRecord, ChangeStatus};
use crate::diff::Diff;
use crate::{ChangeId, EntityKey, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Parameters of a history fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(flatten)]
    pub entity: EntityKey,
    #[serde(default)]
    pub include_rollbacks: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

impl HistoryQuery {
    pub fn new(entity: EntityKey) -> Self {
        Self {
            entity,
            include_rollbacks: false,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_rollbacks(mut self, include: bool) -> Self {
        self.include_rollbacks = include;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// One rendered history row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem<'a> {
    pub change: &'a ChangeRecord,
    pub diff: Diff,
    pub can_rollback: bool,
    pub is_rollback: bool,
    pub expanded: bool,
}

/// A rollback awaiting explicit confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a rollback prompt does nothing until confirmed"]
pub struct RollbackPrompt {
    change_id: ChangeId,
    summary: String,
}

impl RollbackPrompt {
    pub fn change_id(&self) -> &str {
        &self.change_id
    }

    /// Text for the destructive-action dialog.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Confirm and obtain the id to submit for rollback.
    pub fn confirm(self) -> ChangeId {
        self.change_id
    }
}

#[derive(Debug, Clone)]
pub struct HistoryView {
    records: Vec<ChangeRecord>,
    rollback_enabled: bool,
    expanded: HashSet<ChangeId>,
}

impl HistoryView {
    pub fn new(records: Vec<ChangeRecord>, rollback_enabled: bool) -> Self {
        Self {
            records,
            rollback_enabled,
            expanded: HashSet::new(),
        }
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn position(&self, change_id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == change_id)
    }

    /// Rollback is offered on applied, non-newest items when enabled.
    pub fn can_rollback(&self, index: usize) -> bool {
        self.rollback_enabled
            && index > 0
            && self
                .records
                .get(index)
                .is_some_and(|r| r.status == ChangeStatus::Applied)
    }

    /// Toggle diff detail for a change. Returns the new expanded state.
    pub fn toggle(&mut self, change_id: &str) -> bool {
        if self.expanded.remove(change_id) {
            false
        } else {
            self.expanded.insert(change_id.to_string());
            true
        }
    }

    pub fn is_expanded(&self, change_id: &str) -> bool {
        self.expanded.contains(change_id)
    }

    /// Ask to roll back the item at `index`.
    pub fn request_rollback(&self, index: usize) -> Result<RollbackPrompt> {
        let record = self
            .records
            .get(index)
            .ok_or(Error::HistoryIndexOutOfRange(index))?;
        if !self.can_rollback(index) {
            return Err(Error::RollbackNotAllowed(record.id.clone()));
        }

        let version = record
            .version
            .map(|v| format!(" (version {v})"))
            .unwrap_or_default();
        Ok(RollbackPrompt {
            change_id: record.id.clone(),
            summary: format!(
                "Roll back change {}{} on {}:{}? This creates a new change reversing it.",
                record.id, version, record.entity_type, record.entity_id
            ),
        })
    }

    pub fn items(&self) -> Vec<HistoryItem<'_>> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, change)| HistoryItem {
                change,
                diff: change.diff(),
                can_rollback: self.can_rollback(index),
                is_rollback: change.is_rollback(),
                expanded: self.is_expanded(&change.id),
            })
            .collect()
    }
}
