//! Change records and their lifecycle fields.
//!
//! A change moves through three durability levels (optimistic, processing,
//! committed) while its status classifies the outcome. The two are largely
//! orthogonal: a change may be `CONFLICTED` while still `PROCESSING`.

use crate::diff::{compute_diff, Diff};
use crate::{ChangeId, EntityId, EntityKey, EntityType, Snapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durability stage of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeLevel {
    /// Applied on the client, not yet confirmed by the server
    Optimistic,
    /// Accepted by the server and being processed
    Processing,
    /// Durably stored
    Committed,
}

/// Outcome classification of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Applied,
    RolledBack,
    Conflicted,
}

/// A user referenced by a change (author, approver or rejecter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Free-form change metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMetadata {
    /// The change this one reverses, if it is a rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_of: Option<ChangeId>,
    /// Any other keys the server attaches
    #[serde(flatten)]
    pub extra: Snapshot,
}

/// A single tracked change to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: ChangeId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub level: ChangeLevel,
    #[serde(default)]
    pub status: ChangeStatus,
    /// Mutated fields as submitted
    #[serde(default)]
    pub changes: Snapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejecter: Option<UserRef>,
    /// Entity version sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChangeMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Partial update carried by `CHANGE_UPDATED`.
///
/// Only present fields are applied; identity fields are never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ChangeLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ChangeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejecter: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChangeMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl ChangeRecord {
    /// Create a pending change at the given level.
    pub fn new(
        id: impl Into<ChangeId>,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        level: ChangeLevel,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            level,
            status: ChangeStatus::Pending,
            changes: Snapshot::new(),
            old_values: None,
            new_values: None,
            created_at: None,
            user: None,
            approver: None,
            rejecter: None,
            version: None,
            metadata: None,
            rejection_reason: None,
        }
    }

    /// Builder-style status setter.
    pub fn with_status(mut self, status: ChangeStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder-style snapshot setter.
    pub fn with_values(mut self, old_values: Snapshot, new_values: Snapshot) -> Self {
        self.old_values = Some(old_values);
        self.new_values = Some(new_values);
        self
    }

    /// The entity this change targets.
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.clone(), self.entity_id.clone())
    }

    /// Whether this change targets the given entity.
    pub fn targets(&self, key: &EntityKey) -> bool {
        self.entity_type == key.entity_type && self.entity_id == key.entity_id
    }

    /// Whether this change reverses another one.
    pub fn is_rollback(&self) -> bool {
        self.metadata
            .as_ref()
            .is_some_and(|m| m.rollback_of.is_some())
    }

    /// Field diff from `oldValues` to `newValues`; missing snapshots count as empty.
    pub fn diff(&self) -> Diff {
        let empty = Snapshot::new();
        compute_diff(
            self.old_values.as_ref().unwrap_or(&empty),
            self.new_values.as_ref().unwrap_or(&empty),
        )
    }

    /// Merge a partial update into this record.
    pub fn apply_patch(&mut self, patch: ChangePatch) {
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(changes) = patch.changes {
            self.changes = changes;
        }
        if patch.old_values.is_some() {
            self.old_values = patch.old_values;
        }
        if patch.new_values.is_some() {
            self.new_values = patch.new_values;
        }
        if patch.approver.is_some() {
            self.approver = patch.approver;
        }
        if patch.rejecter.is_some() {
            self.rejecter = patch.rejecter;
        }
        if patch.version.is_some() {
            self.version = patch.version;
        }
        if patch.metadata.is_some() {
            self.metadata = patch.metadata;
        }
        if patch.rejection_reason.is_some() {
            self.rejection_reason = patch.rejection_reason;
        }
    }
}
