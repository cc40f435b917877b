//! Conflicts, entity keys and resolutions.

use crate::{ConflictId, EntityId, EntityType, Error, Result, Snapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The `(entityType, entityId)` pair that scopes changes, conflicts and
/// cache invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<EntityType>, entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Push-channel topic for scoped updates of this entity.
    pub fn topic(&self) -> String {
        format!("entity:{}:{}", self.entity_type, self.entity_id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Kind of server-detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    ConcurrentEdit,
    ValidationFailure,
    DependencyMissing,
    PermissionDenied,
    BusinessRule,
    StaleData,
}

/// Optional conflict payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_changes: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<u64>,
    #[serde(flatten)]
    pub extra: Snapshot,
}

/// A single open conflict on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: ConflictId,
    #[serde(rename = "type")]
    pub kind: ConflictType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ConflictData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_set: Option<serde_json::Value>,
}

impl Conflict {
    pub fn new(id: impl Into<ConflictId>, kind: ConflictType) -> Self {
        Self {
            id: id.into(),
            kind,
            data: None,
            change_set: None,
        }
    }
}

/// Strategy applied to resolve the conflicts of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionType {
    AcceptCurrent,
    AcceptIncoming,
    Merge,
    Retry,
}

impl fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionType::AcceptCurrent => "ACCEPT_CURRENT",
            ResolutionType::AcceptIncoming => "ACCEPT_INCOMING",
            ResolutionType::Merge => "MERGE",
            ResolutionType::Retry => "RETRY",
        };
        f.write_str(name)
    }
}

/// A resolution request payload.
///
/// Invariant: `merged_changes` is present exactly when `kind` is `Merge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    #[serde(rename = "type")]
    kind: ResolutionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merged_changes: Option<Snapshot>,
}

impl Resolution {
    /// A resolution that carries no merged changes.
    pub fn simple(kind: ResolutionType) -> Result<Self> {
        if kind == ResolutionType::Merge {
            return Err(Error::MergedChangesMismatch);
        }
        Ok(Self {
            kind,
            merged_changes: None,
        })
    }

    /// A merge resolution with explicit merged fields.
    pub fn merge(merged_changes: Snapshot) -> Self {
        Self {
            kind: ResolutionType::Merge,
            merged_changes: Some(merged_changes),
        }
    }

    /// Parse user-supplied JSON text into a merge resolution.
    ///
    /// The text must decode to a JSON object.
    pub fn merge_from_text(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidMergeInput(e.to_string()))?;
        match value {
            serde_json::Value::Object(map) => Ok(Self::merge(map)),
            other => Err(Error::InvalidMergeInput(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn kind(&self) -> ResolutionType {
        self.kind
    }

    pub fn merged_changes(&self) -> Option<&Snapshot> {
        self.merged_changes.as_ref()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
