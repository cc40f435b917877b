//! Push-channel message types.
//!
//! Messages arrive on the [`CHANGES_TOPIC`] topic as `{ "type": ..., "data": {...} }`.
//! Every payload carries at least `entityType` and `entityId`.

use crate::change::{ChangePatch, ChangeRecord};
use crate::conflict::Conflict;
use crate::{ChangeId, EntityKey, Error, Result, Snapshot};
use serde::{Deserialize, Serialize};

/// Topic the change tracker subscribes to.
pub const CHANGES_TOPIC: &str = "changes";

/// Payload of `CHANGE_UPDATED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUpdate {
    pub id: ChangeId,
    #[serde(flatten)]
    pub entity: EntityKey,
    #[serde(flatten)]
    pub patch: ChangePatch,
}

/// Payload of `CHANGE_COMMITTED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCommit {
    pub id: ChangeId,
    #[serde(flatten)]
    pub entity: EntityKey,
}

/// Payload of `CHANGE_REJECTED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRejection {
    pub id: ChangeId,
    #[serde(flatten)]
    pub entity: EntityKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Payload of `CONFLICT_DETECTED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictNotice {
    #[serde(flatten)]
    pub entity: EntityKey,
    pub conflict: Conflict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_values: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_values: Option<Snapshot>,
}

/// A message delivered on the changes topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushMessage {
    ChangeCreated(ChangeRecord),
    ChangeUpdated(ChangeUpdate),
    ChangeCommitted(ChangeCommit),
    ChangeRejected(ChangeRejection),
    ConflictDetected(ConflictNotice),
    EntityUpdated(EntityKey),
}

impl PushMessage {
    /// Decode a message from a JSON value.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidMessage(e.to_string()))
    }

    /// Decode a message from JSON text.
    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidMessage(e.to_string()))
    }

    /// The wire name of this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            PushMessage::ChangeCreated(_) => "CHANGE_CREATED",
            PushMessage::ChangeUpdated(_) => "CHANGE_UPDATED",
            PushMessage::ChangeCommitted(_) => "CHANGE_COMMITTED",
            PushMessage::ChangeRejected(_) => "CHANGE_REJECTED",
            PushMessage::ConflictDetected(_) => "CONFLICT_DETECTED",
            PushMessage::EntityUpdated(_) => "ENTITY_UPDATED",
        }
    }

    /// The entity this message concerns.
    pub fn entity(&self) -> EntityKey {
        match self {
            PushMessage::ChangeCreated(record) => record.entity_key(),
            PushMessage::ChangeUpdated(update) => update.entity.clone(),
            PushMessage::ChangeCommitted(commit) => commit.entity.clone(),
            PushMessage::ChangeRejected(rejection) => rejection.entity.clone(),
            PushMessage::ConflictDetected(notice) => notice.entity.clone(),
            PushMessage::EntityUpdated(key) => key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeLevel, ChangeStatus, ConflictType};
    use serde_json::json;

    #[test]
    fn decode_change_created() {
        let msg = PushMessage::from_json(json!({
            "type": "CHANGE_CREATED",
            "data": {"id": "c1", "entityType": "tag", "entityId": "t1", "level": "OPTIMISTIC"}
        }))
        .unwrap();

        match msg {
            PushMessage::ChangeCreated(record) => {
                assert_eq!(record.id, "c1");
                assert_eq!(record.level, ChangeLevel::Optimistic);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_change_updated_patch() {
        let msg = PushMessage::from_text(
            r#"{"type":"CHANGE_UPDATED","data":{"id":"c1","entityType":"tag","entityId":"t1","level":"PROCESSING","status":"APPROVED"}}"#,
        )
        .unwrap();

        match msg {
            PushMessage::ChangeUpdated(update) => {
                assert_eq!(update.entity, EntityKey::new("tag", "t1"));
                assert_eq!(update.patch.level, Some(ChangeLevel::Processing));
                assert_eq!(update.patch.status, Some(ChangeStatus::Approved));
                assert!(update.patch.version.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_rejection_and_conflict() {
        let msg = PushMessage::from_json(json!({
            "type": "CHANGE_REJECTED",
            "data": {"id": "c1", "entityType": "tag", "entityId": "t1", "rejectionReason": "duplicate name"}
        }))
        .unwrap();
        assert_eq!(msg.type_name(), "CHANGE_REJECTED");
        assert!(matches!(
            msg,
            PushMessage::ChangeRejected(ChangeRejection { rejection_reason: Some(ref r), .. }) if r == "duplicate name"
        ));

        let msg = PushMessage::from_json(json!({
            "type": "CONFLICT_DETECTED",
            "data": {
                "entityType": "tag",
                "entityId": "t1",
                "conflict": {"id": "k1", "type": "CONCURRENT_EDIT"},
                "currentValues": {"name": "a"},
                "incomingValues": {"name": "b"}
            }
        }))
        .unwrap();
        match msg {
            PushMessage::ConflictDetected(notice) => {
                assert_eq!(notice.conflict.kind, ConflictType::ConcurrentEdit);
                assert_eq!(notice.current_values.unwrap().get("name"), Some(&json!("a")));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn entity_updated_ignores_extra_keys() {
        let msg = PushMessage::from_json(json!({
            "type": "ENTITY_UPDATED",
            "data": {"entityType": "tenant", "entityId": "acme", "updatedBy": "u9"}
        }))
        .unwrap();
        assert_eq!(msg.entity(), EntityKey::new("tenant", "acme"));
    }

    #[test]
    fn unknown_type_is_invalid() {
        let err = PushMessage::from_json(json!({
            "type": "CHANGE_EXPLODED",
            "data": {"entityType": "tag", "entityId": "t1"}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }

    #[test]
    fn missing_entity_is_invalid() {
        let result = PushMessage::from_text(r#"{"type":"ENTITY_UPDATED","data":{"entityType":"tag"}}"#);
        assert!(result.is_err());
    }
}
