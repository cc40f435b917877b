//! Channel message protocol definitions.
//!
//! Upstream frames are camelCase JSON; UI events use a snake_case `type`
//! tag with camelCase fields.

use changeline_engine::{
    Conflict, ConflictId, EntityKey, Notification, QueryKey, ResolverRequest, CHANGES_TOPIC,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hub topic carrying [`UiEvent`]s to UI clients.
pub const UI_TOPIC: &str = "ui";

fn default_topic() -> String {
    CHANGES_TOPIC.to_string()
}

/// One frame received from the upstream push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    /// Hub topic; frames without one go to `changes`
    #[serde(default = "default_topic")]
    pub topic: String,
    pub payload: Value,
}

/// Messages sent from UI clients to the server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    /// Keep-alive ping.
    Ping,
}

/// Messages pushed from the server to UI clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Show a toast.
    Notification { notification: Notification },

    /// Refetch data cached under a query key.
    #[serde(rename_all = "camelCase")]
    Invalidate { query_key: QueryKey },

    /// Open the conflict resolver for an entity.
    OpenResolver { request: ResolverRequest },

    /// Conflicts were resolved upstream; `remaining` is what is still open.
    ConflictsResolved {
        entity: EntityKey,
        resolved: Vec<ConflictId>,
        remaining: Vec<Conflict>,
    },

    /// Response to ping.
    Pong,

    /// Error message.
    Error { message: String },
}

impl UiEvent {
    pub fn error(message: impl Into<String>) -> Self {
        UiEvent::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_topic_defaults_to_changes() {
        let frame: ChannelFrame =
            serde_json::from_value(json!({"payload": {"type": "ENTITY_UPDATED"}})).unwrap();
        assert_eq!(frame.topic, "changes");

        let frame: ChannelFrame =
            serde_json::from_value(json!({"topic": "entity:tag:t1", "payload": {}})).unwrap();
        assert_eq!(frame.topic, "entity:tag:t1");
    }

    #[test]
    fn test_ui_command_deserialization() {
        let msg: UiCommand = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, UiCommand::Ping));
    }

    #[test]
    fn test_ui_event_serialization() {
        let json = serde_json::to_value(UiEvent::Pong).unwrap();
        assert_eq!(json, json!({"type": "pong"}));

        let event = UiEvent::Invalidate {
            query_key: QueryKey::History(EntityKey::new("tag", "t1")),
        };
        assert_eq!(
            serde_json::to_value(event).unwrap(),
            json!({"type": "invalidate", "queryKey": ["changes", "tag", "t1"]})
        );

        let json = serde_json::to_value(UiEvent::error("boom")).unwrap();
        assert_eq!(json, json!({"type": "error", "message": "boom"}));
    }
}
