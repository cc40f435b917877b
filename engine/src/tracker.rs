//! Change tracker - the three-level change state machine.
//!
//! The tracker is the only mutator of the change and conflict registries.
//! Each incoming [`PushMessage`] is handled to completion and yields a list of
//! [`Effect`]s for the host to perform (toasts, cache invalidation, opening
//! the conflict resolver). The tracker itself performs no IO.
//!
//! Messages referencing unknown change ids are silent no-ops on the
//! registry, so duplicate delivery is harmless.

use crate::change::ChangeLevel;
use crate::conflict::Conflict;
use crate::indicator::Indicator;
use crate::message::{ChangeCommit, ChangeRejection, ChangeUpdate, ConflictNotice, PushMessage};
use crate::registry::{ChangeRegistry, ConflictRegistry};
use crate::{ChangeRecord, ConflictId, EntityKey, Snapshot};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default auto-dismiss delay of the "saving" toast.
pub const DEFAULT_SAVING_TOAST_MS: u64 = 2000;

/// Tracker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerOptions {
    pub saving_toast_ms: u64,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            saving_toast_ms: DEFAULT_SAVING_TOAST_MS,
        }
    }
}

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Auto-dismiss delay; `None` uses the host default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Cache key a host must invalidate.
///
/// Serialises as `[entityType, entityId]` or `["changes", entityType, entityId]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Entity(EntityKey),
    History(EntityKey),
}

impl QueryKey {
    pub fn entity(&self) -> &EntityKey {
        match self {
            QueryKey::Entity(key) | QueryKey::History(key) => key,
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        match self {
            QueryKey::Entity(key) => vec![key.entity_type.as_str(), key.entity_id.as_str()],
            QueryKey::History(key) => {
                vec!["changes", key.entity_type.as_str(), key.entity_id.as_str()]
            }
        }
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let segments = self.segments();
        let mut seq = serializer.serialize_seq(Some(segments.len()))?;
        for segment in segments {
            seq.serialize_element(segment)?;
        }
        seq.end()
    }
}

/// Everything the conflict resolver needs to open for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverRequest {
    pub entity: EntityKey,
    /// All open conflicts for the entity, in arrival order
    pub conflicts: Vec<Conflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_values: Option<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming_values: Option<Snapshot>,
}

/// Side effect requested by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", content = "value", rename_all = "camelCase")]
pub enum Effect {
    Notify(Notification),
    Invalidate(QueryKey),
    OpenResolver(ResolverRequest),
}

/// The change state machine.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    options: TrackerOptions,
    changes: ChangeRegistry,
    conflicts: ConflictRegistry,
}

impl ChangeTracker {
    pub fn new(options: TrackerOptions) -> Self {
        Self {
            options,
            changes: ChangeRegistry::new(),
            conflicts: ConflictRegistry::new(),
        }
    }

    /// Apply one message and return the effects to perform, in order.
    pub fn handle(&mut self, message: PushMessage) -> Vec<Effect> {
        match message {
            PushMessage::ChangeCreated(record) => self.on_created(record),
            PushMessage::ChangeUpdated(update) => self.on_updated(update),
            PushMessage::ChangeCommitted(commit) => self.on_committed(commit),
            PushMessage::ChangeRejected(rejection) => self.on_rejected(rejection),
            PushMessage::ConflictDetected(notice) => self.on_conflict(notice),
            PushMessage::EntityUpdated(key) => self.on_entity_updated(key),
        }
    }

    fn on_created(&mut self, record: ChangeRecord) -> Vec<Effect> {
        let optimistic = record.level == ChangeLevel::Optimistic;
        self.changes.insert(record);

        if optimistic {
            vec![Effect::Notify(Notification {
                kind: NotificationKind::Info,
                title: "Saving changes...".to_string(),
                description: None,
                duration_ms: Some(self.options.saving_toast_ms),
            })]
        } else {
            Vec::new()
        }
    }

    fn on_updated(&mut self, update: ChangeUpdate) -> Vec<Effect> {
        self.changes.patch(&update.id, update.patch);
        vec![Effect::Invalidate(QueryKey::Entity(update.entity))]
    }

    fn on_committed(&mut self, commit: ChangeCommit) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(3);

        if self.changes.remove(&commit.id).is_some() {
            effects.push(Effect::Notify(Notification {
                kind: NotificationKind::Success,
                title: "Changes saved".to_string(),
                description: Some(format!("Your {} was updated.", commit.entity.entity_type)),
                duration_ms: None,
            }));
        }

        effects.push(Effect::Invalidate(QueryKey::Entity(commit.entity.clone())));
        effects.push(Effect::Invalidate(QueryKey::History(commit.entity)));
        effects
    }

    fn on_rejected(&mut self, rejection: ChangeRejection) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(2);

        if self.changes.remove(&rejection.id).is_some() {
            let description = rejection
                .rejection_reason
                .filter(|reason| !reason.trim().is_empty())
                .unwrap_or_else(|| "Your change could not be applied.".to_string());
            effects.push(Effect::Notify(Notification {
                kind: NotificationKind::Error,
                title: "Change rejected".to_string(),
                description: Some(description),
                duration_ms: None,
            }));
        }

        effects.push(Effect::Invalidate(QueryKey::Entity(rejection.entity)));
        effects
    }

    fn on_conflict(&mut self, notice: ConflictNotice) -> Vec<Effect> {
        let conflicts = self
            .conflicts
            .append(notice.entity.clone(), notice.conflict)
            .to_vec();

        vec![Effect::OpenResolver(ResolverRequest {
            entity: notice.entity,
            conflicts,
            current_values: notice.current_values,
            incoming_values: notice.incoming_values,
        })]
    }

    fn on_entity_updated(&mut self, key: EntityKey) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(2);

        if self.changes.has_entity(&key) {
            effects.push(Effect::Notify(Notification {
                kind: NotificationKind::Warning,
                title: "Updated by another user".to_string(),
                description: Some(format!(
                    "This {} was modified by someone else while you have pending changes.",
                    key.entity_type
                )),
                duration_ms: None,
            }));
        }

        effects.push(Effect::Invalidate(QueryKey::Entity(key)));
        effects
    }

    /// In-flight changes for an entity, in arrival order.
    pub fn entity_changes(&self, key: &EntityKey) -> Vec<&ChangeRecord> {
        self.changes.for_entity(key)
    }

    /// Open conflicts for an entity, in arrival order.
    pub fn entity_conflicts(&self, key: &EntityKey) -> &[Conflict] {
        self.conflicts.for_entity(key)
    }

    pub fn change(&self, id: &str) -> Option<&ChangeRecord> {
        self.changes.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.changes.len()
    }

    /// Entities that currently have open conflicts.
    pub fn conflicted_entities(&self) -> Vec<&EntityKey> {
        let mut keys: Vec<_> = self.conflicts.keys().collect();
        keys.sort();
        keys
    }

    pub fn indicator(&self, key: &EntityKey) -> Indicator {
        Indicator::derive(&self.changes.for_entity(key), self.conflicts.for_entity(key))
    }

    /// Drop every conflict for an entity after a successful resolution.
    pub fn clear_conflicts(&mut self, key: &EntityKey) -> usize {
        self.conflicts.clear(key)
    }

    /// Drop the conflicts that were resolved, keeping failed and newly
    /// arrived ones. Returns how many were removed.
    pub fn remove_conflicts(&mut self, key: &EntityKey, resolved: &HashSet<ConflictId>) -> usize {
        self.conflicts.remove(key, resolved)
    }
}
