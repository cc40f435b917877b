//! Change provider.
//!
//! Owns the [`ChangeTracker`] for the process. A single task consumes the
//! `changes` topic so messages are handled strictly in arrival order; route
//! handlers read and mutate the registries through short critical sections
//! that never span an `.await`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use changeline_engine::{
    ChangeRecord, ChangeTracker, Conflict, ConflictId, Effect, EntityKey, Indicator, PushMessage,
    QueryKey, ResolverRequest, Snapshot, TrackerOptions, CHANGES_TOPIC,
};
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::cache::QueryCache;
use crate::channel::{Hub, UiEvent, UI_TOPIC};

/// Performs tracker effects against the hub and the query cache.
#[derive(Debug, Clone)]
struct EffectSink {
    hub: Arc<Hub>,
    cache: Arc<QueryCache>,
}

impl EffectSink {
    fn emit(&self, event: &UiEvent) -> usize {
        match serde_json::to_value(event) {
            Ok(payload) => self.hub.publish(UI_TOPIC, payload),
            Err(e) => {
                tracing::error!("Failed to serialize UI event: {}", e);
                0
            }
        }
    }

    fn invalidate(&self, query_key: QueryKey) {
        self.cache.invalidate(&query_key);
        self.emit(&UiEvent::Invalidate { query_key });
    }
}

/// Values shown next to an entity's conflicts in the resolver.
type ResolverValues = (Option<Snapshot>, Option<Snapshot>);

pub struct ChangeProvider {
    tracker: Mutex<ChangeTracker>,
    sink: EffectSink,
    resolver_values: DashMap<EntityKey, ResolverValues>,
    resolving: DashSet<EntityKey>,
    held: DashMap<EntityKey, EntitySubscription>,
}

impl ChangeProvider {
    pub fn new(options: TrackerOptions, hub: Arc<Hub>, cache: Arc<QueryCache>) -> Self {
        Self {
            tracker: Mutex::new(ChangeTracker::new(options)),
            sink: EffectSink { hub, cache },
            resolver_values: DashMap::new(),
            resolving: DashSet::new(),
            held: DashMap::new(),
        }
    }

    pub fn new_shared(options: TrackerOptions, hub: Arc<Hub>, cache: Arc<QueryCache>) -> Arc<Self> {
        Arc::new(Self::new(options, hub, cache))
    }

    /// Subscribe to the `changes` topic and spawn the consumer task.
    ///
    /// The subscription is registered before this returns, so nothing
    /// published afterwards is missed.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut subscription = self.sink.hub.subscribe(CHANGES_TOPIC);
        let provider = Arc::clone(self);

        tokio::spawn(async move {
            tracing::info!("Change consumer started");
            while let Some(payload) = subscription.recv().await {
                provider.process(payload);
            }
            tracing::info!("Change consumer stopped");
        })
    }

    /// Handle one `changes` payload to completion.
    pub fn process(&self, payload: Value) {
        let message = match PushMessage::from_json(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed push message");
                return;
            }
        };

        let message_type = message.type_name();
        let entity = message.entity();
        let effects = self.tracker().handle(message);

        tracing::debug!(
            message_type,
            entity = %entity,
            effects = effects.len(),
            "Handled push message"
        );

        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::Notify(notification) => {
                tracing::info!(
                    kind = ?notification.kind,
                    title = %notification.title,
                    "Notification"
                );
                self.sink.emit(&UiEvent::Notification { notification });
            }
            Effect::Invalidate(query_key) => self.sink.invalidate(query_key),
            Effect::OpenResolver(mut request) => {
                // Notices without snapshots keep the ones already known
                let (current, incoming) = {
                    let mut stored = self
                        .resolver_values
                        .entry(request.entity.clone())
                        .or_default();
                    if request.current_values.is_some() {
                        stored.0 = request.current_values.take();
                    }
                    if request.incoming_values.is_some() {
                        stored.1 = request.incoming_values.take();
                    }
                    (*stored).clone()
                };
                request.current_values = current;
                request.incoming_values = incoming;

                tracing::info!(
                    entity = %request.entity,
                    conflicts = request.conflicts.len(),
                    "Opening conflict resolver"
                );
                self.sink.emit(&UiEvent::OpenResolver { request });
            }
        }
    }

    fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entity_changes(&self, key: &EntityKey) -> Vec<ChangeRecord> {
        self.tracker()
            .entity_changes(key)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn entity_conflicts(&self, key: &EntityKey) -> Vec<Conflict> {
        self.tracker().entity_conflicts(key).to_vec()
    }

    pub fn indicator(&self, key: &EntityKey) -> Indicator {
        self.tracker().indicator(key)
    }

    pub fn pending_count(&self) -> usize {
        self.tracker().pending_count()
    }

    pub fn conflicted_count(&self) -> usize {
        self.tracker().conflicted_entities().len()
    }

    /// Resolver input built from the current conflict list.
    pub fn resolver_request(&self, key: &EntityKey) -> ResolverRequest {
        let conflicts = self.entity_conflicts(key);
        let (current_values, incoming_values) = self
            .resolver_values
            .get(key)
            .map(|values| values.clone())
            .unwrap_or_default();

        ResolverRequest {
            entity: key.clone(),
            conflicts,
            current_values,
            incoming_values,
        }
    }

    /// Dismiss every open conflict of an entity.
    pub fn clear_conflicts(&self, key: &EntityKey) -> usize {
        let cleared = self.tracker().clear_conflicts(key);
        self.resolver_values.remove(key);
        tracing::info!(entity = %key, cleared, "Cleared conflicts");
        cleared
    }

    /// Drop resolved conflicts and announce what is still open.
    pub fn conflicts_resolved(&self, key: &EntityKey, resolved: Vec<ConflictId>) -> Vec<Conflict> {
        let ids: HashSet<ConflictId> = resolved.iter().cloned().collect();
        let remaining = {
            let mut tracker = self.tracker();
            tracker.remove_conflicts(key, &ids);
            tracker.entity_conflicts(key).to_vec()
        };
        if remaining.is_empty() {
            self.resolver_values.remove(key);
        }

        self.sink.emit(&UiEvent::ConflictsResolved {
            entity: key.clone(),
            resolved,
            remaining: remaining.clone(),
        });
        remaining
    }

    /// Mark a resolution submission as in flight for `key`.
    ///
    /// Returns `None` while another submission for the same entity is
    /// pending. The mark is released when the guard drops.
    pub fn begin_resolving(&self, key: &EntityKey) -> Option<ResolvingGuard<'_>> {
        self.resolving.insert(key.clone()).then(|| ResolvingGuard {
            resolving: &self.resolving,
            key: key.clone(),
        })
    }

    pub fn is_resolving(&self, key: &EntityKey) -> bool {
        self.resolving.contains(key)
    }

    /// Listen on the entity's scoped topic and invalidate its query on
    /// every message.
    pub fn subscribe_to_entity(&self, key: EntityKey) -> EntitySubscription {
        let mut subscription = self.sink.hub.subscribe(key.topic());
        let topic = subscription.topic().to_string();
        let sub_id = subscription.id().to_string();
        let sink = self.sink.clone();
        let query_key = QueryKey::Entity(key.clone());

        let task = tokio::spawn(async move {
            while subscription.recv().await.is_some() {
                sink.invalidate(query_key.clone());
            }
        });

        EntitySubscription {
            key,
            topic,
            sub_id,
            hub: Arc::downgrade(&self.sink.hub),
            task,
        }
    }

    /// Keep an entity subscription alive on behalf of a client.
    ///
    /// Returns `false` if one was already held.
    pub fn hold_entity(&self, key: EntityKey) -> bool {
        if self.held.contains_key(&key) {
            return false;
        }
        let subscription = self.subscribe_to_entity(key.clone());
        self.held.insert(key, subscription).is_none()
    }

    pub fn release_entity(&self, key: &EntityKey) -> bool {
        match self.held.remove(key) {
            Some((_, subscription)) => {
                tracing::debug!(entity = %subscription.key(), "Released entity subscription");
                subscription.unsubscribe();
                true
            }
            None => false,
        }
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

/// Clears the in-flight mark of a resolution submission on drop.
#[derive(Debug)]
pub struct ResolvingGuard<'a> {
    resolving: &'a DashSet<EntityKey>,
    key: EntityKey,
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.resolving.remove(&self.key);
    }
}

/// Scoped invalidation for one entity. Stops on drop or
/// [`unsubscribe`](Self::unsubscribe).
#[derive(Debug)]
pub struct EntitySubscription {
    key: EntityKey,
    topic: String,
    sub_id: String,
    hub: Weak<Hub>,
    task: JoinHandle<()>,
}

impl EntitySubscription {
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Stop listening. Dropping the handle does the same.
    pub fn unsubscribe(self) {}
}

impl Drop for EntitySubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.topic, &self.sub_id);
        }
        self.task.abort();
    }
}
