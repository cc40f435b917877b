//! # Changeline Engine
//!
//! A deterministic state machine for three-level change tracking and
//! conflict resolution.
//!
//! Changes made by a client move through three durability levels while the
//! server processes them. The engine follows them from push-channel messages,
//! keeps the registries of in-flight changes and open conflicts, and tells its
//! host which side effects to perform.
//!
//! ## Design Principles
//!
//! - **No IO**: The engine never touches the network, a cache or a UI
//! - **Deterministic**: The same message sequence always yields the same
//!   registry state and the same effects
//! - **Forgiving**: Messages about unknown change ids are silent no-ops
//!
//! ## Core Concepts
//!
//! ### Levels and statuses
//!
//! A [`ChangeRecord`] has a [`ChangeLevel`] (`OPTIMISTIC` → `PROCESSING` →
//! `COMMITTED`) and an orthogonal [`ChangeStatus`] outcome.
//!
//! ### Tracker
//!
//! [`ChangeTracker::handle`] consumes one [`PushMessage`] and returns the
//! [`Effect`]s to perform:
//! - [`Effect::Notify`] - show a transient notification
//! - [`Effect::Invalidate`] - drop cached data under a [`QueryKey`]
//! - [`Effect::OpenResolver`] - open the conflict resolver for an entity
//!
//! ### Conflict resolution
//!
//! A [`ResolverSession`] applies one [`ResolutionType`] to every open conflict
//! of an entity and reports exactly which resolutions failed.
//!
//! ### Diffs and history
//!
//! [`compute_diff`] compares two flat snapshots with canonical structural
//! equality. [`HistoryView`] decides rollback eligibility and guards rollbacks
//! behind a confirmation step.
//!
//! ## Quick Start
//!
//! ```rust
//! use changeline_engine::{ChangeTracker, Effect, EntityKey, PushMessage, TrackerOptions};
//! use serde_json::json;
//!
//! let mut tracker = ChangeTracker::new(TrackerOptions::default());
//!
//! let created = PushMessage::from_json(json!({
//!     "type": "CHANGE_CREATED",
//!     "data": {"id": "c1", "entityType": "tag", "entityId": "t1", "level": "OPTIMISTIC"}
//! }))
//! .unwrap();
//! let effects = tracker.handle(created);
//! assert!(matches!(effects[0], Effect::Notify(_)));
//!
//! let key = EntityKey::new("tag", "t1");
//! assert_eq!(tracker.entity_changes(&key).len(), 1);
//!
//! let committed = PushMessage::from_json(json!({
//!     "type": "CHANGE_COMMITTED",
//!     "data": {"id": "c1", "entityType": "tag", "entityId": "t1"}
//! }))
//! .unwrap();
//! tracker.handle(committed);
//! assert!(tracker.entity_changes(&key).is_empty());
//! ```

pub mod change;
pub mod conflict;
pub mod diff;
pub mod error;
pub mod history;
pub mod indicator;
pub mod message;
pub mod registry;
pub mod resolver;
pub mod tracker;

// Re-export main types at crate root
pub use change::{ChangeLevel, ChangeMetadata, ChangePatch, ChangeRecord, ChangeStatus, UserRef};
pub use conflict::{Conflict, ConflictData, ConflictType, EntityKey, Resolution, ResolutionType};
pub use diff::{canonical_eq, compute_diff, render_value, Diff, DiffEntry, DiffKind, SideBySideRow};
pub use error::Error;
pub use history::{HistoryItem, HistoryQuery, HistoryView, RollbackPrompt, DEFAULT_HISTORY_LIMIT};
pub use indicator::{Indicator, IndicatorState};
pub use message::{
    ChangeCommit, ChangeRejection, ChangeUpdate, ConflictNotice, PushMessage, CHANGES_TOPIC,
};
pub use registry::{ChangeRegistry, ConflictRegistry};
pub use resolver::{
    FailedResolution, RequestOutcome, ResolveOutcome, ResolverSession, Submission,
};
pub use tracker::{
    ChangeTracker, Effect, Notification, NotificationKind, QueryKey, ResolverRequest,
    TrackerOptions, DEFAULT_SAVING_TOAST_MS,
};

/// Result type for engine operations.
pub use error::Result;

/// Type aliases for clarity
pub type ChangeId = String;
pub type ConflictId = String;
pub type EntityType = String;
pub type EntityId = String;
/// Flat field snapshot (`oldValues`, `newValues`, merged changes)
pub type Snapshot = serde_json::Map<String, serde_json::Value>;
