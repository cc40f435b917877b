//! Conflict resolver workflow.
//!
//! One session covers every open conflict of a single entity: the user picks
//! one strategy and it is applied to all of them. The session only models the
//! decision and submission bookkeeping; the host issues the requests.
//!
//! ```text
//! open -> select/set_merge_text -> begin_submit -> complete
//!                                      |              |
//!                                   (pending)   Resolved | Partial -> editing
//! ```

use crate::conflict::{Conflict, ConflictType, Resolution, ResolutionType};
use crate::diff::{compute_diff, Diff};
use crate::tracker::ResolverRequest;
use crate::{ConflictId, EntityKey, Error, Result, Snapshot};
use serde::Serialize;
use std::collections::HashMap;

/// Options offered for every conflict list.
const BASE_OPTIONS: [ResolutionType; 3] = [
    ResolutionType::AcceptCurrent,
    ResolutionType::AcceptIncoming,
    ResolutionType::Retry,
];

/// What the host must submit.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub resolution: Resolution,
    pub conflict_ids: Vec<ConflictId>,
}

/// Result of one resolution request.
pub type RequestOutcome = std::result::Result<(), String>;

/// Outcome of a completed submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ResolveOutcome {
    /// Every conflict was resolved; the host drops them from its registry
    Resolved { resolved: Vec<ConflictId> },
    /// Some requests failed; only `failed` remain open in the session
    Partial {
        resolved: Vec<ConflictId>,
        failed: Vec<FailedResolution>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedResolution {
    pub conflict_id: ConflictId,
    pub reason: String,
}

/// State of one resolver dialog.
#[derive(Debug, Clone)]
pub struct ResolverSession {
    entity: EntityKey,
    conflicts: Vec<Conflict>,
    current_values: Option<Snapshot>,
    incoming_values: Option<Snapshot>,
    selected: Option<ResolutionType>,
    merge_text: String,
    pending: bool,
}

impl ResolverSession {
    /// Open a session over a non-empty conflict list.
    pub fn open(request: ResolverRequest) -> Result<Self> {
        if request.conflicts.is_empty() {
            return Err(Error::NoConflicts);
        }
        Ok(Self {
            entity: request.entity,
            conflicts: request.conflicts,
            current_values: request.current_values,
            incoming_values: request.incoming_values,
            selected: None,
            merge_text: String::new(),
            pending: false,
        })
    }

    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn selected(&self) -> Option<ResolutionType> {
        self.selected
    }

    pub fn merge_text(&self) -> &str {
        &self.merge_text
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Whether MERGE is offered: only when the first conflict is a concurrent edit.
    pub fn merge_offered(&self) -> bool {
        self.conflicts
            .first()
            .is_some_and(|c| c.kind == ConflictType::ConcurrentEdit)
    }

    pub fn options(&self) -> Vec<ResolutionType> {
        let mut options = BASE_OPTIONS.to_vec();
        if self.merge_offered() {
            options.insert(2, ResolutionType::Merge);
        }
        options
    }

    pub fn select(&mut self, kind: ResolutionType) -> Result<()> {
        self.ensure_editable()?;
        if !self.options().contains(&kind) {
            return Err(Error::OptionNotOffered(kind));
        }
        self.selected = Some(kind);
        Ok(())
    }

    pub fn set_merge_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.ensure_editable()?;
        self.merge_text = text.into();
        Ok(())
    }

    /// Build the resolution from the current selection.
    ///
    /// A merge with unparsable text fails without touching the session.
    pub fn prepare(&self) -> Result<Resolution> {
        match self.selected {
            None => Err(Error::NoSelection),
            Some(ResolutionType::Merge) => Resolution::merge_from_text(&self.merge_text),
            Some(kind) => Resolution::simple(kind),
        }
    }

    /// Enter the pending state and hand out what to submit.
    pub fn begin_submit(&mut self) -> Result<Submission> {
        self.ensure_editable()?;
        let resolution = self.prepare()?;
        self.pending = true;
        Ok(Submission {
            resolution,
            conflict_ids: self.conflicts.iter().map(|c| c.id.clone()).collect(),
        })
    }

    /// Record the per-conflict outcomes of a submission.
    ///
    /// Every submitted conflict needs an outcome. On partial failure the
    /// session keeps only the failed conflicts and becomes editable again.
    pub fn complete(
        &mut self,
        outcomes: impl IntoIterator<Item = (ConflictId, RequestOutcome)>,
    ) -> Result<ResolveOutcome> {
        if !self.pending {
            return Err(Error::NotSubmitting);
        }

        let mut outcomes: HashMap<ConflictId, RequestOutcome> = outcomes.into_iter().collect();
        if let Some(missing) = self.conflicts.iter().find(|c| !outcomes.contains_key(&c.id)) {
            return Err(Error::MissingOutcome(missing.id.clone()));
        }

        self.pending = false;
        let mut resolved = Vec::new();
        let mut failed = Vec::new();
        for conflict in &self.conflicts {
            match outcomes.remove(&conflict.id) {
                Some(Err(reason)) => failed.push(FailedResolution {
                    conflict_id: conflict.id.clone(),
                    reason,
                }),
                _ => resolved.push(conflict.id.clone()),
            }
        }

        if failed.is_empty() {
            return Ok(ResolveOutcome::Resolved { resolved });
        }

        self.conflicts
            .retain(|c| failed.iter().any(|f| f.conflict_id == c.id));
        Ok(ResolveOutcome::Partial { resolved, failed })
    }

    /// Close without resolving. Not allowed while a submission is pending.
    pub fn cancel(self) -> Result<()> {
        self.ensure_editable()
    }

    /// Diff of current against incoming values, when both are known.
    pub fn diff(&self) -> Option<Diff> {
        match (&self.current_values, &self.incoming_values) {
            (Some(current), Some(incoming)) => Some(compute_diff(current, incoming)),
            _ => None,
        }
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.pending {
            Err(Error::SubmissionPending)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(kinds: &[ConflictType]) -> ResolverRequest {
        ResolverRequest {
            entity: EntityKey::new("tag", "t1"),
            conflicts: kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| Conflict::new(format!("k{}", i + 1), *kind))
                .collect(),
            current_values: json!({"name": "mine", "color": "red"}).as_object().cloned(),
            incoming_values: json!({"name": "theirs", "color": "red"}).as_object().cloned(),
        }
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            ResolverSession::open(request(&[])),
            Err(Error::NoConflicts)
        ));
    }

    #[test]
    fn merge_offered_only_for_concurrent_edit_first() {
        let session = ResolverSession::open(request(&[
            ConflictType::ConcurrentEdit,
            ConflictType::StaleData,
        ]))
        .unwrap();
        assert_eq!(
            session.options(),
            vec![
                ResolutionType::AcceptCurrent,
                ResolutionType::AcceptIncoming,
                ResolutionType::Merge,
                ResolutionType::Retry,
            ]
        );

        let mut session = ResolverSession::open(request(&[
            ConflictType::StaleData,
            ConflictType::ConcurrentEdit,
        ]))
        .unwrap();
        assert!(!session.options().contains(&ResolutionType::Merge));
        assert_eq!(
            session.select(ResolutionType::Merge),
            Err(Error::OptionNotOffered(ResolutionType::Merge))
        );
    }

    #[test]
    fn invalid_merge_text_blocks_submission_and_keeps_state() {
        let mut session = ResolverSession::open(request(&[ConflictType::ConcurrentEdit])).unwrap();
        session.select(ResolutionType::Merge).unwrap();
        session.set_merge_text("{\"name\": ").unwrap();

        assert!(matches!(
            session.begin_submit(),
            Err(Error::InvalidMergeInput(_))
        ));
        assert!(!session.is_pending());
        assert_eq!(session.selected(), Some(ResolutionType::Merge));
        assert_eq!(session.merge_text(), "{\"name\": ");

        session.set_merge_text(r#"{"name": "both"}"#).unwrap();
        let submission = session.begin_submit().unwrap();
        assert_eq!(submission.resolution.kind(), ResolutionType::Merge);
    }

    #[test]
    fn double_submission_is_refused() {
        let mut session = ResolverSession::open(request(&[ConflictType::BusinessRule])).unwrap();
        session.select(ResolutionType::Retry).unwrap();

        session.begin_submit().unwrap();
        assert_eq!(session.begin_submit(), Err(Error::SubmissionPending));
        assert_eq!(
            session.select(ResolutionType::AcceptCurrent),
            Err(Error::SubmissionPending)
        );
    }

    #[test]
    fn submission_covers_every_conflict() {
        let mut session = ResolverSession::open(request(&[
            ConflictType::ConcurrentEdit,
            ConflictType::StaleData,
            ConflictType::ValidationFailure,
        ]))
        .unwrap();
        session.select(ResolutionType::AcceptIncoming).unwrap();

        let submission = session.begin_submit().unwrap();
        assert_eq!(submission.conflict_ids, vec!["k1", "k2", "k3"]);

        let outcome = session
            .complete(submission.conflict_ids.into_iter().map(|id| (id, Ok(()))))
            .unwrap();
        assert_eq!(
            outcome,
            ResolveOutcome::Resolved {
                resolved: vec!["k1".into(), "k2".into(), "k3".into()]
            }
        );
    }

    #[test]
    fn partial_failure_keeps_only_failed_conflicts() {
        let mut session = ResolverSession::open(request(&[
            ConflictType::ConcurrentEdit,
            ConflictType::StaleData,
        ]))
        .unwrap();
        session.select(ResolutionType::AcceptCurrent).unwrap();
        session.begin_submit().unwrap();

        let outcome = session
            .complete(vec![
                ("k1".to_string(), Ok(())),
                ("k2".to_string(), Err("timeout".to_string())),
            ])
            .unwrap();

        assert_eq!(
            outcome,
            ResolveOutcome::Partial {
                resolved: vec!["k1".into()],
                failed: vec![FailedResolution {
                    conflict_id: "k2".into(),
                    reason: "timeout".into()
                }],
            }
        );
        assert!(!session.is_pending());
        assert_eq!(session.conflicts().len(), 1);
        assert_eq!(session.conflicts()[0].id, "k2");
    }

    #[test]
    fn complete_requires_all_outcomes() {
        let mut session = ResolverSession::open(request(&[
            ConflictType::StaleData,
            ConflictType::StaleData,
        ]))
        .unwrap();
        assert_eq!(
            session.complete(Vec::new()).unwrap_err(),
            Error::NotSubmitting
        );

        session.select(ResolutionType::Retry).unwrap();
        session.begin_submit().unwrap();
        assert_eq!(
            session.complete(vec![("k1".to_string(), Ok(()))]),
            Err(Error::MissingOutcome("k2".into()))
        );
        assert!(session.is_pending());
    }

    #[test]
    fn cancel_is_a_noop_unless_pending() {
        let session = ResolverSession::open(request(&[ConflictType::PermissionDenied])).unwrap();
        assert!(session.cancel().is_ok());

        let mut session = ResolverSession::open(request(&[ConflictType::PermissionDenied])).unwrap();
        session.select(ResolutionType::Retry).unwrap();
        session.begin_submit().unwrap();
        assert_eq!(session.cancel(), Err(Error::SubmissionPending));
    }

    #[test]
    fn diff_between_current_and_incoming() {
        let session = ResolverSession::open(request(&[ConflictType::ConcurrentEdit])).unwrap();
        let diff = session.diff().unwrap();
        assert_eq!(diff.len(), 1);
        assert!(diff.get("name").is_some());
    }
}
