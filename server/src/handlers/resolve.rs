//! Conflict resolution handler.

use changeline_engine::{
    Conflict, ConflictId, EntityKey, RequestOutcome, ResolutionType, ResolveOutcome,
    ResolverSession,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::provider::ChangeProvider;
use crate::upstream::ChangeApi;

/// Resolve request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    #[serde(rename = "type")]
    pub kind: ResolutionType,
    /// Raw JSON text of the merged field values, required for `MERGE`
    #[serde(default)]
    pub merged_changes: Option<String>,
}

/// Resolve response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    #[serde(flatten)]
    pub outcome: ResolveOutcome,
    /// Conflicts still open for the entity afterwards
    pub remaining: Vec<Conflict>,
}

/// Apply one resolution to every open conflict of an entity.
///
/// All requests are sent concurrently. Conflicts that resolved are dropped
/// from the registry; failed ones stay open and are reported back.
pub async fn handle_resolve(
    provider: &ChangeProvider,
    api: &dyn ChangeApi,
    key: EntityKey,
    request: ResolveRequest,
) -> Result<ResolveResponse> {
    if request.kind != ResolutionType::Merge && request.merged_changes.is_some() {
        return Err(AppError::BadRequest(format!(
            "mergedChanges is only accepted with MERGE, got {}",
            request.kind
        )));
    }

    let _guard = provider.begin_resolving(&key).ok_or_else(|| {
        AppError::Conflict(format!("a resolution for {key} is already being submitted"))
    })?;

    let mut session = ResolverSession::open(provider.resolver_request(&key))
        .map_err(|_| AppError::NotFound(format!("no open conflicts for {key}")))?;
    session.select(request.kind)?;
    if let Some(text) = request.merged_changes {
        session.set_merge_text(text)?;
    }

    let submission = session.begin_submit()?;
    tracing::info!(
        entity = %key,
        kind = %request.kind,
        conflicts = submission.conflict_ids.len(),
        "Submitting conflict resolutions"
    );

    let resolution = &submission.resolution;
    let outcomes: Vec<(ConflictId, RequestOutcome)> =
        join_all(submission.conflict_ids.iter().map(|conflict_id| async move {
            let outcome = api
                .submit_resolution(conflict_id, resolution)
                .await
                .map_err(|e| {
                    tracing::warn!(conflict_id = %conflict_id, "Resolution failed: {}", e);
                    e.to_string()
                });
            (conflict_id.clone(), outcome)
        }))
        .await;

    let outcome = session.complete(outcomes)?;
    let resolved = match &outcome {
        ResolveOutcome::Resolved { resolved } | ResolveOutcome::Partial { resolved, .. } => {
            resolved.clone()
        }
    };
    let remaining = provider.conflicts_resolved(&key, resolved);

    if let ResolveOutcome::Partial { failed, .. } = &outcome {
        tracing::warn!(
            entity = %key,
            failed = failed.len(),
            "Conflict resolution partially failed"
        );
    }

    Ok(ResolveResponse { outcome, remaining })
}

/// Dismiss every open conflict of an entity without resolving upstream.
pub fn handle_clear_conflicts(provider: &ChangeProvider, key: &EntityKey) -> Result<usize> {
    if provider.is_resolving(key) {
        return Err(AppError::Conflict(format!(
            "a resolution for {key} is being submitted"
        )));
    }
    Ok(provider.clear_conflicts(key))
}
