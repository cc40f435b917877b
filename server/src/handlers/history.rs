//! Change history and rollback handlers.

use changeline_engine::{
    ChangeId, ChangeRecord, EntityKey, HistoryItem, HistoryQuery, HistoryView, QueryKey,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::QueryCache;
use crate::error::{AppError, Result};
use crate::upstream::ChangeApi;

/// History query string parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    #[serde(default)]
    pub include_rollbacks: Option<bool>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// Comma-separated change ids to render expanded
    #[serde(default)]
    pub expand: Option<String>,
}

impl HistoryParams {
    pub fn to_query(&self, entity: EntityKey, default_limit: u32) -> HistoryQuery {
        HistoryQuery::new(entity)
            .with_rollbacks(self.include_rollbacks.unwrap_or(false))
            .with_limit(self.limit.unwrap_or(default_limit))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPage<'a> {
    entity: &'a EntityKey,
    rollback_enabled: bool,
    items: Vec<HistoryItem<'a>>,
}

/// Rollback request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub confirmed: bool,
}

/// Rollback response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RollbackResponse {
    /// Nothing was sent; repeat with `confirmed: true` to proceed
    #[serde(rename_all = "camelCase")]
    ConfirmationRequired { change_id: ChangeId, summary: String },
    #[serde(rename_all = "camelCase")]
    Submitted { change_id: ChangeId },
}

fn cache_params(query: &HistoryQuery) -> String {
    format!(
        "includeRollbacks={}&limit={}",
        query.include_rollbacks, query.limit
    )
}

/// Fetch history through the query cache.
pub async fn load_history(
    cache: &QueryCache,
    api: &dyn ChangeApi,
    query: &HistoryQuery,
) -> Result<Vec<ChangeRecord>> {
    let key = QueryKey::History(query.entity.clone());
    let params = cache_params(query);

    if let Some(value) = cache.get(&key, &params) {
        tracing::debug!(entity = %query.entity, "History cache hit");
        return Ok(serde_json::from_value(value)?);
    }

    let records = api.fetch_history(query).await?;
    cache.put(key, params, serde_json::to_value(&records)?);
    Ok(records)
}

/// Render the history rows of an entity.
pub async fn handle_history(
    cache: &QueryCache,
    api: &dyn ChangeApi,
    query: &HistoryQuery,
    expand: Option<&str>,
    rollback_enabled: bool,
) -> Result<Value> {
    let records = load_history(cache, api, query).await?;
    let mut view = HistoryView::new(records, rollback_enabled);

    for change_id in expand.into_iter().flat_map(|list| list.split(',')) {
        let change_id = change_id.trim();
        if view.position(change_id).is_some() && !view.is_expanded(change_id) {
            view.toggle(change_id);
        }
    }

    let page = HistoryPage {
        entity: &query.entity,
        rollback_enabled,
        items: view.items(),
    };
    Ok(serde_json::to_value(page)?)
}

/// Roll back a history item, after confirmation.
///
/// Eligibility is checked against the newest history (rollbacks included)
/// on both the prompt and the confirmed request. The cached history stays
/// until the resulting `CHANGE_COMMITTED` invalidates it.
pub async fn handle_rollback(
    cache: &QueryCache,
    api: &dyn ChangeApi,
    query: &HistoryQuery,
    change_id: &str,
    request: RollbackRequest,
    rollback_enabled: bool,
) -> Result<RollbackResponse> {
    let records = load_history(cache, api, query).await?;
    let view = HistoryView::new(records, rollback_enabled);

    let index = view.position(change_id).ok_or_else(|| {
        AppError::NotFound(format!("change {change_id} is not in the history of {}", query.entity))
    })?;
    let prompt = view.request_rollback(index)?;

    if !request.confirmed {
        return Ok(RollbackResponse::ConfirmationRequired {
            change_id: prompt.change_id().to_string(),
            summary: prompt.summary().to_string(),
        });
    }

    let change_id = prompt.confirm();
    api.submit_rollback(&change_id).await?;
    tracing::info!(entity = %query.entity, change_id = %change_id, "Rollback submitted");

    Ok(RollbackResponse::Submitted { change_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use changeline_engine::{ChangeLevel, ChangeMetadata, ChangeStatus, Error};

    fn key() -> EntityKey {
        EntityKey::new("tag", "t1")
    }

    fn records() -> Vec<ChangeRecord> {
        let rollback = ChangeRecord {
            metadata: Some(ChangeMetadata {
                rollback_of: Some("c1".to_string()),
                ..ChangeMetadata::default()
            }),
            ..ChangeRecord::new("r1", "tag", "t1", ChangeLevel::Committed)
                .with_status(ChangeStatus::Applied)
        };
        vec![
            ChangeRecord::new("c3", "tag", "t1", ChangeLevel::Committed)
                .with_status(ChangeStatus::Applied),
            rollback,
            ChangeRecord::new("c2", "tag", "t1", ChangeLevel::Committed)
                .with_status(ChangeStatus::Rejected),
            ChangeRecord::new("c1", "tag", "t1", ChangeLevel::Committed)
                .with_status(ChangeStatus::Applied),
        ]
    }

    fn query() -> HistoryQuery {
        HistoryQuery::new(key()).with_rollbacks(true)
    }

    #[tokio::test]
    async fn test_history_is_cached_per_params() {
        let cache = QueryCache::new();
        let api = FakeApi::with_history(records());

        let first = load_history(&cache, &api, &query()).await.unwrap();
        let second = load_history(&cache, &api, &query()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.history_fetches(), 1);

        let without = load_history(&cache, &api, &HistoryQuery::new(key()))
            .await
            .unwrap();
        assert_eq!(without.len(), 3);
        assert_eq!(api.history_fetches(), 2);
    }

    #[tokio::test]
    async fn test_history_rows() {
        let cache = QueryCache::new();
        let api = FakeApi::with_history(records());

        let page = handle_history(&cache, &api, &query(), Some("c1, missing"), true)
            .await
            .unwrap();
        let items = page["items"].as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0]["canRollback"], false);
        assert_eq!(items[1]["isRollback"], true);
        assert_eq!(items[2]["canRollback"], false);
        assert_eq!(items[3]["canRollback"], true);
        assert_eq!(items[3]["expanded"], true);
    }

    #[tokio::test]
    async fn test_rollback_needs_confirmation() {
        let cache = QueryCache::new();
        let api = FakeApi::with_history(records());

        let response = handle_rollback(
            &cache,
            &api,
            &query(),
            "c1",
            RollbackRequest::default(),
            true,
        )
        .await
        .unwrap();
        assert!(matches!(response, RollbackResponse::ConfirmationRequired { .. }));
        assert!(api.rollbacks().is_empty());

        let response = handle_rollback(
            &cache,
            &api,
            &query(),
            "c1",
            RollbackRequest { confirmed: true },
            true,
        )
        .await
        .unwrap();
        assert_eq!(
            response,
            RollbackResponse::Submitted {
                change_id: "c1".to_string()
            }
        );
        assert_eq!(api.rollbacks(), vec!["c1"]);
        assert_eq!(cache.len(), 1);
        assert_eq!(api.history_fetches(), 1);
    }

    #[tokio::test]
    async fn test_rollback_refused_for_ineligible_items() {
        let cache = QueryCache::new();
        let api = FakeApi::with_history(records());
        let confirmed = || RollbackRequest { confirmed: true };

        let newest = handle_rollback(&cache, &api, &query(), "c3", confirmed(), true).await;
        assert!(matches!(
            newest,
            Err(AppError::Engine(Error::RollbackNotAllowed(_)))
        ));

        let disabled = handle_rollback(&cache, &api, &query(), "c1", confirmed(), false).await;
        assert!(matches!(disabled, Err(AppError::Engine(_))));

        let unknown = handle_rollback(&cache, &api, &query(), "nope", confirmed(), true).await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
        assert!(api.rollbacks().is_empty());
    }
}
