//! Test doubles shared by handler and route tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use changeline_engine::{ChangeRecord, ConflictId, HistoryQuery, Resolution, TrackerOptions};
use futures::future::BoxFuture;
use serde_json::json;
use tokio::sync::Barrier;

use crate::cache::QueryCache;
use crate::channel::Hub;
use crate::config::Config;
use crate::provider::ChangeProvider;
use crate::upstream::{ChangeApi, UpstreamError, UpstreamResult};
use crate::AppState;

/// In-memory [`ChangeApi`] recording every call.
#[derive(Debug, Default)]
pub struct FakeApi {
    failing: HashSet<String>,
    history: Vec<ChangeRecord>,
    resolutions: Mutex<Vec<(ConflictId, Resolution)>>,
    rollbacks: Mutex<Vec<String>>,
    history_fetches: Mutex<Vec<HistoryQuery>>,
    gate: Option<Barrier>,
}

impl FakeApi {
    /// Requests for these ids fail with a 500.
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Resolution requests block until `n` of them are in flight.
    pub fn gated(n: usize) -> Self {
        Self {
            gate: Some(Barrier::new(n)),
            ..Self::default()
        }
    }

    pub fn with_history(history: Vec<ChangeRecord>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn resolutions(&self) -> Vec<(ConflictId, Resolution)> {
        self.resolutions.lock().unwrap().clone()
    }

    pub fn resolved_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.resolutions().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    pub fn rollbacks(&self) -> Vec<String> {
        self.rollbacks.lock().unwrap().clone()
    }

    pub fn history_fetches(&self) -> usize {
        self.history_fetches.lock().unwrap().len()
    }

    fn check(&self, id: &str) -> UpstreamResult<()> {
        if self.failing.contains(id) {
            return Err(UpstreamError::Status {
                status: 500,
                body: format!("cannot process {id}"),
            });
        }
        Ok(())
    }
}

impl ChangeApi for FakeApi {
    fn submit_resolution<'a>(
        &'a self,
        conflict_id: &'a str,
        resolution: &'a Resolution,
    ) -> BoxFuture<'a, UpstreamResult<()>> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                gate.wait().await;
            }
            self.check(conflict_id)?;
            self.resolutions
                .lock()
                .unwrap()
                .push((conflict_id.to_string(), resolution.clone()));
            Ok(())
        })
    }

    fn submit_rollback<'a>(&'a self, change_id: &'a str) -> BoxFuture<'a, UpstreamResult<()>> {
        Box::pin(async move {
            self.check(change_id)?;
            self.rollbacks.lock().unwrap().push(change_id.to_string());
            Ok(())
        })
    }

    fn fetch_history<'a>(
        &'a self,
        query: &'a HistoryQuery,
    ) -> BoxFuture<'a, UpstreamResult<Vec<ChangeRecord>>> {
        Box::pin(async move {
            self.history_fetches.lock().unwrap().push(query.clone());
            Ok(self
                .history
                .iter()
                .filter(|r| query.include_rollbacks || !r.is_rollback())
                .take(query.limit as usize)
                .cloned()
                .collect())
        })
    }
}

pub fn config() -> Config {
    Config::from_lookup(|name| match name {
        "UPSTREAM_API_URL" => Some("http://upstream.test".to_string()),
        _ => None,
    })
    .unwrap()
}

/// Provider holding concurrent-edit conflicts for `tag:t1`.
pub fn provider_with_conflicts(ids: &[&str]) -> Arc<ChangeProvider> {
    let provider = ChangeProvider::new_shared(
        TrackerOptions::default(),
        Hub::new_shared(),
        Arc::new(QueryCache::new()),
    );
    for id in ids {
        provider.process(json!({
            "type": "CONFLICT_DETECTED",
            "data": {
                "entityType": "tag",
                "entityId": "t1",
                "conflict": {"id": id, "type": "CONCURRENT_EDIT"},
                "currentValues": {"name": "mine"},
                "incomingValues": {"name": "theirs"}
            }
        }));
    }
    provider
}

pub fn state(api: Arc<FakeApi>, config: Config) -> AppState {
    let hub = Hub::new_shared();
    let cache = Arc::new(QueryCache::new());
    let provider = ChangeProvider::new_shared(
        TrackerOptions {
            saving_toast_ms: config.saving_toast_ms,
        },
        hub.clone(),
        cache.clone(),
    );

    AppState {
        config: Arc::new(config),
        hub,
        cache,
        provider,
        api,
    }
}
