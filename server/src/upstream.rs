//! Upstream change API client.
//!
//! The provider never talks HTTP directly; it goes through [`ChangeApi`] so
//! handlers can be exercised against an in-memory implementation.

use changeline_engine::{ChangeRecord, HistoryQuery, Resolution};
use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder, Url};

/// Upstream request errors.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
}

pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

/// Operations the provider needs from the upstream server.
pub trait ChangeApi: Send + Sync {
    fn submit_resolution<'a>(
        &'a self,
        conflict_id: &'a str,
        resolution: &'a Resolution,
    ) -> BoxFuture<'a, UpstreamResult<()>>;

    fn submit_rollback<'a>(&'a self, change_id: &'a str) -> BoxFuture<'a, UpstreamResult<()>>;

    fn fetch_history<'a>(
        &'a self,
        query: &'a HistoryQuery,
    ) -> BoxFuture<'a, UpstreamResult<Vec<ChangeRecord>>>;
}

/// `reqwest`-backed [`ChangeApi`].
#[derive(Debug, Clone)]
pub struct HttpChangeApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpChangeApi {
    pub fn new(base_url: &str, token: Option<String>) -> UpstreamResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| UpstreamError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            token,
        })
    }

    /// Base url with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> UpstreamResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| UpstreamError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> UpstreamResult<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl ChangeApi for HttpChangeApi {
    fn submit_resolution<'a>(
        &'a self,
        conflict_id: &'a str,
        resolution: &'a Resolution,
    ) -> BoxFuture<'a, UpstreamResult<()>> {
        Box::pin(async move {
            let url = self.endpoint(&["conflicts", conflict_id, "resolve"])?;
            self.send(self.client.post(url).json(resolution)).await?;
            tracing::debug!(
                conflict_id = %conflict_id,
                kind = %resolution.kind(),
                "Submitted resolution"
            );
            Ok(())
        })
    }

    fn submit_rollback<'a>(&'a self, change_id: &'a str) -> BoxFuture<'a, UpstreamResult<()>> {
        Box::pin(async move {
            let url = self.endpoint(&["changes", change_id, "rollback"])?;
            self.send(self.client.post(url)).await?;
            tracing::debug!(change_id = %change_id, "Submitted rollback");
            Ok(())
        })
    }

    fn fetch_history<'a>(
        &'a self,
        query: &'a HistoryQuery,
    ) -> BoxFuture<'a, UpstreamResult<Vec<ChangeRecord>>> {
        Box::pin(async move {
            let mut url = self.endpoint(&[
                "changes",
                query.entity.entity_type.as_str(),
                query.entity.entity_id.as_str(),
            ])?;
            url.query_pairs_mut()
                .append_pair("includeRollbacks", &query.include_rollbacks.to_string())
                .append_pair("limit", &query.limit.to_string());

            let records: Vec<ChangeRecord> = self.send(self.client.get(url)).await?.json().await?;
            tracing::debug!(entity = %query.entity, count = records.len(), "Fetched history");
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let api = HttpChangeApi::new("https://api.example.com/v1/", None).unwrap();
        let url = api.endpoint(&["changes", "tag", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/changes/tag/a%20b%2Fc");

        let api = HttpChangeApi::new("https://api.example.com", None).unwrap();
        let url = api.endpoint(&["conflicts", "k1", "resolve"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/conflicts/k1/resolve");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(matches!(
            HttpChangeApi::new("not a url", None),
            Err(UpstreamError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpChangeApi::new("mailto:ops@example.com", None),
            Err(UpstreamError::InvalidUrl(_))
        ));
    }
}
