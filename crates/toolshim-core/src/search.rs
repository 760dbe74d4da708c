use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use toolshim_transform::SearchHit;
use url::Url;

use crate::upstream::{HttpMethod, UpstreamClient, UpstreamFailure, UpstreamHttpRequest};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search provider unreachable: {0}")]
    Transport(#[from] UpstreamFailure),
    #[error("search provider answered {0}")]
    Status(u16),
    #[error("search provider returned malformed results: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("search timed out after {0}s")]
    Timeout(u64),
    #[error("invalid search endpoint {endpoint}: {reason}")]
    Endpoint { endpoint: String, reason: String },
}

/// The web-search collaborator consulted for questions needing current
/// information.
pub trait SearchProvider: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchHit>, SearchError>> + Send + 'a>>;
}

/// SearXNG-style JSON endpoint: `GET <endpoint>?q=..&format=json`.
pub struct HttpSearchProvider {
    endpoint: Url,
    client: Arc<dyn UpstreamClient>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawResults {
    #[serde(default)]
    results: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

impl HttpSearchProvider {
    pub fn new(
        endpoint: &str,
        client: Arc<dyn UpstreamClient>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let endpoint = Url::parse(endpoint).map_err(|err| SearchError::Endpoint {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            endpoint,
            client,
            timeout,
        })
    }

    pub fn query_url(&self, query: &str) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json");
        url.to_string()
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        let resp = self
            .client
            .send(UpstreamHttpRequest {
                method: HttpMethod::Get,
                url: self.query_url(query),
                headers: vec![("accept".to_string(), "application/json".to_string())],
                body: None,
            })
            .await?;
        if !(200..300).contains(&resp.status) {
            return Err(SearchError::Status(resp.status));
        }
        let raw: RawResults = serde_json::from_slice(&resp.body)?;
        Ok(raw
            .results
            .into_iter()
            .filter(|hit| !hit.title.is_empty() || !hit.content.is_empty())
            .take(max_results)
            .map(|hit| SearchHit {
                title: hit.title,
                snippet: hit.content,
                source: hit.url,
            })
            .collect())
    }
}

impl SearchProvider for HttpSearchProvider {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchHit>, SearchError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::timeout(self.timeout, self.fetch(query, max_results))
                .await
                .map_err(|_| SearchError::Timeout(self.timeout.as_secs()))?
        })
    }
}
