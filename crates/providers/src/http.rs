use crate::{ProviderError, RemoteHit, SuggestProvider, SuggestResponse};
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Full suggest URL, e.g. `https://host/v1/projects/yso-en/suggest`.
    pub endpoint: String,
    /// Remote project id, sent along for services that multiplex projects.
    pub project: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    cfg: Arc<HttpConfig>,
}

impl HttpProvider {
    pub fn new(cfg: HttpConfig) -> Result<Self, ProviderError> {
        let mut builder = Client::builder();
        if let Some(timeout) = cfg.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            cfg: Arc::new(cfg),
        })
    }
}

#[async_trait::async_trait]
impl SuggestProvider for HttpProvider {
    async fn suggest(&self, text: &str, limit: usize) -> Result<SuggestResponse, ProviderError> {
        let limit = limit.to_string();
        let mut form: Vec<(&str, &str)> = vec![("text", text), ("limit", limit.as_str())];
        if let Some(project) = &self.cfg.project {
            form.push(("project", project.as_str()));
        }

        let resp = self
            .client
            .post(&self.cfg.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::RequestFailed(format!(
                "status {} body {:?}",
                status, body
            )));
        }
        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let results = parse_results(value)?;
        debug!(endpoint = %self.cfg.endpoint, hits = results.len(), "remote suggest");
        Ok(SuggestResponse { results })
    }

}

/// Accepts both `{"results": [...]}` and a bare array; drops non-positive scores.
pub fn parse_results(value: serde_json::Value) -> Result<Vec<RemoteHit>, ProviderError> {
    let list = match value {
        serde_json::Value::Object(mut map) => map
            .remove("results")
            .ok_or_else(|| ProviderError::InvalidResponse("missing results".into()))?,
        other => other,
    };
    let hits: Vec<RemoteHit> = serde_json::from_value(list)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    Ok(hits.into_iter().filter(|h| h.score > 0.0).collect())
}
