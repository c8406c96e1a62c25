//! Delegates scoring to a remote suggestion service.

use super::{not_initialized, Backend, BackendContext, BackendKind};
use crate::error::{Result, SuggestError};
use crate::suggestion::ScoreVector;
use crate::vocab::{cleanup_uri, SubjectIndex};
use async_trait::async_trait;
use providers::http::{HttpConfig, HttpProvider};
use providers::SuggestProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

pub const DEFAULT_REMOTE_LIMIT: usize = 100;

struct Remote {
    provider: Arc<dyn SuggestProvider>,
    label: String,
    subjects: Arc<SubjectIndex>,
    limit: usize,
}

#[derive(Default)]
pub struct HttpBackend {
    provider: Option<Arc<dyn SuggestProvider>>,
    remote: OnceCell<Remote>,
}

impl HttpBackend {
    /// Uses `provider` instead of building an HTTP client from parameters.
    pub fn with_provider(provider: Arc<dyn SuggestProvider>) -> Self {
        Self {
            provider: Some(provider),
            remote: OnceCell::new(),
        }
    }
}

fn build_provider(ctx: &BackendContext<'_>) -> Result<(Arc<dyn SuggestProvider>, String)> {
    let endpoint = ctx
        .param("endpoint")
        .ok_or_else(|| SuggestError::Configuration("http backend needs an endpoint parameter".into()))?;
    let timeout = match ctx.param("timeout_ms") {
        Some(_) => Some(Duration::from_millis(ctx.param_usize("timeout_ms", 0)? as u64)),
        None => None,
    };
    let provider = HttpProvider::new(HttpConfig {
        endpoint: endpoint.to_string(),
        project: ctx.param("project").map(str::to_string),
        timeout,
    })
    .map_err(|e| SuggestError::Configuration(e.to_string()))?;
    Ok((Arc::new(provider), endpoint.to_string()))
}

#[async_trait]
impl Backend for HttpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Http
    }

    async fn initialize(&self, ctx: &BackendContext<'_>) -> Result<()> {
        self.remote
            .get_or_try_init(|| async {
                let (provider, label) = match &self.provider {
                    Some(p) => (p.clone(), "remote".to_string()),
                    None => build_provider(ctx)?,
                };
                Ok::<_, SuggestError>(Remote {
                    provider,
                    label,
                    subjects: ctx.subjects.clone(),
                    limit: ctx.param_usize("limit", DEFAULT_REMOTE_LIMIT)?,
                })
            })
            .await?;
        Ok(())
    }

    async fn suggest(&self, text: &str) -> Result<ScoreVector> {
        let remote = self.remote.get().ok_or_else(|| not_initialized(self.kind()))?;
        let response = remote
            .provider
            .suggest(text, remote.limit)
            .await
            .map_err(|e| SuggestError::SuggestionFailed(format!("{}: {e}", remote.label)))?;
        let mut scores = ScoreVector::new();
        let mut unknown = 0usize;
        for hit in response.results {
            match remote.subjects.lookup_by_uri(cleanup_uri(&hit.uri)) {
                Some(pos) if hit.score > 0.0 => scores.insert(pos, hit.score),
                Some(_) => {}
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            debug!(endpoint = %remote.label, unknown, "dropped hits outside the vocabulary");
        }
        Ok(scores)
    }
}
