//! Provider abstractions for remote subject suggestion services.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod noop;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One hit as returned by a remote service. Labels are ignored by callers,
/// the URI is the identity that gets mapped onto a local vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteHit {
    pub uri: String,
    #[serde(default)]
    pub label: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub results: Vec<RemoteHit>,
}

#[async_trait::async_trait]
pub trait SuggestProvider: Send + Sync {
    async fn suggest(&self, text: &str, limit: usize) -> Result<SuggestResponse, ProviderError>;
}
