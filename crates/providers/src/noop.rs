use crate::{ProviderError, SuggestProvider, SuggestResponse};

#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl SuggestProvider for NoopProvider {
    async fn suggest(&self, _text: &str, _limit: usize) -> Result<SuggestResponse, ProviderError> {
        Ok(SuggestResponse { results: vec![] })
    }
}
