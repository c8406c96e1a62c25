//! A deterministic test double: always suggests one subject with full score.

use super::{ensure_trainable, not_initialized, Backend, BackendContext, BackendKind};
use crate::corpus::Corpus;
use crate::error::{Result, SuggestError};
use crate::store::ModelArtifact;
use crate::suggestion::ScoreVector;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Default)]
pub struct DummyBackend {
    state: OnceCell<Option<usize>>,
}

fn first_resolvable(corpus: &dyn Corpus, ctx: &BackendContext<'_>) -> Option<String> {
    corpus.documents().find_map(|doc| {
        doc.subjects
            .iter()
            .find(|uri| {
                ctx.subjects
                    .lookup_by_uri(uri)
                    .is_some_and(|pos| !ctx.subjects.is_deprecated(pos))
            })
            .cloned()
    })
}

#[async_trait]
impl Backend for DummyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dummy
    }

    async fn initialize(&self, ctx: &BackendContext<'_>) -> Result<()> {
        self.state
            .get_or_try_init(|| async {
                let recorded = ctx
                    .artifact
                    .and_then(|a| a.data.get("uri"))
                    .and_then(|v| v.as_str())
                    .and_then(|uri| ctx.subjects.lookup_by_uri(uri));
                let pos = recorded.or_else(|| ctx.subjects.active().next().map(|(pos, _)| pos));
                debug!(project_id = ctx.project_id, ?pos, "dummy backend ready");
                Ok::<_, SuggestError>(pos)
            })
            .await?;
        Ok(())
    }

    async fn train(&self, corpus: &dyn Corpus, ctx: &BackendContext<'_>) -> Result<ModelArtifact> {
        ensure_trainable(corpus, &ctx.subjects, ctx.project_id)?;
        let uri = first_resolvable(corpus, ctx)
            .ok_or_else(|| SuggestError::training(ctx.project_id, "no resolvable subject"))?;
        Ok(ModelArtifact::new(self.kind().name(), json!({ "uri": uri })))
    }

    async fn suggest(&self, _text: &str) -> Result<ScoreVector> {
        let state = self.state.get().ok_or_else(|| not_initialized(self.kind()))?;
        Ok(state.iter().map(|pos| (*pos, 1.0)).collect())
    }

    async fn learn(&self, corpus: &dyn Corpus, ctx: &BackendContext<'_>) -> Result<ModelArtifact> {
        match first_resolvable(corpus, ctx) {
            Some(uri) => Ok(ModelArtifact::new(self.kind().name(), json!({ "uri": uri }))),
            None => Err(SuggestError::training(
                ctx.project_id,
                "learn corpus has no resolvable subject",
            )),
        }
    }
}
