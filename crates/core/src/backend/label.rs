//! Keyword matching against subject labels in the project language.

use super::{not_initialized, Backend, BackendContext, BackendKind};
use crate::analyzer::Analyzer;
use crate::error::{Result, SuggestError};
use crate::suggestion::ScoreVector;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

pub const DEFAULT_MIN_SCORE: f32 = 0.5;

struct LabelModel {
    analyzer: Arc<dyn Analyzer>,
    /// (position, distinct label tokens) for every labelled active subject.
    labels: Vec<(usize, Vec<String>)>,
    min_score: f32,
}

#[derive(Default)]
pub struct LabelBackend {
    model: OnceCell<LabelModel>,
}

#[async_trait]
impl Backend for LabelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Label
    }

    async fn initialize(&self, ctx: &BackendContext<'_>) -> Result<()> {
        self.model
            .get_or_try_init(|| async {
                let min_score = ctx.param_f32("min_score", DEFAULT_MIN_SCORE)?;
                let mut labels = Vec::new();
                for (pos, subject) in ctx.subjects.active() {
                    let Some(label) = subject.label(ctx.language) else {
                        continue;
                    };
                    let mut tokens = ctx.analyzer.tokenize_words(label);
                    tokens.sort();
                    tokens.dedup();
                    if !tokens.is_empty() {
                        labels.push((pos, tokens));
                    }
                }
                debug!(project_id = ctx.project_id, labels = labels.len(), "label index built");
                Ok::<_, SuggestError>(LabelModel {
                    analyzer: ctx.analyzer.clone(),
                    labels,
                    min_score,
                })
            })
            .await?;
        Ok(())
    }

    async fn suggest(&self, text: &str) -> Result<ScoreVector> {
        let model = self.model.get().ok_or_else(|| not_initialized(self.kind()))?;
        let words: HashSet<String> = model.analyzer.tokenize_words(text).into_iter().collect();
        if words.is_empty() {
            return Ok(ScoreVector::new());
        }
        Ok(model
            .labels
            .iter()
            .filter_map(|(pos, tokens)| {
                let hits = tokens.iter().filter(|t| words.contains(*t)).count();
                let score = hits as f32 / tokens.len() as f32;
                (hits > 0 && score >= model.min_score).then_some((*pos, score))
            })
            .collect())
    }
}
