//! Learned combination of source projects.
//!
//! Every candidate subject gets one feature slot per source (that source's
//! score for the subject, zero when absent). A logistic model over those
//! slots produces the final score. Training runs plain full-batch gradient
//! descent in corpus order, so the same corpus always yields the same model.

use super::ensemble::{combine_weighted, Sources};
use super::{
    check_batch_size, ensure_trainable, not_initialized, param_f32, param_usize, Backend,
    BackendContext, BackendKind,
};
use crate::corpus::Corpus;
use crate::error::{Result, SuggestError};
use crate::store::ModelArtifact;
use crate::suggestion::ScoreVector;
use crate::vocab::SubjectIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetaParams {
    pub epochs: usize,
    pub learn_epochs: usize,
    pub learning_rate: f32,
}

impl MetaParams {
    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self> {
        let learning_rate = param_f32(params, "learning_rate", 0.5)?;
        if learning_rate <= 0.0 {
            return Err(SuggestError::Configuration(
                "learning_rate must be positive".into(),
            ));
        }
        Ok(Self {
            epochs: param_usize(params, "epochs", 10)?,
            learn_epochs: param_usize(params, "learn_epochs", 1)?,
            learning_rate,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MetaWeights {
    sources: Vec<String>,
    weights: Vec<f32>,
    bias: f32,
}

impl MetaWeights {
    fn initial(sources: &Sources) -> Self {
        Self {
            sources: sources.ids(),
            weights: sources.weights(),
            bias: 0.0,
        }
    }

    fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        serde_json::from_value(artifact.data.clone())
            .map_err(|e| SuggestError::Storage(format!("unreadable meta_ensemble model: {e}")))
    }

    fn matches(&self, sources: &Sources) -> bool {
        self.sources == sources.ids() && self.weights.len() == self.sources.len()
    }

    fn score(&self, features: &[f32]) -> f32 {
        let z = self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f32>();
        1.0 / (1.0 + (-z).exp())
    }

    fn fit(&mut self, examples: &[(Vec<f32>, f32)], epochs: usize, learning_rate: f32) {
        if examples.is_empty() {
            return;
        }
        let m = examples.len() as f32;
        for _ in 0..epochs {
            let mut grad_w = vec![0.0_f32; self.weights.len()];
            let mut grad_b = 0.0_f32;
            for (features, target) in examples {
                let err = self.score(features) - target;
                for (g, x) in grad_w.iter_mut().zip(features) {
                    *g += err * x;
                }
                grad_b += err;
            }
            for (w, g) in self.weights.iter_mut().zip(&grad_w) {
                *w -= learning_rate * g / m;
            }
            self.bias -= learning_rate * grad_b / m;
        }
    }

    fn to_artifact(&self, examples: usize) -> ModelArtifact {
        let mut data = serde_json::to_value(self).unwrap_or_default();
        data["examples"] = serde_json::json!(examples);
        ModelArtifact::new(BackendKind::MetaEnsemble.name(), data)
    }
}

fn features(vectors: &[Option<ScoreVector>], pos: usize) -> Vec<f32> {
    vectors
        .iter()
        .map(|v| v.as_ref().map(|v| v.get(pos)).unwrap_or(0.0))
        .collect()
}

/// Runs every document through the sources and turns candidates plus gold
/// subjects into labelled feature rows.
async fn gather(
    sources: &Sources,
    corpus: &dyn Corpus,
    subjects: &SubjectIndex,
) -> Result<Vec<(Vec<f32>, f32)>> {
    let mut examples = Vec::new();
    for doc in corpus.documents() {
        let gold: HashSet<usize> = doc.positions(subjects).into_iter().collect();
        if gold.is_empty() {
            continue;
        }
        let vectors = sources.collect(&doc.text).await?;
        let mut candidates: Vec<usize> = vectors
            .iter()
            .flatten()
            .flat_map(|v| v.iter().map(|(pos, _)| pos))
            .chain(gold.iter().copied())
            .collect();
        candidates.sort_unstable();
        candidates.dedup();
        for pos in candidates {
            let target = if gold.contains(&pos) { 1.0 } else { 0.0 };
            examples.push((features(&vectors, pos), target));
        }
    }
    Ok(examples)
}

struct MetaModel {
    sources: Sources,
    weights: MetaWeights,
}

impl MetaModel {
    fn score(&self, vectors: &[Option<ScoreVector>]) -> ScoreVector {
        // the weighted combination only fixes candidate order
        combine_weighted(vectors, &self.sources.weights())
            .iter()
            .map(|(pos, _)| (pos, self.weights.score(&features(vectors, pos))))
            .collect()
    }
}

#[derive(Default)]
pub struct MetaEnsembleBackend {
    model: OnceCell<MetaModel>,
}

#[async_trait]
impl Backend for MetaEnsembleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MetaEnsemble
    }

    async fn initialize(&self, ctx: &BackendContext<'_>) -> Result<()> {
        self.model
            .get_or_try_init(|| async {
                let sources = Sources::from_context(ctx)?;
                let artifact = ctx.artifact.ok_or_else(|| {
                    SuggestError::SuggestionFailed(format!("project '{}' is not trained", ctx.project_id))
                })?;
                let weights = MetaWeights::from_artifact(artifact)?;
                if !weights.matches(&sources) {
                    return Err(SuggestError::Configuration(format!(
                        "model of '{}' was trained for sources {:?}; retrain it",
                        ctx.project_id, weights.sources
                    )));
                }
                debug!(project_id = ctx.project_id, weights = ?weights.weights, bias = weights.bias, "meta model loaded");
                Ok::<_, SuggestError>(MetaModel { sources, weights })
            })
            .await?;
        Ok(())
    }

    async fn train(&self, corpus: &dyn Corpus, ctx: &BackendContext<'_>) -> Result<ModelArtifact> {
        ensure_trainable(corpus, &ctx.subjects, ctx.project_id)?;
        let params = MetaParams::from_params(ctx.params)?;
        let sources = Sources::from_context(ctx)?;
        let examples = gather(&sources, corpus, sources.target()).await?;
        let mut weights = MetaWeights::initial(&sources);
        weights.fit(&examples, params.epochs, params.learning_rate);
        info!(project_id = ctx.project_id, examples = examples.len(), "meta model trained");
        Ok(weights.to_artifact(examples.len()))
    }

    async fn suggest(&self, text: &str) -> Result<ScoreVector> {
        let model = self.model.get().ok_or_else(|| not_initialized(self.kind()))?;
        let vectors = model.sources.collect(text).await?;
        Ok(model.score(&vectors))
    }

    async fn suggest_batch(&self, texts: &[String], max_batch_size: usize) -> Result<Vec<ScoreVector>> {
        check_batch_size(texts.len(), max_batch_size)?;
        let model = self.model.get().ok_or_else(|| not_initialized(self.kind()))?;
        let per_source = model.sources.collect_batch(texts, max_batch_size).await?;
        Ok((0..texts.len())
            .map(|i| {
                let vectors: Vec<Option<ScoreVector>> = per_source
                    .iter()
                    .map(|batch| batch.as_ref().map(|b| b[i].clone()))
                    .collect();
                model.score(&vectors)
            })
            .collect())
    }

    async fn learn(&self, corpus: &dyn Corpus, ctx: &BackendContext<'_>) -> Result<ModelArtifact> {
        let params = MetaParams::from_params(ctx.params)?;
        let sources = Sources::from_context(ctx)?;
        let mut weights = match ctx.artifact.map(MetaWeights::from_artifact).transpose()? {
            Some(w) if w.matches(&sources) => w,
            _ => MetaWeights::initial(&sources),
        };
        let examples = gather(&sources, corpus, sources.target()).await?;
        if examples.is_empty() {
            return Err(SuggestError::training(
                ctx.project_id,
                "learn corpus has no resolvable subject",
            ));
        }
        weights.fit(&examples, params.learn_epochs, params.learning_rate);
        info!(project_id = ctx.project_id, examples = examples.len(), "meta model updated");
        Ok(weights.to_artifact(examples.len()))
    }
}
