//! Weighted-average combination of source projects.
//!
//! Sources are resolved through the registry on every call, so a retrained
//! source is picked up without touching the ensemble. Each source vector is
//! carried onto the ensemble's vocabulary by URI: subjects the ensemble does
//! not know are dropped, subjects a source did not score count as zero.

use super::{check_batch_size, not_initialized, Backend, BackendContext, BackendKind};
use crate::error::{Result, SuggestError};
use crate::registry::WeakRegistry;
use crate::suggestion::ScoreVector;
use crate::vocab::SubjectIndex;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Parses `a:2,b` into `[("a", 2.0), ("b", 1.0)]`.
pub fn parse_sources(raw: &str) -> Result<Vec<(String, f32)>> {
    let mut sources = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, weight) = match part.split_once(':') {
            Some((id, w)) => {
                let weight = w
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|w| w.is_finite() && *w >= 0.0)
                    .ok_or_else(|| {
                        SuggestError::Configuration(format!("invalid weight in source '{part}'"))
                    })?;
                (id.trim(), weight)
            }
            None => (part, 1.0),
        };
        if id.is_empty() {
            return Err(SuggestError::Configuration(format!(
                "source '{part}' has no project id"
            )));
        }
        if sources.iter().any(|(s, _): &(String, f32)| s == id) {
            return Err(SuggestError::Configuration(format!("source '{id}' listed twice")));
        }
        sources.push((id.to_string(), weight));
    }
    if sources.is_empty() {
        return Err(SuggestError::Configuration("ensemble has no sources".into()));
    }
    if sources.iter().all(|(_, w)| *w == 0.0) {
        return Err(SuggestError::Configuration(
            "at least one source needs a positive weight".into(),
        ));
    }
    Ok(sources)
}

pub(crate) fn sources_param(params: &BTreeMap<String, String>) -> Result<Vec<(String, f32)>> {
    let raw = params.get("sources").ok_or_else(|| {
        SuggestError::Configuration("ensemble backends need a sources parameter".into())
    })?;
    parse_sources(raw)
}

/// Carries `scores` from `from` onto `to` by subject URI.
pub(crate) fn map_onto(scores: ScoreVector, from: &SubjectIndex, to: &SubjectIndex) -> ScoreVector {
    if std::ptr::eq(from, to) {
        return scores;
    }
    scores
        .iter()
        .filter_map(|(pos, score)| {
            let uri = &from.lookup_by_position(pos)?.uri;
            Some((to.lookup_by_uri(uri)?, score))
        })
        .collect()
}

/// The source projects of one ensemble instance.
pub(crate) struct Sources {
    project_id: String,
    registry: WeakRegistry,
    sources: Vec<(String, f32)>,
    target: Arc<SubjectIndex>,
}

impl Sources {
    pub(crate) fn from_context(ctx: &BackendContext<'_>) -> Result<Self> {
        Ok(Self {
            project_id: ctx.project_id.to_string(),
            registry: ctx.registry.downgrade(),
            sources: sources_param(ctx.params)?,
            target: ctx.subjects.clone(),
        })
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.sources.iter().map(|(id, _)| id.clone()).collect()
    }

    pub(crate) fn weights(&self) -> Vec<f32> {
        self.sources.iter().map(|(_, w)| *w).collect()
    }

    pub(crate) fn target(&self) -> &SubjectIndex {
        &self.target
    }

    fn absorb<T>(&self, results: Vec<Result<T>>) -> Result<Vec<Option<T>>> {
        let mut out = Vec::with_capacity(results.len());
        for ((source, _), result) in self.sources.iter().zip(results) {
            match result {
                Ok(v) => out.push(Some(v)),
                Err(err) => {
                    warn!(project_id = %self.project_id, %source, %err, "excluding ensemble source");
                    out.push(None);
                }
            }
        }
        if out.iter().all(Option::is_none) {
            return Err(SuggestError::SuggestionFailed(format!(
                "all sources of ensemble '{}' failed",
                self.project_id
            )));
        }
        Ok(out)
    }

    /// One vector per source in source order, `None` where the source failed.
    pub(crate) async fn collect(&self, text: &str) -> Result<Vec<Option<ScoreVector>>> {
        let registry = self.registry.upgrade().ok_or_else(|| {
            SuggestError::SuggestionFailed("project registry has shut down".into())
        })?;
        let calls = self.sources.iter().map(|(id, _)| {
            let registry = &registry;
            async move {
                let project = registry.get_project(id).await?;
                let (scores, index) = project.suggest_scores(registry, text).await?;
                Ok::<_, SuggestError>(map_onto(scores, &index, &self.target))
            }
        });
        let results = join_all(calls).await;
        self.absorb(results)
    }

    pub(crate) async fn collect_batch(
        &self,
        texts: &[String],
        max_batch_size: usize,
    ) -> Result<Vec<Option<Vec<ScoreVector>>>> {
        let registry = self.registry.upgrade().ok_or_else(|| {
            SuggestError::SuggestionFailed("project registry has shut down".into())
        })?;
        let calls = self.sources.iter().map(|(id, _)| {
            let registry = &registry;
            async move {
                let project = registry.get_project(id).await?;
                let (batch, index) = project
                    .suggest_scores_batch(registry, texts, max_batch_size)
                    .await?;
                if batch.len() != texts.len() {
                    return Err(SuggestError::SuggestionFailed(format!(
                        "source '{id}' returned {} vectors for {} documents",
                        batch.len(),
                        texts.len()
                    )));
                }
                Ok::<Vec<ScoreVector>, SuggestError>(
                    batch
                        .into_iter()
                        .map(|scores| map_onto(scores, &index, &self.target))
                        .collect(),
                )
            }
        });
        let results = join_all(calls).await;
        self.absorb(results)
    }
}

/// Weighted average over the sources that responded. Entries are ordered by
/// the first source that scored them, then by position.
pub fn combine_weighted(vectors: &[Option<ScoreVector>], weights: &[f32]) -> ScoreVector {
    let total: f32 = vectors
        .iter()
        .zip(weights)
        .filter(|(v, _)| v.is_some())
        .map(|(_, w)| *w)
        .sum();
    let mut combined = ScoreVector::new();
    if total <= 0.0 {
        return combined;
    }
    for (vector, weight) in vectors.iter().zip(weights) {
        let Some(vector) = vector else { continue };
        let mut entries: Vec<(usize, f32)> = vector.iter().collect();
        entries.sort_by_key(|(pos, _)| *pos);
        for (pos, score) in entries {
            combined.add(pos, weight * score / total);
        }
    }
    combined
}

#[derive(Default)]
pub struct EnsembleBackend {
    sources: OnceCell<Sources>,
}

#[async_trait]
impl Backend for EnsembleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ensemble
    }

    async fn initialize(&self, ctx: &BackendContext<'_>) -> Result<()> {
        self.sources
            .get_or_try_init(|| async { Sources::from_context(ctx) })
            .await?;
        Ok(())
    }

    async fn suggest(&self, text: &str) -> Result<ScoreVector> {
        let sources = self.sources.get().ok_or_else(|| not_initialized(self.kind()))?;
        let vectors = sources.collect(text).await?;
        let combined = combine_weighted(&vectors, &sources.weights());
        debug!(subjects = combined.len(), "ensemble combined");
        Ok(combined)
    }

    async fn suggest_batch(&self, texts: &[String], max_batch_size: usize) -> Result<Vec<ScoreVector>> {
        check_batch_size(texts.len(), max_batch_size)?;
        let sources = self.sources.get().ok_or_else(|| not_initialized(self.kind()))?;
        let per_source = sources.collect_batch(texts, max_batch_size).await?;
        let weights = sources.weights();
        Ok((0..texts.len())
            .map(|i| {
                let vectors: Vec<Option<ScoreVector>> = per_source
                    .iter()
                    .map(|batch| batch.as_ref().map(|b| b[i].clone()))
                    .collect();
                combine_weighted(&vectors, &weights)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Subject;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn parses_weighted_sources() {
        assert_eq!(
            parse_sources("tfidf:2, label").unwrap(),
            vec![("tfidf".to_string(), 2.0), ("label".to_string(), 1.0)]
        );
        assert!(parse_sources("").is_err());
        assert!(parse_sources("a:-1").is_err());
        assert!(parse_sources("a:x").is_err());
        assert!(parse_sources("a,a").is_err());
        assert!(parse_sources("a:0,b:0").is_err());
    }

    #[test]
    fn equal_weights_average_two_sources() {
        let a: ScoreVector = [(0, 0.8), (1, 0.2)].into_iter().collect();
        let b: ScoreVector = [(0, 0.4), (1, 0.6)].into_iter().collect();
        let combined = combine_weighted(&[Some(a), Some(b)], &[1.0, 1.0]);
        assert!(close(combined.get(0), 0.6));
        assert!(close(combined.get(1), 0.4));
    }

    #[test]
    fn failed_sources_drop_out_of_the_denominator() {
        let a: ScoreVector = [(0, 0.8)].into_iter().collect();
        let combined = combine_weighted(&[Some(a), None], &[1.0, 3.0]);
        assert!(close(combined.get(0), 0.8));
    }

    #[test]
    fn missing_subjects_count_as_zero() {
        let a: ScoreVector = [(0, 0.8)].into_iter().collect();
        let b: ScoreVector = [(1, 0.6)].into_iter().collect();
        let combined = combine_weighted(&[Some(a), Some(b)], &[3.0, 1.0]);
        assert!(close(combined.get(0), 0.6));
        assert!(close(combined.get(1), 0.15));
    }

    #[test]
    fn order_follows_first_source_then_position() {
        let a: ScoreVector = [(5, 0.5), (2, 0.5)].into_iter().collect();
        let b: ScoreVector = [(0, 0.5), (2, 0.5)].into_iter().collect();
        let combined = combine_weighted(&[Some(a), Some(b)], &[1.0, 1.0]);
        assert_eq!(combined.iter().map(|(p, _)| p).collect::<Vec<_>>(), vec![2, 5, 0]);
    }

    #[test]
    fn mapping_keeps_only_shared_uris() {
        let from = SubjectIndex::from_subjects(vec![
            Subject::new("http://example.org/a", "en", "A"),
            Subject::new("http://example.org/x", "en", "X"),
        ])
        .unwrap();
        let to = SubjectIndex::from_subjects(vec![
            Subject::new("http://example.org/b", "en", "B"),
            Subject::new("http://example.org/a", "en", "A"),
        ])
        .unwrap();
        let scores: ScoreVector = [(0, 0.9), (1, 0.7)].into_iter().collect();
        let mapped = map_onto(scores, &from, &to);
        assert_eq!(mapped.len(), 1);
        assert!(close(mapped.get(1), 0.9));
    }
}
