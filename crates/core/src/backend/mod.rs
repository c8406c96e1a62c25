//! The uniform backend contract and the registration table that maps a
//! configured backend name onto a concrete implementation.

use crate::analyzer::Analyzer;
use crate::corpus::Corpus;
use crate::error::{Result, SuggestError};
use crate::registry::ProjectRegistry;
use crate::store::ModelArtifact;
use crate::suggestion::ScoreVector;
use crate::vocab::SubjectIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod dummy;
pub mod ensemble;
pub mod http;
pub mod label;
pub mod meta;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 32;

/// Everything a backend may look at while initializing, training or learning.
pub struct BackendContext<'a> {
    pub project_id: &'a str,
    pub language: &'a str,
    pub params: &'a BTreeMap<String, String>,
    pub subjects: Arc<SubjectIndex>,
    pub analyzer: Arc<dyn Analyzer>,
    /// The currently persisted model, if any.
    pub artifact: Option<&'a ModelArtifact>,
    pub registry: &'a ProjectRegistry,
}

impl BackendContext<'_> {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn param_f32(&self, key: &str, default: f32) -> Result<f32> {
        param_f32(self.params, key, default)
    }

    pub fn param_usize(&self, key: &str, default: usize) -> Result<usize> {
        param_usize(self.params, key, default)
    }
}

pub fn param_f32(params: &BTreeMap<String, String>, key: &str, default: f32) -> Result<f32> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                SuggestError::Configuration(format!("parameter {key} must be a number, got '{raw}'"))
            }),
    }
}

pub fn param_usize(params: &BTreeMap<String, String>, key: &str, default: usize) -> Result<usize> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            SuggestError::Configuration(format!(
                "parameter {key} must be a non-negative integer, got '{raw}'"
            ))
        }),
    }
}

/// A classifier family. Instances are cheap to create; `initialize` loads
/// whatever state `suggest` needs and is a no-op once done. Training and
/// learning never mutate the instance: they return a new artifact that the
/// owning project publishes through a fresh instance.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn initialize(&self, ctx: &BackendContext<'_>) -> Result<()>;

    async fn train(&self, _corpus: &dyn Corpus, _ctx: &BackendContext<'_>) -> Result<ModelArtifact> {
        Err(SuggestError::unsupported(self.kind().name(), "train"))
    }

    async fn suggest(&self, text: &str) -> Result<ScoreVector>;

    /// Scores several documents; the output order matches `texts`.
    async fn suggest_batch(&self, texts: &[String], max_batch_size: usize) -> Result<Vec<ScoreVector>> {
        check_batch_size(texts.len(), max_batch_size)?;
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.suggest(text).await?);
        }
        Ok(out)
    }

    async fn learn(&self, _corpus: &dyn Corpus, _ctx: &BackendContext<'_>) -> Result<ModelArtifact> {
        Err(SuggestError::unsupported(self.kind().name(), "learn"))
    }
}

pub fn check_batch_size(size: usize, max: usize) -> Result<()> {
    if size > max {
        return Err(SuggestError::BatchTooLarge { size, max });
    }
    Ok(())
}

pub(crate) fn not_initialized(kind: BackendKind) -> SuggestError {
    SuggestError::SuggestionFailed(format!("{} backend is not initialized", kind.name()))
}

/// Fails unless the corpus has documents and at least one of their gold
/// subjects resolves against `subjects`.
pub(crate) fn ensure_trainable(
    corpus: &dyn Corpus,
    subjects: &SubjectIndex,
    project_id: &str,
) -> Result<()> {
    let mut seen_any = false;
    for doc in corpus.documents() {
        seen_any = true;
        if !doc.positions(subjects).is_empty() {
            return Ok(());
        }
    }
    if !seen_any {
        return Err(SuggestError::training(project_id, "corpus is empty"));
    }
    Err(SuggestError::training(
        project_id,
        "no subject in the corpus resolves against the vocabulary",
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Dummy,
    Label,
    Http,
    Ensemble,
    MetaEnsemble,
}

const BACKENDS: &[(&str, BackendKind)] = &[
    ("dummy", BackendKind::Dummy),
    ("label", BackendKind::Label),
    ("http", BackendKind::Http),
    ("ensemble", BackendKind::Ensemble),
    ("meta_ensemble", BackendKind::MetaEnsemble),
];

impl BackendKind {
    pub fn from_name(name: &str) -> Result<Self> {
        BACKENDS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| SuggestError::Configuration(format!("unknown backend '{name}'")))
    }

    pub fn name(self) -> &'static str {
        BACKENDS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown")
    }

    pub fn available() -> impl Iterator<Item = &'static str> {
        BACKENDS.iter().map(|(n, _)| *n)
    }

    /// Backends that combine other projects and carry a `sources` parameter.
    pub fn is_ensemble(self) -> bool {
        matches!(self, Self::Ensemble | Self::MetaEnsemble)
    }

    /// Backends that accept `train` and persist a model.
    pub fn is_trainable(self) -> bool {
        matches!(self, Self::Dummy | Self::MetaEnsemble)
    }

    /// Backends that cannot suggest anything without a trained model.
    pub fn requires_model(self) -> bool {
        matches!(self, Self::MetaEnsemble)
    }

    pub fn create(self) -> Arc<dyn Backend> {
        match self {
            Self::Dummy => Arc::new(dummy::DummyBackend::default()),
            Self::Label => Arc::new(label::LabelBackend::default()),
            Self::Http => Arc::new(http::HttpBackend::default()),
            Self::Ensemble => Arc::new(ensemble::EnsembleBackend::default()),
            Self::MetaEnsemble => Arc::new(meta::MetaEnsembleBackend::default()),
        }
    }

    /// Configuration-time parameter checks.
    pub fn validate_params(self, params: &BTreeMap<String, String>) -> Result<()> {
        match self {
            Self::Dummy => Ok(()),
            Self::Label => param_f32(params, "min_score", label::DEFAULT_MIN_SCORE).map(|_| ()),
            Self::Http => match params.get("endpoint") {
                Some(endpoint) if !endpoint.trim().is_empty() => {
                    param_usize(params, "limit", http::DEFAULT_REMOTE_LIMIT).map(|_| ())
                }
                _ => Err(SuggestError::Configuration(
                    "http backend needs an endpoint parameter".into(),
                )),
            },
            Self::Ensemble => ensemble::sources_param(params).map(|_| ()),
            Self::MetaEnsemble => {
                ensemble::sources_param(params)?;
                meta::MetaParams::from_params(params).map(|_| ())
            }
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Document, DocumentList};
    use crate::vocab::Subject;

    #[test]
    fn registration_table_round_trips_names() {
        for name in BackendKind::available() {
            let kind = BackendKind::from_name(name).unwrap();
            assert_eq!(kind.name(), name);
            assert_eq!(kind.create().kind(), kind);
        }
        assert!(matches!(
            BackendKind::from_name("fasttext"),
            Err(SuggestError::Configuration(_))
        ));
    }

    #[test]
    fn params_are_checked_per_backend() {
        let mut params = BTreeMap::new();
        assert!(BackendKind::Http.validate_params(&params).is_err());
        assert!(BackendKind::Ensemble.validate_params(&params).is_err());
        assert!(BackendKind::Dummy.validate_params(&params).is_ok());

        params.insert("endpoint".to_string(), "http://localhost/suggest".to_string());
        assert!(BackendKind::Http.validate_params(&params).is_ok());

        params.insert("min_score".to_string(), "high".to_string());
        assert!(BackendKind::Label.validate_params(&params).is_err());
    }

    #[test]
    fn trainability_requires_resolvable_gold_subjects() {
        let index = SubjectIndex::from_subjects(vec![Subject::new("http://example.org/a", "en", "A")]).unwrap();

        let empty = DocumentList::default();
        let err = ensure_trainable(&empty, &index, "p").unwrap_err();
        assert!(err.to_string().contains("corpus is empty"));

        let unresolved = DocumentList::new(vec![Document::new("text", ["http://example.org/zzz"])]);
        assert!(matches!(
            ensure_trainable(&unresolved, &index, "p"),
            Err(SuggestError::TrainingFailed { .. })
        ));

        let ok = DocumentList::new(vec![Document::new("text", ["http://example.org/a"])]);
        assert!(ensure_trainable(&ok, &index, "p").is_ok());
    }

    #[test]
    fn batch_size_limit_is_inclusive() {
        assert!(check_batch_size(32, 32).is_ok());
        assert!(matches!(
            check_batch_size(33, 32),
            Err(SuggestError::BatchTooLarge { size: 33, max: 32 })
        ));
    }
}
