//! A project binds one vocabulary, one language, one analyzer and one backend.
//!
//! The initialized backend is published through an atomically swappable slot.
//! Suggestion calls load the slot without locking; train and learn build a
//! fresh backend on the side and swap it in only after the new model has been
//! persisted, so a failed run leaves the published state untouched.

use crate::analyzer::{self, Analyzer};
use crate::backend::{check_batch_size, Backend, BackendContext, BackendKind};
use crate::config::ProjectConfig;
use crate::corpus::Corpus;
use crate::error::{Result, SuggestError};
use crate::registry::ProjectRegistry;
use crate::store::{ModelArtifact, Store};
use crate::transform::{TransformChain, TransformedCorpus};
use crate::suggestion::{
    filter_suggestions, BatchDocument, BatchResult, ScoreVector, SuggestParams,
    SuggestionResultList,
};
use crate::vocab::{SubjectIndex, Vocabulary};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectInfo {
    pub project_id: String,
    pub name: String,
    pub language: String,
    pub backend: String,
    pub vocab: String,
    pub is_trained: bool,
    pub modification_time: Option<DateTime<Utc>>,
}

/// An initialized backend together with the vocabulary snapshot it was
/// initialized against.
pub struct Published {
    pub backend: Arc<dyn Backend>,
    pub subjects: Arc<SubjectIndex>,
}

pub struct Project {
    project_id: String,
    config: ProjectConfig,
    kind: BackendKind,
    analyzer: Arc<dyn Analyzer>,
    transform: TransformChain,
    vocab: Arc<Vocabulary>,
    store: Store,
    max_batch_size: usize,
    published: ArcSwapOption<Published>,
    init_lock: Mutex<()>,
    train_lock: Mutex<()>,
}

impl Project {
    pub fn new(
        project_id: impl Into<String>,
        config: ProjectConfig,
        vocab: Arc<Vocabulary>,
        store: Store,
        max_batch_size: usize,
    ) -> Result<Self> {
        let kind = BackendKind::from_name(&config.backend)?;
        let analyzer = analyzer::get_analyzer(&config.analyzer)?;
        let transform = TransformChain::parse(&config.transform)?;
        Ok(Self {
            project_id: project_id.into(),
            config,
            kind,
            analyzer,
            transform,
            vocab,
            store,
            max_batch_size,
            published: ArcSwapOption::empty(),
            init_lock: Mutex::new(()),
            train_lock: Mutex::new(()),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn language(&self) -> &str {
        &self.config.language
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn vocab_id(&self) -> &str {
        self.vocab.vocab_id()
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    fn context<'a>(
        &'a self,
        registry: &'a ProjectRegistry,
        subjects: Arc<SubjectIndex>,
        artifact: Option<&'a ModelArtifact>,
    ) -> BackendContext<'a> {
        BackendContext {
            project_id: &self.project_id,
            language: &self.config.language,
            params: &self.config.params,
            subjects,
            analyzer: self.analyzer.clone(),
            artifact,
            registry,
        }
    }

    /// The persisted model, ignoring one left behind by another backend.
    async fn stored_model(&self) -> Result<Option<ModelArtifact>> {
        match self.store.load_model(&self.project_id).await? {
            Some(artifact) if artifact.backend != self.kind.name() => {
                warn!(
                    project_id = %self.project_id,
                    stored = %artifact.backend,
                    configured = %self.kind,
                    "ignoring model trained by another backend"
                );
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn build(
        &self,
        registry: &ProjectRegistry,
        subjects: Arc<SubjectIndex>,
        artifact: Option<&ModelArtifact>,
    ) -> Result<Arc<Published>> {
        let backend = self.kind.create();
        let ctx = self.context(registry, subjects.clone(), artifact);
        backend.initialize(&ctx).await?;
        Ok(Arc::new(Published { backend, subjects }))
    }

    /// The published backend, initialized from the stored model on first use.
    /// Publishing, invalidation and lazy initialization all hold `init_lock`,
    /// so an initialization that raced a reload can never outlive it.
    pub async fn backend(&self, registry: &ProjectRegistry) -> Result<Arc<Published>> {
        if let Some(published) = self.published.load_full() {
            return Ok(published);
        }
        let _guard = self.init_lock.lock().await;
        if let Some(published) = self.published.load_full() {
            return Ok(published);
        }
        loop {
            let subjects = self.vocab.subjects().await?;
            let artifact = self.stored_model().await?;
            if self.kind.requires_model() && artifact.is_none() {
                return Err(SuggestError::SuggestionFailed(format!(
                    "project '{}' is not trained",
                    self.project_id
                )));
            }
            let published = self.build(registry, subjects.clone(), artifact.as_ref()).await?;
            if self.is_current(&subjects).await? {
                debug!(project_id = %self.project_id, backend = %self.kind, "backend initialized");
                self.published.store(Some(published.clone()));
                return Ok(published);
            }
            debug!(project_id = %self.project_id, "vocabulary reloaded during initialization, retrying");
        }
    }

    async fn is_current(&self, subjects: &Arc<SubjectIndex>) -> Result<bool> {
        Ok(Arc::ptr_eq(&self.vocab.subjects().await?, subjects))
    }

    /// Drops the published backend; the next call re-initializes it.
    pub async fn invalidate(&self) {
        let _guard = self.init_lock.lock().await;
        if self.published.swap(None).is_some() {
            debug!(project_id = %self.project_id, "backend invalidated");
        }
    }

    /// The text a backend sees after the project's input transforms.
    fn transform_text<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.transform.apply(text)
    }

    /// Raw scores together with the vocabulary snapshot they refer to.
    pub async fn suggest_scores(
        &self,
        registry: &ProjectRegistry,
        text: &str,
    ) -> Result<(ScoreVector, Arc<SubjectIndex>)> {
        let published = self.backend(registry).await?;
        let scores = published.backend.suggest(&self.transform_text(text)).await?;
        Ok((scores, published.subjects.clone()))
    }

    pub async fn suggest_scores_batch(
        &self,
        registry: &ProjectRegistry,
        texts: &[String],
        max_batch_size: usize,
    ) -> Result<(Vec<ScoreVector>, Arc<SubjectIndex>)> {
        let max = max_batch_size.min(self.max_batch_size);
        check_batch_size(texts.len(), max)?;
        let published = self.backend(registry).await?;
        let scores = if self.transform.is_identity() {
            published.backend.suggest_batch(texts, max).await?
        } else {
            let texts: Vec<String> = texts
                .iter()
                .map(|t| self.transform_text(t).into_owned())
                .collect();
            published.backend.suggest_batch(&texts, max).await?
        };
        Ok((scores, published.subjects.clone()))
    }

    pub async fn suggest(
        &self,
        registry: &ProjectRegistry,
        text: &str,
        params: &SuggestParams,
    ) -> Result<SuggestionResultList> {
        params.validate()?;
        let (scores, subjects) = self.suggest_scores(registry, text).await?;
        Ok(filter_suggestions(&scores, &subjects, params, self.language()))
    }

    pub async fn suggest_batch(
        &self,
        registry: &ProjectRegistry,
        documents: &[BatchDocument],
        params: &SuggestParams,
    ) -> Result<Vec<BatchResult>> {
        check_batch_size(documents.len(), self.max_batch_size)?;
        params.validate()?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let (vectors, subjects) = self
            .suggest_scores_batch(registry, &texts, self.max_batch_size)
            .await?;
        if vectors.len() != documents.len() {
            return Err(SuggestError::SuggestionFailed(format!(
                "backend returned {} results for {} documents",
                vectors.len(),
                documents.len()
            )));
        }
        Ok(documents
            .iter()
            .zip(vectors)
            .map(|(doc, scores)| BatchResult {
                document_id: doc.document_id.clone(),
                results: filter_suggestions(&scores, &subjects, params, self.language()),
            })
            .collect())
    }

    fn training_error(&self, err: SuggestError) -> SuggestError {
        match err {
            SuggestError::TrainingFailed { .. }
            | SuggestError::UnsupportedOperation { .. }
            | SuggestError::VocabularyNotFound(_)
            | SuggestError::Configuration(_) => err,
            other => SuggestError::training(&self.project_id, other.to_string()),
        }
    }

    /// Persists `artifact` and swaps in a backend built from it. When the
    /// vocabulary moved on while training ran, the slot is cleared instead and
    /// the next call rebuilds from the stored model.
    async fn publish(
        &self,
        registry: &ProjectRegistry,
        subjects: Arc<SubjectIndex>,
        artifact: &ModelArtifact,
    ) -> Result<()> {
        self.store.save_model(&self.project_id, artifact).await?;
        let built = self.build(registry, subjects.clone(), Some(artifact)).await;
        let _guard = self.init_lock.lock().await;
        let current = self.is_current(&subjects).await.unwrap_or(false);
        match built {
            Ok(published) if current => {
                self.published.store(Some(published));
            }
            Ok(_) => {
                debug!(project_id = %self.project_id, "vocabulary reloaded during training");
                self.published.store(None);
            }
            Err(err) => {
                warn!(project_id = %self.project_id, %err, "new model stored but not loaded");
                self.published.store(None);
            }
        }
        Ok(())
    }

    pub async fn train(&self, registry: &ProjectRegistry, corpus: &dyn Corpus) -> Result<ModelArtifact> {
        let _guard = self.train_lock.lock().await;
        let subjects = self.vocab.subjects().await?;
        let fresh = self.kind.create();
        let ctx = self.context(registry, subjects.clone(), None);
        let corpus = TransformedCorpus::new(corpus, &self.transform);
        let artifact = fresh
            .train(&corpus, &ctx)
            .await
            .map_err(|e| self.training_error(e))?;
        self.publish(registry, subjects, &artifact).await?;
        info!(project_id = %self.project_id, backend = %self.kind, "project trained");
        Ok(artifact)
    }

    pub async fn learn(&self, registry: &ProjectRegistry, corpus: &dyn Corpus) -> Result<ModelArtifact> {
        let _guard = self.train_lock.lock().await;
        let subjects = self.vocab.subjects().await?;
        let current = self.stored_model().await?;
        let fresh = self.kind.create();
        let ctx = self.context(registry, subjects.clone(), current.as_ref());
        let corpus = TransformedCorpus::new(corpus, &self.transform);
        let artifact = fresh
            .learn(&corpus, &ctx)
            .await
            .map_err(|e| self.training_error(e))?;
        self.publish(registry, subjects, &artifact).await?;
        info!(project_id = %self.project_id, backend = %self.kind, "project learned");
        Ok(artifact)
    }

    pub async fn modification_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.model_trained_at(&self.project_id).await
    }

    /// Non-trainable backends have nothing to train and always count as trained.
    pub async fn is_trained(&self) -> Result<bool> {
        if !self.kind.is_trainable() {
            return Ok(true);
        }
        Ok(self.stored_model().await?.is_some())
    }

    pub async fn dump(&self) -> Result<ProjectInfo> {
        Ok(ProjectInfo {
            project_id: self.project_id.clone(),
            name: self
                .config
                .name
                .clone()
                .unwrap_or_else(|| self.project_id.clone()),
            language: self.config.language.clone(),
            backend: self.kind.name().to_string(),
            vocab: self.vocab_id().to_string(),
            is_trained: self.is_trained().await?,
            modification_time: self.modification_time().await?,
        })
    }
}
