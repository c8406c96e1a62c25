//! The project registry: an explicit, cheaply clonable handle that owns the
//! project and vocabulary caches of one serving process.

use crate::config::{is_valid_id, AppConfig};
use crate::corpus::{Corpus, Document};
use crate::error::{Result, SuggestError};
use crate::eval::{EvaluationBatch, EvaluationResults};
use crate::project::{Project, ProjectInfo};
use crate::store::{ModelArtifact, Store};
use crate::suggestion::{BatchDocument, BatchResult, SuggestParams, SuggestionResultList};
use crate::vocab::{LoadSummary, Subject, Vocabulary, VocabularyInfo};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{info, warn};

struct RegistryInner {
    config: AppConfig,
    store: Store,
    projects: RwLock<HashMap<String, Arc<Project>>>,
    vocabs: RwLock<HashMap<String, Arc<Vocabulary>>>,
}

#[derive(Clone)]
pub struct ProjectRegistry {
    inner: Arc<RegistryInner>,
}

/// A non-owning registry handle, held by backends that call back into it.
#[derive(Clone)]
pub struct WeakRegistry(Weak<RegistryInner>);

impl WeakRegistry {
    pub fn upgrade(&self) -> Option<ProjectRegistry> {
        self.0.upgrade().map(|inner| ProjectRegistry { inner })
    }
}

/// Outcome of one learn operation inside `learn_many`.
#[derive(Debug)]
pub struct LearnOutcome {
    pub project_id: String,
    pub result: Result<ModelArtifact>,
}

impl LearnOutcome {
    pub fn skipped(&self) -> bool {
        matches!(&self.result, Err(e) if e.is_unsupported())
    }
}

impl ProjectRegistry {
    /// Validates the configuration; nothing is loaded until first use.
    pub fn new(config: AppConfig, store: Store) -> Result<Self> {
        config.validate()?;
        info!(projects = config.projects.len(), "project registry ready");
        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                store,
                projects: RwLock::new(HashMap::new()),
                vocabs: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Opens the configured database, then builds the registry.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let store = Store::open(&config.database.path).await?;
        Self::new(config, store)
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Request defaults from the `suggest` configuration section.
    pub fn default_params(&self) -> SuggestParams {
        self.inner.config.suggest.params()
    }

    pub async fn vocabulary(&self, vocab_id: &str) -> Result<Arc<Vocabulary>> {
        if !is_valid_id(vocab_id) {
            return Err(SuggestError::Configuration(format!(
                "invalid vocabulary id '{vocab_id}'"
            )));
        }
        if let Some(vocab) = self.inner.vocabs.read().await.get(vocab_id) {
            return Ok(vocab.clone());
        }
        let mut vocabs = self.inner.vocabs.write().await;
        Ok(vocabs
            .entry(vocab_id.to_string())
            .or_insert_with(|| Arc::new(Vocabulary::new(vocab_id, self.inner.store.clone())))
            .clone())
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Arc<Project>> {
        if let Some(project) = self.inner.projects.read().await.get(project_id) {
            return Ok(project.clone());
        }
        let config = self
            .inner
            .config
            .projects
            .get(project_id)
            .ok_or_else(|| SuggestError::ProjectNotFound(project_id.to_string()))?;
        let vocab = self.vocabulary(&config.vocab).await?;
        let mut projects = self.inner.projects.write().await;
        if let Some(project) = projects.get(project_id) {
            return Ok(project.clone());
        }
        let project = Arc::new(Project::new(
            project_id,
            config.clone(),
            vocab,
            self.inner.store.clone(),
            self.inner.config.suggest.max_batch_size,
        )?);
        projects.insert(project_id.to_string(), project.clone());
        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        let mut out = Vec::with_capacity(self.inner.config.projects.len());
        for project_id in self.inner.config.projects.keys() {
            out.push(self.show_project(project_id).await?);
        }
        Ok(out)
    }

    pub async fn show_project(&self, project_id: &str) -> Result<ProjectInfo> {
        self.get_project(project_id).await?.dump().await
    }

    /// Every vocabulary that is configured or has a stored snapshot, by id.
    pub async fn list_vocabs(&self) -> Result<Vec<VocabularyInfo>> {
        let mut ids: BTreeSet<String> = self.inner.store.vocab_ids().await?.into_iter().collect();
        ids.extend(self.inner.config.projects.values().map(|p| p.vocab.clone()));
        let mut out = Vec::with_capacity(ids.len());
        for vocab_id in &ids {
            out.push(self.vocabulary(vocab_id).await?.dump().await);
        }
        Ok(out)
    }

    fn dependents<'a>(&'a self, vocab_id: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.inner
            .config
            .projects
            .iter()
            .filter(move |(_, p)| p.vocab == vocab_id)
            .map(|(id, _)| id)
    }

    /// Loads a subject source into a vocabulary. Every project on that
    /// vocabulary is invalidated; a forced rebuild also discards their models
    /// since positions are no longer stable.
    pub async fn load_vocab(&self, vocab_id: &str, subjects: Vec<Subject>, force: bool) -> Result<LoadSummary> {
        let vocab = self.vocabulary(vocab_id).await?;
        let summary = vocab.load(subjects, force).await?;
        for project_id in self.dependents(vocab_id) {
            if force {
                self.inner.store.delete_model(project_id).await?;
            }
            self.invalidate(project_id).await;
        }
        Ok(summary)
    }

    pub async fn remove_vocab(&self, vocab_id: &str) -> Result<bool> {
        let vocab = self.vocabulary(vocab_id).await?;
        let removed = vocab.remove().await?;
        for project_id in self.dependents(vocab_id) {
            self.inner.store.delete_model(project_id).await?;
            self.invalidate(project_id).await;
        }
        if removed {
            info!(%vocab_id, "vocabulary removed");
        }
        Ok(removed)
    }

    async fn bounded<T>(&self, params: &SuggestParams, call: impl Future<Output = Result<T>>) -> Result<T> {
        match params.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                SuggestError::Unavailable(format!("suggestion timed out after {limit:?}"))
            })?,
            None => call.await,
        }
    }

    pub async fn suggest(&self, project_id: &str, text: &str, params: &SuggestParams) -> Result<SuggestionResultList> {
        let project = self.get_project(project_id).await?;
        self.bounded(params, project.suggest(self, text, params)).await
    }

    pub async fn suggest_batch(
        &self,
        project_id: &str,
        documents: &[BatchDocument],
        params: &SuggestParams,
    ) -> Result<Vec<BatchResult>> {
        let project = self.get_project(project_id).await?;
        self.bounded(params, project.suggest_batch(self, documents, params))
            .await
    }

    /// Suggests for every corpus document that has gold subjects and scores
    /// the results against them, in batches of `suggest.max_batch_size`.
    pub async fn evaluate(
        &self,
        project_id: &str,
        corpus: &dyn Corpus,
        params: &SuggestParams,
    ) -> Result<EvaluationResults> {
        let project = self.get_project(project_id).await?;
        let chunk = self.inner.config.suggest.max_batch_size;
        let mut batch = EvaluationBatch::new();
        let mut pending = Vec::with_capacity(chunk);
        let mut skipped = 0usize;
        for doc in corpus.documents() {
            if doc.subjects.is_empty() {
                skipped += 1;
                continue;
            }
            pending.push(doc);
            if pending.len() == chunk {
                self.evaluate_chunk(&project, &mut pending, params, &mut batch)
                    .await?;
            }
        }
        if !pending.is_empty() {
            self.evaluate_chunk(&project, &mut pending, params, &mut batch)
                .await?;
        }
        info!(%project_id, documents = batch.len(), skipped, "evaluation finished");
        Ok(batch.results())
    }

    async fn evaluate_chunk(
        &self,
        project: &Project,
        pending: &mut Vec<Document>,
        params: &SuggestParams,
        batch: &mut EvaluationBatch,
    ) -> Result<()> {
        let documents: Vec<BatchDocument> = pending
            .iter()
            .map(|doc| BatchDocument::new(doc.text.clone()))
            .collect();
        let results = self
            .bounded(params, project.suggest_batch(self, &documents, params))
            .await?;
        for (doc, result) in pending.drain(..).zip(results) {
            batch.evaluate(&result.results, &doc.subjects);
        }
        Ok(())
    }

    pub async fn train(&self, project_id: &str, corpus: &dyn Corpus) -> Result<ModelArtifact> {
        self.get_project(project_id).await?.train(self, corpus).await
    }

    pub async fn learn(&self, project_id: &str, corpus: &dyn Corpus) -> Result<ModelArtifact> {
        self.get_project(project_id).await?.learn(self, corpus).await
    }

    /// Runs several learn operations in order. A failing or unsupported
    /// project never stops the others.
    pub async fn learn_many(&self, jobs: &[(&str, &dyn Corpus)]) -> Vec<LearnOutcome> {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for (project_id, corpus) in jobs {
            let result = self.learn(project_id, *corpus).await;
            match &result {
                Ok(_) => {}
                Err(err) if err.is_unsupported() => {
                    info!(%project_id, %err, "learn skipped");
                }
                Err(err) => warn!(%project_id, %err, "learn failed"),
            }
            outcomes.push(LearnOutcome {
                project_id: project_id.to_string(),
                result,
            });
        }
        outcomes
    }

    pub async fn invalidate(&self, project_id: &str) {
        let project = self.inner.projects.read().await.get(project_id).cloned();
        if let Some(project) = project {
            project.invalidate().await;
        }
    }

    /// Eagerly initializes every project; returns how many are ready. Projects
    /// that cannot be initialized yet (e.g. untrained) are logged and skipped.
    pub async fn initialize_all(&self) -> Result<usize> {
        let mut ready = 0;
        for project_id in self.inner.config.projects.keys() {
            let project = self.get_project(project_id).await?;
            match project.backend(self).await {
                Ok(_) => ready += 1,
                Err(err) => warn!(%project_id, %err, "project not initialized"),
            }
        }
        info!(ready, total = self.inner.config.projects.len(), "projects initialized");
        Ok(ready)
    }

    /// Drops every cached project and vocabulary.
    pub async fn shutdown(&self) {
        self.inner.projects.write().await.clear();
        self.inner.vocabs.write().await.clear();
        info!("project registry shut down");
    }
}
