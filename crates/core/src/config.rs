use crate::analyzer;
use crate::backend::{ensemble, BackendKind, DEFAULT_MAX_BATCH_SIZE};
use crate::error::{Result, SuggestError};
use crate::suggestion::SuggestParams;
use crate::transform::TransformChain;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const ENV_PREFIX: &str = "SUBJECT_INDEXER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// A file path or a `sqlite:` URL.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/subject-indexer.db".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_limit() -> usize {
    10
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            threshold: 0.0,
            max_batch_size: default_max_batch_size(),
            timeout_ms: None,
        }
    }
}

impl SuggestConfig {
    pub fn params(&self) -> SuggestParams {
        SuggestParams {
            limit: self.limit,
            threshold: self.threshold,
            timeout: self.timeout_ms.map(Duration::from_millis),
            ..SuggestParams::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub language: String,
    pub backend: String,
    pub vocab: String,
    #[serde(default = "default_analyzer")]
    pub analyzer: String,
    /// Input transforms, e.g. `limit(5000)`.
    #[serde(default = "default_transform")]
    pub transform: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_analyzer() -> String {
    "simple".into()
}

fn default_transform() -> String {
    "pass".into()
}

impl ProjectConfig {
    pub fn new(language: &str, backend: &str, vocab: &str) -> Self {
        Self {
            name: None,
            language: language.into(),
            backend: backend.into(),
            vocab: vocab.into(),
            analyzer: default_analyzer(),
            transform: default_transform(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Source project ids for ensemble backends, empty for everything else.
    pub fn source_ids(&self) -> Result<Vec<String>> {
        let kind = BackendKind::from_name(&self.backend)?;
        if !kind.is_ensemble() {
            return Ok(Vec::new());
        }
        Ok(ensemble::sources_param(&self.params)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }
}

pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl AppConfig {
    pub fn with_project(mut self, id: &str, project: ProjectConfig) -> Self {
        self.projects.insert(id.to_string(), project);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.suggest.max_batch_size == 0 {
            return Err(SuggestError::Configuration(
                "suggest.max_batch_size must be at least 1".into(),
            ));
        }
        self.suggest
            .params()
            .validate()
            .map_err(|e| SuggestError::Configuration(e.to_string()))?;

        for (id, project) in &self.projects {
            if !is_valid_id(id) {
                return Err(SuggestError::Configuration(format!(
                    "invalid project id '{id}'"
                )));
            }
            if !is_valid_id(&project.vocab) {
                return Err(SuggestError::Configuration(format!(
                    "project '{id}': invalid vocabulary id '{}'",
                    project.vocab
                )));
            }
            if project.language.trim().is_empty() {
                return Err(SuggestError::Configuration(format!(
                    "project '{id}' has no language"
                )));
            }
            let kind = BackendKind::from_name(&project.backend)
                .map_err(|e| SuggestError::Configuration(format!("project '{id}': {e}")))?;
            kind.validate_params(&project.params)
                .map_err(|e| SuggestError::Configuration(format!("project '{id}': {e}")))?;
            analyzer::get_analyzer(&project.analyzer)
                .map_err(|e| SuggestError::Configuration(format!("project '{id}': {e}")))?;
            TransformChain::parse(&project.transform)
                .map_err(|e| SuggestError::Configuration(format!("project '{id}': {e}")))?;
            for source in project.source_ids()? {
                if !self.projects.contains_key(&source) {
                    return Err(SuggestError::Configuration(format!(
                        "project '{id}' uses unknown source '{source}'"
                    )));
                }
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            id: &'a str,
            graph: &HashMap<&'a str, Vec<String>>,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<()> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    path.push(id);
                    return Err(SuggestError::Configuration(format!(
                        "ensemble cycle: {}",
                        path.join(" -> ")
                    )));
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            path.push(id);
            for source in graph.get(id).into_iter().flatten() {
                if let Some((&source_id, _)) = graph.get_key_value(source.as_str()) {
                    visit(source_id, graph, marks, path)?;
                }
            }
            marks.insert(id, Mark::Done);
            path.pop();
            Ok(())
        }

        let mut graph = HashMap::new();
        for (id, project) in &self.projects {
            graph.insert(id.as_str(), project.source_ids()?);
        }
        let mut marks = HashMap::new();
        for id in self.projects.keys() {
            visit(id.as_str(), &graph, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }
}

fn config_error(err: config::ConfigError) -> SuggestError {
    SuggestError::Configuration(err.to_string())
}

fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<AppConfig> {
    let cfg = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(config_error)?;
    let app: AppConfig = cfg.try_deserialize().map_err(config_error)?;
    app.validate()?;
    Ok(app)
}

pub fn load(path: Option<&str>) -> Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    build(settings)
}

pub fn from_toml_str(toml: &str) -> Result<AppConfig> {
    build(config::Config::builder().add_source(config::File::from_str(toml, config::FileFormat::Toml)))
}
