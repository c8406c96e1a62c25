use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use cli::{input, render};
use indexer_core::config;
use indexer_core::corpus::open_corpus;
use indexer_core::registry::ProjectRegistry;
use indexer_core::store::ModelArtifact;
use indexer_core::suggestion::SuggestParams;
use indexer_core::vocab::read_subject_file;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let registry = ProjectRegistry::open(cfg).await?;

    let outcome = run(&registry, cli.command).await;
    registry.shutdown().await;
    outcome
}

async fn run(registry: &ProjectRegistry, command: Commands) -> Result<()> {
    match command {
        Commands::ListProjects { json } => {
            let projects = registry.list_projects().await?;
            if json {
                print_json(&projects)?;
            } else {
                for info in &projects {
                    println!("{}", render::project_line(info));
                }
            }
        }
        Commands::ShowProject { project_id, json } => {
            let info = registry.show_project(&project_id).await?;
            if json {
                print_json(&info)?;
            } else {
                println!("{}", render::project_details(&info));
            }
        }
        Commands::ListVocabs { json } => {
            let vocabs = registry.list_vocabs().await?;
            if json {
                print_json(&vocabs)?;
            } else {
                for info in &vocabs {
                    println!("{}", render::vocab_line(info));
                }
            }
        }
        Commands::LoadVocab {
            vocab_id,
            file,
            language,
            force,
            json,
        } => {
            let subjects = read_subject_file(&file, &language)?;
            let summary = registry.load_vocab(&vocab_id, subjects, force).await?;
            if json {
                print_json(&summary)?;
            } else {
                println!("{}", render::load_summary(&vocab_id, &summary));
            }
        }
        Commands::Train {
            project_id,
            corpus,
            json,
        } => {
            info!(%project_id, corpus = %corpus.display(), "training");
            let corpus = open_corpus(&corpus)?;
            let artifact = registry.train(&project_id, corpus.as_ref()).await?;
            print_model(&project_id, &artifact, json)?;
        }
        Commands::Learn {
            project_id,
            corpus,
            json,
        } => {
            let corpus = open_corpus(&corpus)?;
            let artifact = registry.learn(&project_id, corpus.as_ref()).await?;
            print_model(&project_id, &artifact, json)?;
        }
        Commands::Suggest {
            project_id,
            text,
            request,
            json,
        } => {
            let text = input::text_or_read(text, std::io::stdin().lock())?;
            let params = request.apply(registry.default_params());
            let results = registry.suggest(&project_id, &text, &params).await?;
            if json {
                print_json(&results)?;
            } else {
                println!("{}", render::suggestions(&results));
            }
        }
        Commands::SuggestBatch {
            project_id,
            files,
            request,
            json,
        } => {
            if files.is_empty() {
                bail!("no input files given");
            }
            let documents = input::batch_documents(&files)?;
            debug!(documents = documents.len(), %project_id, "suggesting batch");
            let params = request.apply(registry.default_params());
            let results = registry
                .suggest_batch(&project_id, &documents, &params)
                .await?;
            if json {
                print_json(&results)?;
            } else {
                println!("{}", render::batch(&results));
            }
        }
        Commands::Eval {
            project_id,
            corpus,
            request,
            json,
        } => {
            info!(%project_id, corpus = %corpus.display(), "evaluating");
            let corpus = open_corpus(&corpus)?;
            let params = request.apply(registry.default_params());
            let results = registry
                .evaluate(&project_id, corpus.as_ref(), &params)
                .await?;
            if json {
                print_json(&results)?;
            } else {
                println!("{}", render::evaluation(&results));
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_model(project_id: &str, artifact: &ModelArtifact, json: bool) -> Result<()> {
    if json {
        print_json(artifact)
    } else {
        println!("{}", render::model_line(project_id, artifact));
        Ok(())
    }
}

#[derive(Parser)]
#[command(name = "subject-indexer")]
#[command(about = "Multi-backend automated subject indexing", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the configured suggestion defaults.
#[derive(clap::Args)]
struct RequestArgs {
    /// Maximum number of suggestions (0 for no cap)
    #[arg(long)]
    limit: Option<usize>,
    /// Minimum score relative to the best suggestion, 0..=1
    #[arg(long)]
    threshold: Option<f32>,
    /// Label language
    #[arg(long)]
    language: Option<String>,
}

impl RequestArgs {
    fn apply(self, mut params: SuggestParams) -> SuggestParams {
        if let Some(limit) = self.limit {
            params = params.with_limit(limit);
        }
        if let Some(threshold) = self.threshold {
            params = params.with_threshold(threshold);
        }
        if let Some(language) = self.language {
            params = params.with_language(language);
        }
        params
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List configured projects
    ListProjects {
        #[arg(long)]
        json: bool,
    },
    /// Show one project and its training state
    ShowProject {
        project_id: String,
        #[arg(long)]
        json: bool,
    },
    /// List known vocabularies and whether they are loaded
    ListVocabs {
        #[arg(long)]
        json: bool,
    },
    /// Load a TSV subject file (`<uri>\tlabel[\tnotation]`) into a vocabulary
    LoadVocab {
        vocab_id: String,
        file: PathBuf,
        /// Language of the labels in the file
        #[arg(long, default_value = "en")]
        language: String,
        /// Rebuild from scratch; discards models of dependent projects
        #[arg(long, default_value_t = false)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Train a project on a corpus (TSV file or directory of .txt documents)
    Train {
        project_id: String,
        corpus: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Update a trained project with more documents
    Learn {
        project_id: String,
        corpus: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Suggest subjects for a text; reads stdin when --text is omitted
    Suggest {
        project_id: String,
        #[arg(long)]
        text: Option<String>,
        #[command(flatten)]
        request: RequestArgs,
        #[arg(long)]
        json: bool,
    },
    /// Suggest subjects for several files, identified by file name
    SuggestBatch {
        project_id: String,
        files: Vec<PathBuf>,
        #[command(flatten)]
        request: RequestArgs,
        #[arg(long)]
        json: bool,
    },
    /// Score a project's suggestions against the gold subjects of a corpus
    Eval {
        project_id: String,
        corpus: PathBuf,
        #[command(flatten)]
        request: RequestArgs,
        #[arg(long)]
        json: bool,
    },
}
