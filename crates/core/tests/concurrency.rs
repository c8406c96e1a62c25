mod common;

use common::*;
use indexer_core::config::AppConfig;
use indexer_core::corpus::{Document, DocumentList};
use indexer_core::store::Store;
use indexer_core::suggestion::{BatchDocument, SuggestParams};
use indexer_core::vocab::Subject;
use indexer_core::ProjectRegistry;
use std::time::Duration;

const ZOOLOGY: &str = "http://example.org/zoology";

fn config() -> AppConfig {
    AppConfig::default()
        .with_project("label-en", project("label").with_param("min_score", "0.5"))
        .with_project("dummy-en", project("dummy"))
}

fn with_zoology() -> Vec<Subject> {
    let mut next = subjects();
    next.push(Subject::new(ZOOLOGY, "en", "Zoology"));
    next
}

fn sorted(uris: Vec<&str>) -> Vec<String> {
    let mut uris: Vec<String> = uris.into_iter().map(String::from).collect();
    uris.sort();
    uris
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_the_old_or_the_new_model_during_training() {
    let registry = loaded(config()).await;
    let params = SuggestParams::default();

    let mut readers = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        let params = params.clone();
        readers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..20 {
                if i % 2 == 0 {
                    let list = registry.suggest("dummy-en", "x", &params).await.unwrap();
                    seen.push(sorted(list.uris()));
                } else {
                    let docs = vec![BatchDocument::new("x"), BatchDocument::new("y")];
                    for result in registry.suggest_batch("dummy-en", &docs, &params).await.unwrap() {
                        seen.push(sorted(result.results.uris()));
                    }
                }
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    let trainer = {
        let registry = registry.clone();
        tokio::spawn(async move {
            let corpus = DocumentList::new(vec![Document::new("text", [C])]);
            registry.train("dummy-en", &corpus).await
        })
    };

    trainer.await.unwrap().unwrap();
    for reader in readers {
        for uris in reader.await.unwrap() {
            assert!(uris == vec![A] || uris == vec![C], "unexpected {uris:?}");
        }
    }
    let last = registry.suggest("dummy-en", "x", &params).await.unwrap();
    assert_eq!(last.uris(), vec![C]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_the_old_or_the_new_vocabulary_during_a_load() {
    let registry = loaded(config()).await;
    let params = SuggestParams::default();
    let old = sorted(vec![A]);
    let new = sorted(vec![A, ZOOLOGY]);

    let mut readers = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        let params = params.clone();
        readers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..20 {
                if i % 2 == 0 {
                    let list = registry
                        .suggest("label-en", "zoology archaeology", &params)
                        .await
                        .unwrap();
                    seen.push(sorted(list.uris()));
                } else {
                    let docs = vec![BatchDocument::new("zoology archaeology")];
                    for result in registry.suggest_batch("label-en", &docs, &params).await.unwrap() {
                        seen.push(sorted(result.results.uris()));
                    }
                }
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    let loader = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.load_vocab("yso", with_zoology(), false).await })
    };

    let summary = loader.await.unwrap().unwrap();
    assert_eq!(summary.added, 1);
    for reader in readers {
        for uris in reader.await.unwrap() {
            assert!(uris == old || uris == new, "unexpected {uris:?}");
        }
    }
    let last = registry
        .suggest("label-en", "zoology archaeology", &params)
        .await
        .unwrap();
    assert_eq!(sorted(last.uris()), new);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_first_suggestion_racing_a_load_never_keeps_the_stale_vocabulary() {
    for trial in 0..12u64 {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("indexer.db");
        let store = Store::open(db.to_str().unwrap()).await.unwrap();
        let registry = ProjectRegistry::new(config(), store).unwrap();
        registry.load_vocab("yso", subjects(), false).await.unwrap();

        let first = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .suggest("label-en", "archaeology", &SuggestParams::default())
                    .await
            })
        };
        let load = {
            let registry = registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_micros(trial % 4 * 750)).await;
                registry.load_vocab("yso", with_zoology(), false).await
            })
        };
        first.await.unwrap().unwrap();
        load.await.unwrap().unwrap();

        let after = registry
            .suggest("label-en", "zoology", &SuggestParams::default())
            .await
            .unwrap();
        assert_eq!(after.uris(), vec![ZOOLOGY]);
        registry.shutdown().await;
    }
}
