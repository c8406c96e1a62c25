use cli::render;
use indexer_core::eval::EvaluationResults;
use indexer_core::project::ProjectInfo;
use indexer_core::store::ModelArtifact;
use indexer_core::suggestion::{BatchResult, SuggestionResult, SuggestionResultList};
use indexer_core::vocab::{LoadSummary, VocabularyInfo};

fn results() -> SuggestionResultList {
    SuggestionResultList {
        results: vec![
            SuggestionResult {
                uri: "http://example.org/a".into(),
                label: "Archaeology".into(),
                notation: None,
                score: 0.75,
            },
            SuggestionResult {
                uri: "http://example.org/b".into(),
                label: "Marine biology".into(),
                notation: Some("578.77".into()),
                score: 0.5,
            },
        ],
    }
}

#[test]
fn suggestions_are_tab_separated_in_rank_order() {
    let out = render::suggestions(&results());
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "<http://example.org/a>\tArchaeology\t0.7500");
    assert_eq!(lines[1], "<http://example.org/b>\tMarine biology\t0.5000\t578.77");
}

#[test]
fn batch_output_labels_each_document() {
    let batch = vec![
        BatchResult {
            document_id: Some("one.txt".into()),
            results: results(),
        },
        BatchResult {
            document_id: None,
            results: SuggestionResultList::default(),
        },
    ];
    let out = render::batch(&batch);
    assert!(out.starts_with("one.txt\n  <http://example.org/a>"));
    assert!(out.ends_with("#2\n  (no suggestions)"));
}

#[test]
fn project_views_show_training_state() {
    let info = ProjectInfo {
        project_id: "dummy-en".into(),
        name: "Dummy".into(),
        language: "en".into(),
        backend: "dummy".into(),
        vocab: "yso".into(),
        is_trained: false,
        modification_time: None,
    };
    assert_eq!(render::project_line(&info), "dummy-en\tDummy\ten\tdummy\tuntrained");
    let details = render::project_details(&info);
    assert!(details.contains("vocab:             yso"));
    assert!(details.contains("modification_time: -"));
}

#[test]
fn load_summaries_report_changes() {
    assert_eq!(render::load_summary("yso", &LoadSummary::default()), "yso: unchanged");
    let summary = LoadSummary {
        added: 2,
        deprecated: 1,
        rebuilt: true,
        ..LoadSummary::default()
    };
    assert_eq!(
        render::load_summary("yso", &summary),
        "yso: 2 added, 0 updated, 1 deprecated, 0 removed (rebuilt)"
    );
}

#[test]
fn model_line_names_the_backend() {
    let artifact = ModelArtifact::new("dummy", serde_json::json!({ "uri": "x" }));
    let line = render::model_line("dummy-en", &artifact);
    assert!(line.starts_with("dummy-en: dummy model saved at "));
}

#[test]
fn vocab_lines_show_languages_and_size() {
    let loaded = VocabularyInfo {
        vocab_id: "yso".into(),
        languages: vec!["en".into(), "fi".into()],
        size: Some(3),
        loaded: true,
    };
    assert_eq!(render::vocab_line(&loaded), "yso\ten,fi\t3\tloaded");
    let missing = VocabularyInfo {
        vocab_id: "stw".into(),
        languages: Vec::new(),
        size: None,
        loaded: false,
    };
    assert_eq!(render::vocab_line(&missing), "stw\t-\t-\tnot loaded");
}

#[test]
fn evaluation_lists_every_measure() {
    let results = EvaluationResults {
        documents: 2,
        precision_doc_avg: 0.625,
        f1_micro: 2.0 / 3.0,
        ..EvaluationResults::default()
    };
    let out = render::evaluation(&results);
    assert_eq!(out.lines().count(), 8);
    assert!(out.contains("documents:         2"));
    assert!(out.contains("precision (doc):   0.6250"));
    assert!(out.contains("F1 (micro):        0.6667"));
}
