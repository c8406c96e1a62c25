//! Plain-text rendering for command output. `--json` output bypasses this and
//! prints the serialized values directly.

use indexer_core::eval::EvaluationResults;
use indexer_core::project::ProjectInfo;
use indexer_core::store::ModelArtifact;
use indexer_core::suggestion::{BatchResult, SuggestionResultList};
use indexer_core::vocab::{LoadSummary, VocabularyInfo};

/// One line per suggestion: `<uri>\t<label>\t<score>`, with the notation
/// appended when the subject has one.
pub fn suggestions(list: &SuggestionResultList) -> String {
    list.iter()
        .map(|r| {
            let mut line = format!("<{}>\t{}\t{:.4}", r.uri, r.label, r.score);
            if let Some(notation) = &r.notation {
                line.push('\t');
                line.push_str(notation);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Batch output: a header per document, followed by its suggestions.
pub fn batch(results: &[BatchResult]) -> String {
    let mut out = Vec::with_capacity(results.len());
    for (i, result) in results.iter().enumerate() {
        let id = result
            .document_id
            .clone()
            .unwrap_or_else(|| format!("#{}", i + 1));
        let body = suggestions(&result.results);
        if body.is_empty() {
            out.push(format!("{id}\n  (no suggestions)"));
        } else {
            let indented: Vec<String> = body.lines().map(|l| format!("  {l}")).collect();
            out.push(format!("{id}\n{}", indented.join("\n")));
        }
    }
    out.join("\n")
}

pub fn project_line(info: &ProjectInfo) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        info.project_id,
        info.name,
        info.language,
        info.backend,
        if info.is_trained { "trained" } else { "untrained" }
    )
}

pub fn project_details(info: &ProjectInfo) -> String {
    let modified = info
        .modification_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    [
        format!("project_id:        {}", info.project_id),
        format!("name:              {}", info.name),
        format!("language:          {}", info.language),
        format!("backend:           {}", info.backend),
        format!("vocab:             {}", info.vocab),
        format!("is_trained:        {}", info.is_trained),
        format!("modification_time: {modified}"),
    ]
    .join("\n")
}

pub fn load_summary(vocab_id: &str, summary: &LoadSummary) -> String {
    if summary.is_noop() && !summary.rebuilt {
        return format!("{vocab_id}: unchanged");
    }
    format!(
        "{vocab_id}: {} added, {} updated, {} deprecated, {} removed{}",
        summary.added,
        summary.updated,
        summary.deprecated,
        summary.removed,
        if summary.rebuilt { " (rebuilt)" } else { "" }
    )
}

pub fn model_line(project_id: &str, artifact: &ModelArtifact) -> String {
    format!(
        "{project_id}: {} model saved at {}",
        artifact.backend,
        artifact.trained_at.to_rfc3339()
    )
}

pub fn vocab_line(info: &VocabularyInfo) -> String {
    let size = info
        .size
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}\t{}\t{}\t{}",
        info.vocab_id,
        if info.languages.is_empty() {
            "-".to_string()
        } else {
            info.languages.join(",")
        },
        size,
        if info.loaded { "loaded" } else { "not loaded" }
    )
}

pub fn evaluation(results: &EvaluationResults) -> String {
    [
        format!("documents:         {}", results.documents),
        format!("precision (doc):   {:.4}", results.precision_doc_avg),
        format!("recall (doc):      {:.4}", results.recall_doc_avg),
        format!("F1 (doc):          {:.4}", results.f1_doc_avg),
        format!("NDCG (doc):        {:.4}", results.ndcg_doc_avg),
        format!("precision (micro): {:.4}", results.precision_micro),
        format!("recall (micro):    {:.4}", results.recall_micro),
        format!("F1 (micro):        {:.4}", results.f1_micro),
    ]
    .join("\n")
}
