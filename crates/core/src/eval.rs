//! Scores suggestion lists against gold subjects.
//!
//! Document-averaged measures weight every document equally; the micro
//! measures pool hits over the whole batch. Empty denominators score zero.

use crate::suggestion::SuggestionResultList;
use serde::Serialize;
use std::collections::BTreeSet;

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn harmonic(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn hits(suggested: &[&str], gold: &BTreeSet<String>) -> usize {
    suggested
        .iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|uri| gold.contains(**uri))
        .count()
}

pub fn precision(suggested: &[&str], gold: &BTreeSet<String>) -> f64 {
    let distinct = suggested.iter().collect::<BTreeSet<_>>().len();
    ratio(hits(suggested, gold), distinct)
}

pub fn recall(suggested: &[&str], gold: &BTreeSet<String>) -> f64 {
    ratio(hits(suggested, gold), gold.len())
}

pub fn f_measure(suggested: &[&str], gold: &BTreeSet<String>) -> f64 {
    harmonic(precision(suggested, gold), recall(suggested, gold))
}

/// Normalized discounted cumulative gain of a ranked list with binary
/// relevance. The ideal ranking places every gold subject first.
pub fn ndcg(ranked: &[&str], gold: &BTreeSet<String>) -> f64 {
    let gain = |rank: usize| 1.0 / ((rank + 2) as f64).log2();
    let mut seen = BTreeSet::new();
    let dcg: f64 = ranked
        .iter()
        .enumerate()
        .filter(|(_, uri)| gold.contains(**uri) && seen.insert(**uri))
        .map(|(rank, _)| gain(rank))
        .sum();
    let ideal: f64 = (0..gold.len()).map(gain).sum();
    if ideal == 0.0 {
        0.0
    } else {
        dcg / ideal
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationResults {
    pub documents: usize,
    pub precision_doc_avg: f64,
    pub recall_doc_avg: f64,
    pub f1_doc_avg: f64,
    pub ndcg_doc_avg: f64,
    pub precision_micro: f64,
    pub recall_micro: f64,
    pub f1_micro: f64,
    /// Suggestions that matched a gold subject, over the whole batch.
    pub true_positives: usize,
    pub suggested: usize,
    pub gold: usize,
}

/// Accumulates per-document scores.
#[derive(Debug, Default)]
pub struct EvaluationBatch {
    documents: usize,
    precision: f64,
    recall: f64,
    f1: f64,
    ndcg: f64,
    true_positives: usize,
    suggested: usize,
    gold: usize,
}

impl EvaluationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, suggestions: &SuggestionResultList, gold: &BTreeSet<String>) {
        let ranked = suggestions.uris();
        self.documents += 1;
        self.precision += precision(&ranked, gold);
        self.recall += recall(&ranked, gold);
        self.f1 += f_measure(&ranked, gold);
        self.ndcg += ndcg(&ranked, gold);
        self.true_positives += hits(&ranked, gold);
        self.suggested += ranked.iter().collect::<BTreeSet<_>>().len();
        self.gold += gold.len();
    }

    pub fn len(&self) -> usize {
        self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents == 0
    }

    pub fn results(&self) -> EvaluationResults {
        let n = self.documents.max(1) as f64;
        let precision_micro = ratio(self.true_positives, self.suggested);
        let recall_micro = ratio(self.true_positives, self.gold);
        EvaluationResults {
            documents: self.documents,
            precision_doc_avg: self.precision / n,
            recall_doc_avg: self.recall / n,
            f1_doc_avg: self.f1 / n,
            ndcg_doc_avg: self.ndcg / n,
            precision_micro,
            recall_micro,
            f1_micro: harmonic(precision_micro, recall_micro),
            true_positives: self.true_positives,
            suggested: self.suggested,
            gold: self.gold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::SuggestionResult;

    fn gold(uris: &[&str]) -> BTreeSet<String> {
        uris.iter().map(|u| u.to_string()).collect()
    }

    fn list(uris: &[&str]) -> SuggestionResultList {
        SuggestionResultList {
            results: uris
                .iter()
                .enumerate()
                .map(|(i, uri)| SuggestionResult {
                    uri: uri.to_string(),
                    label: uri.to_string(),
                    notation: None,
                    score: 1.0 - i as f32 * 0.1,
                })
                .collect(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn set_measures() {
        let g = gold(&["a", "b", "c", "d"]);
        assert!(close(precision(&["a", "x"], &g), 0.5));
        assert!(close(recall(&["a", "x"], &g), 0.25));
        assert!(close(f_measure(&["a", "x"], &g), 1.0 / 3.0));
        assert_eq!(precision(&[], &g), 0.0);
        assert_eq!(f_measure(&["x"], &g), 0.0);
    }

    #[test]
    fn ndcg_rewards_gold_subjects_ranked_first() {
        let g = gold(&["a", "b"]);
        assert!(close(ndcg(&["a", "b", "x"], &g), 1.0));
        let late = ndcg(&["x", "a", "b"], &g);
        assert!(late > 0.0 && late < 1.0);
        assert!(ndcg(&["a"], &g) < 1.0);
        assert_eq!(ndcg(&["x"], &g), 0.0);
        assert_eq!(ndcg(&["a"], &gold(&[])), 0.0);
    }

    #[test]
    fn batch_averages_documents_and_pools_micro_counts() {
        let mut batch = EvaluationBatch::new();
        assert!(batch.is_empty());
        batch.evaluate(&list(&["a", "b"]), &gold(&["a", "b"]));
        batch.evaluate(&list(&["x", "y", "z", "c"]), &gold(&["c"]));
        let r = batch.results();

        assert_eq!(r.documents, 2);
        assert!(close(r.precision_doc_avg, (1.0 + 0.25) / 2.0));
        assert!(close(r.recall_doc_avg, 1.0));
        assert_eq!((r.true_positives, r.suggested, r.gold), (3, 6, 3));
        assert!(close(r.precision_micro, 0.5));
        assert!(close(r.recall_micro, 1.0));
        assert!(close(r.f1_micro, 2.0 / 3.0));
    }

    #[test]
    fn an_empty_batch_scores_zero() {
        let r = EvaluationBatch::new().results();
        assert_eq!(r, EvaluationResults::default());
    }
}
