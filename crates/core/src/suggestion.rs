//! Score vectors and the pipeline that turns them into ranked suggestions.

use crate::error::{Result, SuggestError};
use crate::vocab::{Subject, SubjectIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Sparse scores keyed by subject position. Entries keep insertion order,
/// which the ranking step relies on to break ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreVector {
    entries: Vec<(usize, f32)>,
    by_pos: HashMap<usize, usize>,
}

impl ScoreVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the score of `pos`, keeping its original slot if already present.
    pub fn insert(&mut self, pos: usize, score: f32) {
        match self.by_pos.get(&pos) {
            Some(&i) => self.entries[i].1 = score,
            None => {
                self.by_pos.insert(pos, self.entries.len());
                self.entries.push((pos, score));
            }
        }
    }

    pub fn add(&mut self, pos: usize, delta: f32) {
        let current = self.get(pos);
        self.insert(pos, current + delta);
    }

    /// Score of `pos`; missing subjects score zero.
    pub fn get(&self, pos: usize) -> f32 {
        self.by_pos
            .get(&pos)
            .map(|&i| self.entries[i].1)
            .unwrap_or(0.0)
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.by_pos.contains_key(&pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_score(&self) -> f32 {
        self.entries
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0_f32, f32::max)
    }
}

impl FromIterator<(usize, f32)> for ScoreVector {
    fn from_iter<T: IntoIterator<Item = (usize, f32)>>(iter: T) -> Self {
        let mut vector = ScoreVector::new();
        for (pos, score) in iter {
            vector.insert(pos, score);
        }
        vector
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestParams {
    /// Maximum number of results; 0 means no cap.
    pub limit: usize,
    /// Fraction of the best score a subject must reach.
    pub threshold: f32,
    pub language: Option<String>,
    pub include_deprecated: bool,
    pub timeout: Option<Duration>,
}

impl Default for SuggestParams {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: 0.0,
            language: None,
            include_deprecated: false,
            timeout: None,
        }
    }
}

impl SuggestParams {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(SuggestError::InvalidParameter(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if let Some(lang) = &self.language {
            if lang.is_empty() || !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(SuggestError::InvalidParameter(format!(
                    "invalid language code '{lang}'"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResult {
    pub uri: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notation: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResultList {
    pub results: Vec<SuggestionResult>,
}

impl SuggestionResultList {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SuggestionResult> {
        self.results.iter()
    }

    pub fn uris(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.uri.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDocument {
    #[serde(default)]
    pub document_id: Option<String>,
    pub text: String,
}

impl BatchDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            document_id: None,
            text: text.into(),
        }
    }

    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_id: Some(id.into()),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(flatten)]
    pub results: SuggestionResultList,
}

fn resolve_label(subject: &Subject, requested: Option<&str>, default_language: &str) -> String {
    requested
        .and_then(|lang| subject.label(lang))
        .or_else(|| subject.label(default_language))
        .or_else(|| subject.labels.values().next().map(String::as_str))
        .unwrap_or(&subject.uri)
        .to_string()
}

/// Ranks, filters and resolves a raw score vector.
pub fn filter_suggestions(
    scores: &ScoreVector,
    index: &SubjectIndex,
    params: &SuggestParams,
    default_language: &str,
) -> SuggestionResultList {
    // hidden subjects must not raise the threshold floor
    let visible: ScoreVector = scores
        .iter()
        .filter(|(pos, _)| params.include_deprecated || !index.is_deprecated(*pos))
        .collect();
    let max_score = visible.max_score();
    if max_score <= 0.0 {
        return SuggestionResultList::default();
    }
    let floor = params.threshold * max_score;

    let mut ranked: Vec<(usize, f32)> = visible
        .iter()
        .filter(|(_, score)| *score > 0.0 && *score >= floor)
        .collect();
    // stable: equal scores keep vector order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    if params.limit > 0 {
        ranked.truncate(params.limit);
    }

    let results = ranked
        .into_iter()
        .filter_map(|(pos, score)| {
            let subject = index.lookup_by_position(pos)?;
            Some(SuggestionResult {
                uri: subject.uri.clone(),
                label: resolve_label(subject, params.language.as_deref(), default_language),
                notation: subject.notation.clone(),
                score,
            })
        })
        .collect();
    SuggestionResultList { results }
}
