//! Controlled vocabularies: subjects, the position-stable subject index and
//! the per-vocabulary snapshot that gets swapped on every `load-vocab`.

use crate::error::{Result, SuggestError};
use crate::store::Store;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub uri: String,
    /// Label per language code.
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub notation: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl Subject {
    pub fn new(uri: impl Into<String>, language: &str, label: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(language.to_string(), label.into());
        Self {
            uri: uri.into(),
            labels,
            notation: None,
            deprecated: false,
        }
    }

    pub fn with_notation(mut self, notation: impl Into<String>) -> Self {
        self.notation = Some(notation.into());
        self
    }

    pub fn with_label(mut self, language: &str, label: impl Into<String>) -> Self {
        self.labels.insert(language.to_string(), label.into());
        self
    }

    pub fn label(&self, language: &str) -> Option<&str> {
        self.labels.get(language).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Rebuild positions from the incoming order.
    Replace,
    /// Keep existing positions, append new subjects, deprecate missing ones.
    Merge,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub added: usize,
    pub updated: usize,
    pub deprecated: usize,
    pub removed: usize,
    pub rebuilt: bool,
}

impl LoadSummary {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.deprecated == 0 && self.removed == 0
    }
}

/// Ordered subjects addressed by a dense position. Positions are never reused
/// within one merge lineage, so model weights keyed by position stay valid.
#[derive(Debug, Clone, Default)]
pub struct SubjectIndex {
    subjects: Vec<Subject>,
    uri_idx: HashMap<String, usize>,
    label_idx: HashMap<(String, String), usize>,
}

impl SubjectIndex {
    /// Builds an index from a fresh subject source.
    pub fn from_subjects(subjects: Vec<Subject>) -> Result<Self> {
        validate_source(&subjects)?;
        let subjects = subjects
            .into_iter()
            .map(|mut s| {
                s.deprecated = false;
                s
            })
            .collect();
        Ok(Self::build(subjects))
    }

    /// Restores a persisted snapshot, deprecated entries included.
    pub fn from_snapshot(subjects: Vec<Subject>) -> Result<Self> {
        let mut seen = HashSet::new();
        for s in &subjects {
            if !seen.insert(s.uri.as_str()) {
                return Err(SuggestError::Configuration(format!(
                    "snapshot contains duplicate subject URI <{}>",
                    s.uri
                )));
            }
        }
        Ok(Self::build(subjects))
    }

    fn build(subjects: Vec<Subject>) -> Self {
        let mut uri_idx = HashMap::with_capacity(subjects.len());
        let mut label_idx = HashMap::new();
        for (pos, subject) in subjects.iter().enumerate() {
            uri_idx.insert(subject.uri.clone(), pos);
            if subject.deprecated {
                continue;
            }
            for (lang, label) in &subject.labels {
                label_idx.insert((label.clone(), lang.clone()), pos);
            }
        }
        Self {
            subjects,
            uri_idx,
            label_idx,
        }
    }

    pub fn lookup_by_uri(&self, uri: &str) -> Option<usize> {
        self.uri_idx.get(uri).copied()
    }

    pub fn lookup_by_position(&self, pos: usize) -> Option<&Subject> {
        self.subjects.get(pos)
    }

    pub fn by_label(&self, label: &str, language: &str) -> Option<usize> {
        self.label_idx
            .get(&(label.to_string(), language.to_string()))
            .copied()
    }

    pub fn size(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn is_deprecated(&self, pos: usize) -> bool {
        self.subjects.get(pos).map(|s| s.deprecated).unwrap_or(true)
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    /// Subjects available for new suggestions.
    pub fn active(&self) -> impl Iterator<Item = (usize, &Subject)> + '_ {
        self.subjects
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.deprecated)
    }

    pub fn languages(&self) -> Vec<String> {
        let langs: BTreeSet<&String> = self
            .subjects
            .iter()
            .flat_map(|s| s.labels.keys())
            .collect();
        langs.into_iter().cloned().collect()
    }

    /// Produces the index that results from loading `incoming` on top of this
    /// one. `self` is left untouched; callers publish the returned index.
    pub fn load(&self, incoming: Vec<Subject>, mode: LoadMode) -> Result<(SubjectIndex, LoadSummary)> {
        validate_source(&incoming)?;
        let mut summary = LoadSummary::default();
        let by_uri: HashMap<&str, &Subject> =
            incoming.iter().map(|s| (s.uri.as_str(), s)).collect();

        let subjects = match mode {
            LoadMode::Replace => {
                summary.rebuilt = true;
                for old in &self.subjects {
                    match by_uri.get(old.uri.as_str()) {
                        Some(new) if changed(old, new) => summary.updated += 1,
                        Some(_) => {}
                        None => summary.removed += 1,
                    }
                }
                summary.added = incoming
                    .iter()
                    .filter(|s| !self.uri_idx.contains_key(&s.uri))
                    .count();
                incoming
                    .into_iter()
                    .map(|mut s| {
                        s.deprecated = false;
                        s
                    })
                    .collect::<Vec<_>>()
            }
            LoadMode::Merge => {
                let mut merged = Vec::with_capacity(self.subjects.len() + incoming.len());
                for old in &self.subjects {
                    match by_uri.get(old.uri.as_str()) {
                        Some(new) => {
                            if changed(old, new) {
                                summary.updated += 1;
                            }
                            let mut subject = (*new).clone();
                            subject.deprecated = false;
                            merged.push(subject);
                        }
                        None => {
                            let mut subject = old.clone();
                            if !subject.deprecated {
                                subject.deprecated = true;
                                summary.deprecated += 1;
                            }
                            merged.push(subject);
                        }
                    }
                }
                for new in incoming {
                    if !self.uri_idx.contains_key(&new.uri) {
                        summary.added += 1;
                        let mut subject = new;
                        subject.deprecated = false;
                        merged.push(subject);
                    }
                }
                merged
            }
        };
        Ok((Self::build(subjects), summary))
    }
}

fn changed(old: &Subject, new: &Subject) -> bool {
    old.deprecated || old.labels != new.labels || old.notation != new.notation
}

fn validate_source(subjects: &[Subject]) -> Result<()> {
    if subjects.is_empty() {
        return Err(SuggestError::Configuration(
            "subject source contains no subjects".into(),
        ));
    }
    let mut seen = HashSet::with_capacity(subjects.len());
    for subject in subjects {
        if subject.uri.trim().is_empty() {
            return Err(SuggestError::Configuration(
                "subject with an empty URI".into(),
            ));
        }
        if subject.labels.is_empty() || subject.labels.values().all(|l| l.trim().is_empty()) {
            return Err(SuggestError::Configuration(format!(
                "subject <{}> has no labels",
                subject.uri
            )));
        }
        if !seen.insert(subject.uri.as_str()) {
            return Err(SuggestError::Configuration(format!(
                "duplicate subject URI <{}>",
                subject.uri
            )));
        }
    }
    Ok(())
}

/// Strips angle brackets from a URI, if any.
pub fn cleanup_uri(uri: &str) -> &str {
    uri.strip_prefix('<')
        .and_then(|u| u.strip_suffix('>'))
        .unwrap_or(uri)
}

/// Parses a TSV subject source: `<uri>\tlabel[\tnotation]`, one language per file.
pub fn parse_subject_tsv(reader: impl BufRead, language: &str) -> Result<Vec<Subject>> {
    let mut subjects = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SuggestError::Configuration(e.to_string()))?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let uri = fields.next().map(cleanup_uri).unwrap_or_default();
        let label = fields.next().ok_or_else(|| {
            SuggestError::Configuration(format!(
                "line {}: expected <uri>\\tlabel",
                lineno + 1
            ))
        })?;
        let mut subject = Subject::new(uri, language, label);
        if let Some(notation) = fields.next().filter(|n| !n.is_empty()) {
            subject = subject.with_notation(notation);
        }
        subjects.push(subject);
    }
    Ok(subjects)
}

pub fn read_subject_file(path: &Path, language: &str) -> Result<Vec<Subject>> {
    let file = std::fs::File::open(path).map_err(|e| {
        SuggestError::Configuration(format!("cannot open {}: {e}", path.display()))
    })?;
    parse_subject_tsv(std::io::BufReader::new(file), language)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabularyInfo {
    pub vocab_id: String,
    pub languages: Vec<String>,
    pub size: Option<usize>,
    pub loaded: bool,
}

/// A named vocabulary shared by every project that refers to it. The current
/// index is published through an atomically swappable slot; readers hold on
/// to the `Arc` they loaded for as long as they need it.
pub struct Vocabulary {
    vocab_id: String,
    index: ArcSwapOption<SubjectIndex>,
    load_lock: Mutex<()>,
    store: Store,
}

impl Vocabulary {
    pub fn new(vocab_id: impl Into<String>, store: Store) -> Self {
        Self {
            vocab_id: vocab_id.into(),
            index: ArcSwapOption::empty(),
            load_lock: Mutex::new(()),
            store,
        }
    }

    pub fn vocab_id(&self) -> &str {
        &self.vocab_id
    }

    /// Current snapshot, restored from the store on first use.
    pub async fn subjects(&self) -> Result<Arc<SubjectIndex>> {
        if let Some(index) = self.index.load_full() {
            return Ok(index);
        }
        let _guard = self.load_lock.lock().await;
        self.current_locked()
            .await?
            .ok_or_else(|| SuggestError::VocabularyNotFound(self.vocab_id.clone()))
    }

    async fn current_locked(&self) -> Result<Option<Arc<SubjectIndex>>> {
        if let Some(index) = self.index.load_full() {
            return Ok(Some(index));
        }
        let Some(subjects) = self.store.load_subjects(&self.vocab_id).await? else {
            return Ok(None);
        };
        debug!(vocab_id = %self.vocab_id, size = subjects.len(), "restored vocabulary");
        let index = Arc::new(SubjectIndex::from_snapshot(subjects)?);
        self.index.store(Some(index.clone()));
        Ok(Some(index))
    }

    /// Loads a subject source. Merges into the existing index unless `force`
    /// is set or nothing was loaded before. The new index is persisted before
    /// it is published, so a failed write leaves the old one in place.
    pub async fn load(&self, incoming: Vec<Subject>, force: bool) -> Result<LoadSummary> {
        let _guard = self.load_lock.lock().await;
        let current = self.current_locked().await?;
        let (index, summary) = match current {
            Some(current) if !force => current.load(incoming, LoadMode::Merge)?,
            Some(current) => current.load(incoming, LoadMode::Replace)?,
            None => SubjectIndex::default().load(incoming, LoadMode::Replace)?,
        };
        self.store
            .save_subjects(&self.vocab_id, index.subjects())
            .await?;
        info!(
            vocab_id = %self.vocab_id,
            added = summary.added,
            updated = summary.updated,
            deprecated = summary.deprecated,
            removed = summary.removed,
            rebuilt = summary.rebuilt,
            "loaded vocabulary"
        );
        self.index.store(Some(Arc::new(index)));
        Ok(summary)
    }

    pub async fn remove(&self) -> Result<bool> {
        let _guard = self.load_lock.lock().await;
        let removed = self.store.delete_subjects(&self.vocab_id).await?;
        self.index.store(None);
        Ok(removed)
    }

    pub async fn dump(&self) -> VocabularyInfo {
        match self.subjects().await {
            Ok(index) => VocabularyInfo {
                vocab_id: self.vocab_id.clone(),
                languages: index.languages(),
                size: Some(index.size()),
                loaded: true,
            },
            Err(_) => VocabularyInfo {
                vocab_id: self.vocab_id.clone(),
                languages: vec![],
                size: None,
                loaded: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects(uris: &[&str]) -> Vec<Subject> {
        uris.iter()
            .map(|u| Subject::new(format!("http://example.org/{u}"), "en", u.to_uppercase()))
            .collect()
    }

    fn positions(index: &SubjectIndex) -> Vec<(String, usize)> {
        index
            .subjects()
            .iter()
            .map(|s| (s.uri.clone(), index.lookup_by_uri(&s.uri).unwrap()))
            .collect()
    }

    #[test]
    fn lookups_by_uri_position_and_label() {
        let index = SubjectIndex::from_subjects(subjects(&["a", "b", "c"])).unwrap();
        assert_eq!(index.size(), 3);
        assert_eq!(index.lookup_by_uri("http://example.org/b"), Some(1));
        assert_eq!(index.lookup_by_uri("http://example.org/zzz"), None);
        assert_eq!(index.lookup_by_position(2).unwrap().label("en"), Some("C"));
        assert!(index.lookup_by_position(3).is_none());
        assert_eq!(index.by_label("A", "en"), Some(0));
        assert_eq!(index.by_label("A", "fi"), None);
        assert_eq!(index.languages(), vec!["en".to_string()]);
    }

    #[test]
    fn malformed_sources_are_rejected() {
        let mut dup = subjects(&["a", "b"]);
        dup.push(dup[0].clone());
        assert!(matches!(
            SubjectIndex::from_subjects(dup),
            Err(SuggestError::Configuration(_))
        ));

        let mut unlabeled = subjects(&["a"]);
        unlabeled[0].labels.clear();
        assert!(matches!(
            SubjectIndex::from_subjects(unlabeled),
            Err(SuggestError::Configuration(_))
        ));
    }

    #[test]
    fn merging_the_same_source_is_a_noop() {
        let index = SubjectIndex::from_subjects(subjects(&["a", "b", "c"])).unwrap();
        let (merged, summary) = index
            .load(subjects(&["a", "b", "c"]), LoadMode::Merge)
            .unwrap();
        assert!(summary.is_noop());
        assert_eq!(positions(&merged), positions(&index));
    }

    #[test]
    fn merge_appends_new_and_deprecates_missing() {
        let index = SubjectIndex::from_subjects(subjects(&["a", "b", "c"])).unwrap();
        let (merged, summary) = index
            .load(subjects(&["d", "c", "a"]), LoadMode::Merge)
            .unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.deprecated, 1);
        assert_eq!(summary.updated, 0);
        assert_eq!(merged.size(), 4);
        assert_eq!(merged.lookup_by_uri("http://example.org/a"), Some(0));
        assert_eq!(merged.lookup_by_uri("http://example.org/b"), Some(1));
        assert_eq!(merged.lookup_by_uri("http://example.org/c"), Some(2));
        assert_eq!(merged.lookup_by_uri("http://example.org/d"), Some(3));
        assert!(merged.is_deprecated(1));
        assert_eq!(merged.active().count(), 3);
        assert_eq!(merged.by_label("B", "en"), None);
    }

    #[test]
    fn merge_counts_relabeling_and_restores_deprecated() {
        let index = SubjectIndex::from_subjects(subjects(&["a", "b"])).unwrap();
        let (without_b, _) = index.load(subjects(&["a"]), LoadMode::Merge).unwrap();

        let mut incoming = subjects(&["a", "b"]);
        incoming[0] = incoming[0].clone().with_notation("001");
        let (merged, summary) = without_b.load(incoming, LoadMode::Merge).unwrap();
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.added, 0);
        assert!(!merged.is_deprecated(1));
        assert_eq!(
            merged.lookup_by_position(0).unwrap().notation.as_deref(),
            Some("001")
        );
    }

    #[test]
    fn replace_rebuilds_positions() {
        let index = SubjectIndex::from_subjects(subjects(&["a", "b"])).unwrap();
        let (replaced, summary) = index
            .load(subjects(&["c", "a"]), LoadMode::Replace)
            .unwrap();
        assert!(summary.rebuilt);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(replaced.lookup_by_uri("http://example.org/a"), Some(1));
        assert_eq!(replaced.lookup_by_uri("http://example.org/b"), None);
    }

    #[test]
    fn parses_tsv_subject_files() {
        let tsv = "<http://example.org/a>\tArchaeology\t901\nhttp://example.org/b\tBiology\n\n";
        let parsed = parse_subject_tsv(tsv.as_bytes(), "en").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].uri, "http://example.org/a");
        assert_eq!(parsed[0].notation.as_deref(), Some("901"));
        assert_eq!(parsed[1].label("en"), Some("Biology"));

        let err = parse_subject_tsv("http://example.org/a\n".as_bytes(), "en").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[tokio::test]
    async fn vocabulary_persists_and_restores_snapshots() {
        let store = Store::open("sqlite::memory:").await.unwrap();
        let vocab = Vocabulary::new("yso", store.clone());
        assert!(matches!(
            vocab.subjects().await,
            Err(SuggestError::VocabularyNotFound(_))
        ));

        vocab.load(subjects(&["a", "b"]), false).await.unwrap();
        let summary = vocab.load(subjects(&["b", "c"]), false).await.unwrap();
        assert_eq!((summary.added, summary.deprecated), (1, 1));

        let restored = Vocabulary::new("yso", store);
        let index = restored.subjects().await.unwrap();
        assert_eq!(index.size(), 3);
        assert!(index.is_deprecated(0));
        assert_eq!(index.lookup_by_uri("http://example.org/c"), Some(2));

        let info = restored.dump().await;
        assert!(info.loaded);
        assert_eq!(info.size, Some(3));
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_reloads() {
        let store = Store::open("sqlite::memory:").await.unwrap();
        let vocab = Vocabulary::new("yso", store);
        vocab.load(subjects(&["a"]), false).await.unwrap();
        let before = vocab.subjects().await.unwrap();
        vocab.load(subjects(&["a", "b"]), false).await.unwrap();
        assert_eq!(before.size(), 1);
        assert_eq!(vocab.subjects().await.unwrap().size(), 2);
    }

    #[tokio::test]
    async fn empty_sources_are_rejected_and_keep_the_current_snapshot() {
        assert!(matches!(
            SubjectIndex::default().load(Vec::new(), LoadMode::Replace),
            Err(SuggestError::Configuration(_))
        ));

        let store = Store::open("sqlite::memory:").await.unwrap();
        let vocab = Vocabulary::new("yso", store);
        assert!(matches!(
            vocab.load(Vec::new(), false).await,
            Err(SuggestError::Configuration(_))
        ));
        vocab.load(subjects(&["a"]), false).await.unwrap();
        assert!(matches!(
            vocab.load(Vec::new(), true).await,
            Err(SuggestError::Configuration(_))
        ));
        assert_eq!(vocab.subjects().await.unwrap().size(), 1);
    }
}
