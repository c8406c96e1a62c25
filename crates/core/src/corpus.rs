//! Document corpora used for training and learning. Every corpus is
//! restartable: `documents()` starts a fresh pass each time it is called.

use crate::error::{Result, SuggestError};
use crate::vocab::{cleanup_uri, SubjectIndex};
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    /// Gold subject URIs.
    pub subjects: BTreeSet<String>,
}

impl Document {
    pub fn new<I, S>(text: impl Into<String>, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into(),
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }

    /// Gold subjects that resolve to active positions in `index`.
    pub fn positions(&self, index: &SubjectIndex) -> Vec<usize> {
        self.subjects
            .iter()
            .filter_map(|uri| index.lookup_by_uri(uri))
            .filter(|pos| !index.is_deprecated(*pos))
            .collect()
    }
}

pub trait Corpus: Send + Sync {
    fn documents(&self) -> Box<dyn Iterator<Item = Document> + Send + '_>;

    fn is_empty(&self) -> bool {
        self.documents().next().is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentList {
    docs: Vec<Document>,
}

impl DocumentList {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }
}

impl From<Vec<Document>> for DocumentList {
    fn from(docs: Vec<Document>) -> Self {
        Self::new(docs)
    }
}

impl Corpus for DocumentList {
    fn documents(&self) -> Box<dyn Iterator<Item = Document> + Send + '_> {
        Box::new(self.docs.iter().cloned())
    }
}

/// A TSV file with one document per line: `text\t<uri> <uri>`.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    path: PathBuf,
}

impl DocumentFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(SuggestError::Configuration(format!(
                "corpus file {} not found",
                path.display()
            )));
        }
        Ok(Self { path })
    }
}

fn parse_document_line(line: &str) -> Option<Document> {
    let (text, uris) = line.split_once('\t')?;
    Some(Document::new(
        text,
        uris.split_whitespace().map(|u| cleanup_uri(u).to_string()),
    ))
}

impl Corpus for DocumentFile {
    fn documents(&self) -> Box<dyn Iterator<Item = Document> + Send + '_> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "cannot read corpus file");
                return Box::new(std::iter::empty());
            }
        };
        let path = self.path.clone();
        Box::new(
            BufReader::new(file)
                .lines()
                .enumerate()
                .filter_map(move |(lineno, line)| match line {
                    Ok(line) => {
                        let doc = parse_document_line(line.trim_end_matches('\r'));
                        if doc.is_none() && !line.trim().is_empty() {
                            warn!(path = %path.display(), line = lineno + 1, "skipping line without subjects");
                        }
                        doc
                    }
                    Err(err) => {
                        warn!(path = %path.display(), %err, "corpus read error");
                        None
                    }
                }),
        )
    }
}

/// A directory of `*.txt` documents with sibling `*.tsv` or `*.key` subject
/// files. Documents without a subject file are skipped.
#[derive(Debug, Clone)]
pub struct DocumentDirectory {
    root: PathBuf,
}

impl DocumentDirectory {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SuggestError::Configuration(format!(
                "corpus directory {} not found",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    fn text_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("txt"))
            .collect();
        files.sort();
        files
    }
}

fn subject_file_for(text_path: &Path) -> Option<PathBuf> {
    ["tsv", "key"]
        .iter()
        .map(|ext| text_path.with_extension(ext))
        .find(|p| p.is_file())
}

/// Reads gold URIs from a subject file: the first tab-separated field per line.
fn read_subject_uris(path: &Path) -> std::io::Result<BTreeSet<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|l| l.split('\t').next())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(|u| cleanup_uri(u).to_string())
        .collect())
}

impl Corpus for DocumentDirectory {
    fn documents(&self) -> Box<dyn Iterator<Item = Document> + Send + '_> {
        Box::new(self.text_files().into_iter().filter_map(|text_path| {
            let subject_path = subject_file_for(&text_path)?;
            let text = fs::read_to_string(&text_path)
                .map_err(|err| warn!(path = %text_path.display(), %err, "cannot read document"))
                .ok()?;
            let subjects = read_subject_uris(&subject_path)
                .map_err(|err| warn!(path = %subject_path.display(), %err, "cannot read subjects"))
                .ok()?;
            Some(Document { text, subjects })
        }))
    }
}

/// Opens a file or directory corpus depending on what `path` points at.
pub fn open_corpus(path: &Path) -> Result<Box<dyn Corpus>> {
    if path.is_dir() {
        Ok(Box::new(DocumentDirectory::open(path)?))
    } else {
        Ok(Box::new(DocumentFile::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Subject;

    #[test]
    fn document_file_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tsv");
        fs::write(
            &path,
            "first doc\t<http://example.org/a> <http://example.org/b>\nno subjects here\nsecond doc\thttp://example.org/c\n",
        )
        .unwrap();
        let corpus = DocumentFile::open(&path).unwrap();

        let docs: Vec<Document> = corpus.documents().collect();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].subjects.contains("http://example.org/a"));
        assert_eq!(docs[1].text, "second doc");
        assert_eq!(corpus.documents().count(), 2);
        assert!(!corpus.is_empty());
    }

    #[test]
    fn document_directory_pairs_text_with_subject_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "about archaeology").unwrap();
        fs::write(dir.path().join("a.tsv"), "<http://example.org/a>\tArchaeology\n").unwrap();
        fs::write(dir.path().join("b.txt"), "about biology").unwrap();
        fs::write(dir.path().join("b.key"), "http://example.org/b\n").unwrap();
        fs::write(dir.path().join("c.txt"), "unlabeled").unwrap();

        let corpus = open_corpus(dir.path()).unwrap();
        let docs: Vec<Document> = corpus.documents().collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "about archaeology");
        assert!(docs[1].subjects.contains("http://example.org/b"));
    }

    #[test]
    fn missing_corpus_is_a_configuration_error() {
        assert!(matches!(
            open_corpus(Path::new("/nonexistent/corpus.tsv")),
            Err(SuggestError::Configuration(_))
        ));
    }

    #[test]
    fn positions_skip_unknown_and_deprecated_subjects() {
        let index = SubjectIndex::from_snapshot(vec![
            Subject::new("http://example.org/a", "en", "A"),
            Subject {
                deprecated: true,
                ..Subject::new("http://example.org/b", "en", "B")
            },
        ])
        .unwrap();
        let doc = Document::new(
            "text",
            ["http://example.org/a", "http://example.org/b", "http://example.org/x"],
        );
        assert_eq!(doc.positions(&index), vec![0]);
        assert!(DocumentList::default().is_empty());
    }
}
