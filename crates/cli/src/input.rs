//! Reading command input: suggestion text from an argument or stdin, and
//! batch documents from files.

use anyhow::{Context, Result};
use indexer_core::suggestion::BatchDocument;
use std::io::Read;
use std::path::Path;

/// Returns the given text, or everything on `reader` when none was given.
pub fn text_or_read(text: Option<String>, mut reader: impl Read) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            reader
                .read_to_string(&mut buf)
                .context("failed to read text from stdin")?;
            Ok(buf)
        }
    }
}

/// Reads each file as one batch document, identified by its file name.
pub fn batch_documents<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<BatchDocument>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let doc = match path.file_name() {
                Some(name) => BatchDocument::with_id(name.to_string_lossy(), text),
                None => BatchDocument::new(text),
            };
            Ok(doc)
        })
        .collect()
}
