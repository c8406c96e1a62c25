//! Input transforms applied to document text before any backend sees it,
//! both when suggesting and when training or learning.

use crate::corpus::{Corpus, Document};
use crate::error::{Result, SuggestError};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Leaves the text as is.
    Pass,
    /// Keeps at most this many characters.
    Limit(usize),
}

impl Transform {
    fn parse(part: &str) -> Result<Self> {
        let (name, arg) = match part.find('(') {
            Some(open) => {
                let arg = part[open + 1..].strip_suffix(')').ok_or_else(|| {
                    SuggestError::Configuration(format!("unbalanced transform '{part}'"))
                })?;
                (part[..open].trim(), Some(arg.trim()))
            }
            None => (part, None),
        };
        match (name, arg) {
            ("pass", None) => Ok(Self::Pass),
            ("limit", Some(raw)) => {
                let raw = raw.strip_prefix("input_limit=").unwrap_or(raw).trim();
                raw.parse::<usize>().map(Self::Limit).map_err(|_| {
                    SuggestError::Configuration(format!(
                        "limit transform needs a non-negative character count, got '{raw}'"
                    ))
                })
            }
            ("limit", None) => Err(SuggestError::Configuration(
                "limit transform needs a character count, e.g. limit(5000)".into(),
            )),
            (other, _) => Err(SuggestError::Configuration(format!(
                "unsupported transform '{other}'"
            ))),
        }
    }

    fn apply<'t>(&self, text: Cow<'t, str>) -> Cow<'t, str> {
        match *self {
            Self::Pass => text,
            Self::Limit(limit) => {
                let cut = text.char_indices().nth(limit).map(|(i, _)| i);
                match cut {
                    Some(cut) => Cow::Owned(text[..cut].to_string()),
                    None => text,
                }
            }
        }
    }
}

/// An ordered chain such as `limit(5000)` or `pass,limit(200)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformChain {
    steps: Vec<Transform>,
}

impl TransformChain {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            steps.push(Transform::parse(part)?);
        }
        Ok(Self { steps })
    }

    pub fn is_identity(&self) -> bool {
        self.steps.iter().all(|s| *s == Transform::Pass)
    }

    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.steps
            .iter()
            .fold(Cow::Borrowed(text), |text, step| step.apply(text))
    }
}

/// A corpus whose document texts pass through a transform chain.
pub struct TransformedCorpus<'a> {
    inner: &'a dyn Corpus,
    chain: &'a TransformChain,
}

impl<'a> TransformedCorpus<'a> {
    pub fn new(inner: &'a dyn Corpus, chain: &'a TransformChain) -> Self {
        Self { inner, chain }
    }
}

impl Corpus for TransformedCorpus<'_> {
    fn documents(&self) -> Box<dyn Iterator<Item = Document> + Send + '_> {
        let chain = self.chain;
        Box::new(self.inner.documents().map(move |doc| Document {
            text: chain.apply(&doc.text).into_owned(),
            subjects: doc.subjects,
        }))
    }
}
