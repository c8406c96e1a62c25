//! Text analyzers. Backends that need tokens ask the project's analyzer; the
//! orchestration code never touches raw text itself.

use crate::error::{Result, SuggestError};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_TOKEN_MIN_LENGTH: usize = 3;

pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    fn tokenize_words(&self, text: &str) -> Vec<String>;
}

/// Lower-cases and splits on anything that is not alphanumeric. Tokens
/// shorter than `token_min_length` or without a letter are dropped.
#[derive(Debug, Clone)]
pub struct SimpleAnalyzer {
    token_min_length: usize,
}

impl SimpleAnalyzer {
    pub fn new(token_min_length: usize) -> Self {
        Self { token_min_length }
    }
}

impl Default for SimpleAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_MIN_LENGTH)
    }
}

impl Analyzer for SimpleAnalyzer {
    fn name(&self) -> &str {
        "simple"
    }

    fn tokenize_words(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= self.token_min_length)
            .filter(|t| t.chars().any(char::is_alphabetic))
            .map(str::to_lowercase)
            .collect()
    }
}

/// Parses `name` or `name(key=value,...)`.
fn split_spec(spec: &str) -> Result<(&str, HashMap<&str, &str>)> {
    let spec = spec.trim();
    let Some(open) = spec.find('(') else {
        return Ok((spec, HashMap::new()));
    };
    let args = spec[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| SuggestError::Configuration(format!("unbalanced analyzer spec '{spec}'")))?;
    let mut params = HashMap::new();
    for arg in args.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        let (key, value) = arg.split_once('=').ok_or_else(|| {
            SuggestError::Configuration(format!("analyzer argument '{arg}' is not key=value"))
        })?;
        params.insert(key.trim(), value.trim());
    }
    Ok((spec[..open].trim(), params))
}

pub fn get_analyzer(spec: &str) -> Result<Arc<dyn Analyzer>> {
    let (name, params) = split_spec(spec)?;
    match name {
        "simple" => {
            let mut min_len = DEFAULT_TOKEN_MIN_LENGTH;
            for (key, value) in params {
                match key {
                    "token_min_length" => {
                        min_len = value.parse().map_err(|_| {
                            SuggestError::Configuration(format!(
                                "token_min_length must be an integer, got '{value}'"
                            ))
                        })?;
                    }
                    other => {
                        return Err(SuggestError::Configuration(format!(
                            "unknown analyzer parameter '{other}'"
                        )))
                    }
                }
            }
            Ok(Arc::new(SimpleAnalyzer::new(min_len)))
        }
        other => Err(SuggestError::Configuration(format!(
            "unsupported analyzer '{other}'"
        ))),
    }
}
