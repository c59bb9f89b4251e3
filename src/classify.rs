//! Metaphor-signal classifier: case-insensitive substring match against a swappable vocabulary.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Pure text predicate. Implementations must not have side effects.
pub trait Classifier {
    fn classify(&self, text: &str) -> bool;
}

/// Terms whose presence marks a text as carrying a figurative signal.
/// Stored trimmed, lowercase, sorted and deduplicated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    terms: Vec<String>,
}

impl Vocabulary {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self { terms }
    }

    /// Newline-separated terms; blank lines and `#` comments are ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open vocabulary {}", path.display()))?;
        let mut terms = Vec::new();
        for line in BufReader::new(f).lines() {
            let line = line.with_context(|| format!("read vocabulary {}", path.display()))?;
            let t = line.trim();
            if t.is_empty() || t.starts_with('#') {
                continue;
            }
            terms.push(t.to_string());
        }
        Ok(Self::new(terms))
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Default for Vocabulary {
    /// Comparison and animacy cues: "like", "seems", "acts", "as if", ...
    fn default() -> Self {
        Self::new(["like", "seems", "feels", "acts", "is a", "become", "as if", "reminds"])
    }
}

/// Vocabulary compiled into a single case-insensitive alternation of escaped literals.
#[derive(Clone, Debug)]
pub struct KeywordClassifier {
    re: Option<Regex>, // None for an empty vocabulary: nothing matches
}

impl KeywordClassifier {
    pub fn new(vocab: &Vocabulary) -> Result<Self> {
        if vocab.is_empty() {
            return Ok(Self { re: None });
        }
        let pattern = vocab.terms().iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .context("compile vocabulary pattern")?;
        Ok(Self { re: Some(re) })
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> bool {
        self.re.as_ref().is_some_and(|re| re.is_match(text))
    }
}
