//! Query construction from user text

use crate::error::IndexError;
use crate::utils::Tokenizer;
use rustc_hash::FxHashSet;
use std::fmt;
use std::str::FromStr;

/// Number of results returned by ranked queries when no limit is given
pub const DEFAULT_TOP_K: usize = 10;

/// How query terms combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolMode {
    /// Documents containing every term
    And,
    /// Documents containing at least one term
    #[default]
    Or,
}

impl fmt::Display for BoolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolMode::And => write!(f, "and"),
            BoolMode::Or => write!(f, "or"),
        }
    }
}

impl FromStr for BoolMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(BoolMode::And),
            "or" => Ok(BoolMode::Or),
            other => Err(IndexError::InvalidConfig(format!(
                "unknown query mode '{other}' (expected 'and' or 'or')"
            ))),
        }
    }
}

/// A parsed query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Distinct terms in first-occurrence order
    pub terms: Vec<String>,
    pub mode: BoolMode,
    /// Score with BM25 and return the top k; otherwise return matching
    /// docIDs in ascending order
    pub ranked: bool,
    pub limit: Option<usize>,
}

impl Query {
    /// Build a ranked query from already-normalized terms
    pub fn new<I, S>(terms: I, mode: BoolMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = FxHashSet::default();
        let terms = terms
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| seen.insert(t.clone()))
            .collect();
        Self {
            terms,
            mode,
            ranked: true,
            limit: None,
        }
    }

    /// Tokenize query text with the tokenizer that built the index
    pub fn parse(text: &str, mode: BoolMode, tokenizer: &dyn Tokenizer) -> Self {
        Self::new(tokenizer.tokenize(text), mode)
    }

    /// Return docIDs only, in ascending order
    pub fn boolean(mut self) -> Self {
        self.ranked = false;
        self
    }

    pub fn with_limit(mut self, k: usize) -> Self {
        self.limit = Some(k);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
