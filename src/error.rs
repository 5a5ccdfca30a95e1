use crate::index::types::DocId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or querying an index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt run {path} at byte {offset}: {reason}")]
    CorruptRun {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("Corrupt block {block} of term '{term}': {reason}")]
    CorruptBlock {
        term: String,
        block: usize,
        reason: String,
    },

    #[error("Bad header in {path}: {reason}")]
    BadHeader { path: PathBuf, reason: String },

    #[error("Index inconsistency: doc {0} appears in postings but has no length")]
    MissingDocLength(DocId),

    #[error("Index inconsistency: doc lengths total {table} tokens but postings hold {postings}")]
    DocLengthMismatch { table: u64, postings: u64 },

    #[error("Doc {0} was assigned a length twice")]
    DuplicateDocLength(DocId),

    #[error("Duplicate posting for term '{term}', doc {doc_id} across merge inputs")]
    DocIdCollision { term: String, doc_id: DocId },

    #[error("Run builder worker for batch {batch} failed: {source}")]
    WorkerFailed {
        batch: usize,
        #[source]
        source: Box<IndexError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Build a `CorruptBlock` error
    pub fn corrupt_block(term: &str, block: usize, reason: impl Into<String>) -> Self {
        IndexError::CorruptBlock {
            term: term.to_string(),
            block,
            reason: reason.into(),
        }
    }

    /// True for errors that mean the persisted index disagrees with itself,
    /// as opposed to I/O or configuration problems.
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            IndexError::MissingDocLength(_)
                | IndexError::DocLengthMismatch { .. }
                | IndexError::CorruptBlock { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::MissingDocLength(42);
        assert_eq!(
            err.to_string(),
            "Index inconsistency: doc 42 appears in postings but has no length"
        );
    }

    #[test]
    fn test_consistency_errors() {
        assert!(IndexError::MissingDocLength(1).is_consistency_error());
        assert!(IndexError::DocLengthMismatch { table: 3, postings: 4 }.is_consistency_error());
        assert!(IndexError::corrupt_block("cat", 0, "truncated").is_consistency_error());
        assert!(!IndexError::InvalidConfig("fanin".into()).is_consistency_error());
    }

    #[test]
    fn test_worker_failed_wraps_source() {
        let err = IndexError::WorkerFailed {
            batch: 3,
            source: Box::new(IndexError::InvalidConfig("x".into())),
        };
        assert!(err.to_string().contains("batch 3"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
