//! Consistency check of a published index.
//!
//! Decodes every postings list and cross-checks it against the doc-length
//! table: every docID in postings must have a length, the table must cover
//! exactly `[0, doc_count)`, and each stored length must equal the sum of the
//! document's term frequencies.

use crate::error::Result;
use crate::index::reader::IndexReader;
use crate::index::types::DocId;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Mismatches kept per category for reporting
const SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LengthMismatch {
    pub doc_id: DocId,
    pub stored: u32,
    pub tf_sum: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptTerm {
    pub term: String,
    pub error: String,
}

/// Outcome of [`verify_index`]
#[derive(Debug, Default, Clone, Serialize)]
pub struct VerifyReport {
    pub doc_count: u32,
    pub table_entries: usize,
    pub terms_checked: usize,
    pub postings_checked: u64,
    /// Distinct docIDs seen in postings
    pub docs_in_postings: usize,
    /// Table keys are exactly `[0, doc_count)`
    pub contiguous: bool,
    /// Sum of lexicon df matches meta.json
    pub posting_count_matches: bool,
    pub missing_length_count: u64,
    pub missing_lengths: Vec<DocId>,
    pub length_mismatch_count: u64,
    pub length_mismatches: Vec<LengthMismatch>,
    pub corrupt_term_count: u64,
    pub corrupt_terms: Vec<CorruptTerm>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.contiguous
            && self.posting_count_matches
            && self.missing_length_count == 0
            && self.length_mismatch_count == 0
            && self.corrupt_term_count == 0
    }
}

type Partial = (FxHashMap<DocId, u64>, u64, Vec<CorruptTerm>);

fn merge_partials(mut a: Partial, b: Partial) -> Partial {
    for (doc, sum) in b.0 {
        *a.0.entry(doc).or_insert(0) += sum;
    }
    a.1 += b.1;
    a.2.extend(b.2);
    a
}

/// Verify the index in `root`
pub fn verify_index(root: &Path) -> Result<VerifyReport> {
    let reader = IndexReader::open(root)?;
    let meta = reader.meta();
    let table = reader.doc_lengths();
    let postings = reader.postings();

    let terms: Vec<_> = reader.lexicon().iter().collect();
    let (sums, postings_checked, mut corrupt) = terms
        .par_iter()
        .fold(
            || (FxHashMap::default(), 0u64, Vec::new()),
            |mut acc: Partial, (term, entry)| {
                match postings.read_full(term, entry) {
                    Ok(list) => {
                        acc.1 += list.len() as u64;
                        for p in list {
                            *acc.0.entry(p.doc_id).or_insert(0) += p.freq as u64;
                        }
                    }
                    Err(e) => acc.2.push(CorruptTerm {
                        term: term.to_string(),
                        error: e.to_string(),
                    }),
                }
                acc
            },
        )
        .reduce(|| (FxHashMap::default(), 0, Vec::new()), merge_partials);

    let mut report = VerifyReport {
        doc_count: meta.doc_count,
        table_entries: table.len(),
        terms_checked: terms.len(),
        postings_checked,
        docs_in_postings: sums.len(),
        contiguous: table.len() as u64 == meta.doc_count as u64
            && table.contiguous_range() == Some(0..meta.doc_count),
        posting_count_matches: reader.lexicon().total_postings() == meta.posting_count,
        ..VerifyReport::default()
    };

    corrupt.sort_by(|a, b| a.term.cmp(&b.term));
    report.corrupt_term_count = corrupt.len() as u64;
    corrupt.truncate(SAMPLE_LIMIT);
    report.corrupt_terms = corrupt;

    let mut in_postings: Vec<DocId> = sums.keys().copied().collect();
    in_postings.sort_unstable();
    for doc in in_postings {
        if table.get(doc).is_none() {
            report.missing_length_count += 1;
            if report.missing_lengths.len() < SAMPLE_LIMIT {
                report.missing_lengths.push(doc);
            }
        }
    }

    for doc in table.doc_ids() {
        let stored = table.get(doc).unwrap_or(0);
        let tf_sum = sums.get(&doc).copied().unwrap_or(0);
        if stored as u64 != tf_sum {
            report.length_mismatch_count += 1;
            if report.length_mismatches.len() < SAMPLE_LIMIT {
                report.length_mismatches.push(LengthMismatch {
                    doc_id: doc,
                    stored,
                    tf_sum,
                });
            }
        }
    }

    info!(
        terms = report.terms_checked,
        postings = report.postings_checked,
        ok = report.is_ok(),
        "index verified"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build::build_index;
    use crate::index::doclen::DocLengthTable;
    use crate::index::types::{IndexConfig, IndexPaths};
    use crate::utils::SimpleTokenizer;
    use tempfile::tempdir;

    fn small_index(dir: &Path) -> IndexPaths {
        let corpus = dir.join("corpus.txt");
        std::fs::write(&corpus, "cat dog\ndog bird\ncat bird dog\n").unwrap();
        let root = dir.join("idx");
        build_index(&corpus, &root, &IndexConfig::default(), &SimpleTokenizer, true).unwrap();
        IndexPaths::new(root)
    }

    #[test]
    fn test_clean_index_verifies() {
        let dir = tempdir().unwrap();
        let paths = small_index(dir.path());
        let report = verify_index(&paths.root).unwrap();
        assert!(report.is_ok(), "{report:?}");
        assert_eq!(report.docs_in_postings, 3);
        assert_eq!(report.postings_checked, 7);
    }

    #[test]
    fn test_missing_and_wrong_lengths_reported() {
        let dir = tempdir().unwrap();
        let paths = small_index(dir.path());
        DocLengthTable::from_pairs([(0, 2), (1, 5)])
            .unwrap()
            .save(&paths.doc_lengths())
            .unwrap();

        let report = verify_index(&paths.root).unwrap();
        assert!(!report.is_ok());
        assert!(!report.contiguous);
        assert_eq!(report.missing_lengths, vec![2]);
        assert_eq!(
            report.length_mismatches,
            vec![LengthMismatch {
                doc_id: 1,
                stored: 5,
                tf_sum: 2
            }]
        );
    }
}
