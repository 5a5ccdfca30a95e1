use crate::error::{IndexError, Result};
use crate::index::run::{PostingSource, RunReader};
use crate::index::types::{DocId, FORMAT_VERSION};
use crate::utils::{read_u32_le, read_u64_le, write_u32_le, write_u64_le};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::info;

const DOCLEN_MAGIC: &[u8; 4] = b"DLN1";

/// Persistent docID -> length (token count) map used for BM25 normalization
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocLengthTable {
    lengths: FxHashMap<DocId, u32>,
    total_length: u64,
}

impl DocLengthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document's length. Each docID may be recorded once.
    pub fn insert(&mut self, doc_id: DocId, length: u32) -> Result<()> {
        if self.lengths.insert(doc_id, length).is_some() {
            return Err(IndexError::DuplicateDocLength(doc_id));
        }
        self.total_length += length as u64;
        Ok(())
    }

    /// Aggregate per-worker results into one table
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (DocId, u32)>,
    {
        let mut table = Self::new();
        for (doc_id, length) in pairs {
            table.insert(doc_id, length)?;
        }
        Ok(table)
    }

    pub fn get(&self, doc_id: DocId) -> Option<u32> {
        self.lengths.get(&doc_id).copied()
    }

    /// Length of a document that appears in postings; absence is an
    /// index-consistency error
    pub fn require(&self, doc_id: DocId) -> Result<u32> {
        self.get(doc_id).ok_or(IndexError::MissingDocLength(doc_id))
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Mean document length, 0.0 for an empty table
    pub fn avg_len(&self) -> f64 {
        if self.lengths.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.lengths.len() as f64
        }
    }

    /// Sorted docIDs
    pub fn doc_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.lengths.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The contiguous docID range covered by the table, if the keys form one
    pub fn contiguous_range(&self) -> Option<Range<DocId>> {
        if self.lengths.is_empty() {
            return Some(0..0);
        }
        let min = *self.lengths.keys().min()?;
        let max = *self.lengths.keys().max()?;
        (max as u64 - min as u64 + 1 == self.lengths.len() as u64).then(|| min..max + 1)
    }

    /// Smallest docID in `[0, len)` without a length; None when the keys
    /// are exactly `[0, len)`
    pub fn first_missing(&self) -> Option<DocId> {
        self.doc_ids()
            .into_iter()
            .zip(0..)
            .find(|&(doc_id, expected)| doc_id != expected)
            .map(|(_, expected)| expected)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(DOCLEN_MAGIC)?;
        write_u32_le(&mut file, FORMAT_VERSION)?;
        write_u64_le(&mut file, self.lengths.len() as u64)?;

        for doc_id in self.doc_ids() {
            write_u32_le(&mut file, doc_id)?;
            write_u32_le(&mut file, self.lengths[&doc_id])?;
        }

        file.flush()?;
        file.get_ref().sync_all()?;
        info!(docs = self.lengths.len(), path = %path.display(), "doc lengths saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let bad = |reason: String| IndexError::BadHeader {
            path: path.to_path_buf(),
            reason,
        };

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).map_err(|e| bad(e.to_string()))?;
        if &magic != DOCLEN_MAGIC {
            return Err(bad("not a doc-length file".into()));
        }
        let version = read_u32_le(&mut file).map_err(|e| bad(e.to_string()))?;
        if version != FORMAT_VERSION {
            return Err(bad(format!("unsupported version {version}")));
        }
        let count = read_u64_le(&mut file).map_err(|e| bad(e.to_string()))?;

        let mut table = Self::new();
        table.lengths.reserve(count.min(1 << 24) as usize);
        for _ in 0..count {
            let doc_id = read_u32_le(&mut file).map_err(|e| bad(e.to_string()))?;
            let length = read_u32_le(&mut file).map_err(|e| bad(e.to_string()))?;
            table.insert(doc_id, length)?;
        }
        Ok(table)
    }

    /// Recover a table from runs by summing term frequencies per document.
    ///
    /// Documents without any token never reach a run. Those below the
    /// largest docID seen get length 0; trailing ones cannot be recovered.
    pub fn rebuild_from_runs(runs: &[PathBuf]) -> Result<Self> {
        let mut sums: FxHashMap<DocId, u64> = FxHashMap::default();
        for path in runs {
            let mut reader = RunReader::open(path)?;
            while let Some((_, posting)) = reader.current() {
                *sums.entry(posting.doc_id).or_default() += posting.freq as u64;
                reader.advance()?;
            }
        }

        let mut table = Self::new();
        let max_doc = sums.keys().max().copied();
        for (doc_id, sum) in sums {
            table.insert(doc_id, sum.min(u32::MAX as u64) as u32)?;
        }
        if let Some(max_doc) = max_doc {
            for doc_id in 0..max_doc {
                if table.get(doc_id).is_none() {
                    table.insert(doc_id, 0)?;
                }
            }
        }
        info!(docs = table.len(), runs = runs.len(), "doc lengths rebuilt from runs");
        Ok(table)
    }
}
