//! Run building and the end-to-end build pipeline.
//!
//! The coordinator reads the corpus sequentially, cuts it into batches and
//! hands each batch a disjoint `[start, end)` docID range before any worker
//! starts. Workers share nothing else: each one tokenizes its batch, writes
//! one sorted run and returns its documents' lengths. The doc-length table is
//! persisted once, after every worker has joined.

use crate::error::{IndexError, Result};
use crate::index::doclen::DocLengthTable;
use crate::index::merge::{self, FinalMerge};
use crate::index::run::{RunSummary, RunWriter, run_file_name};
use crate::index::types::*;
use crate::utils::progress::counted_bar;
use crate::utils::Tokenizer;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Streams documents from a text corpus, one document per line.
///
/// Lines may be tab-separated; the document text is the last column. Lines
/// that are not valid UTF-8 or have no text are skipped before docIDs are
/// assigned, so skipping never leaves gaps in the docID space.
pub struct CorpusReader<R> {
    reader: R,
    line: Vec<u8>,
    line_no: u64,
    skipped: u64,
}

impl CorpusReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::with_capacity(1 << 20, File::open(path)?)))
    }
}

impl<R: BufRead> CorpusReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Records skipped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next well-formed document text, or None at end of input
    pub fn next_document(&mut self) -> Result<Option<String>> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let mut end = self.line.len();
            while end > 0 && matches!(self.line[end - 1], b'\n' | b'\r') {
                end -= 1;
            }
            let record = &self.line[..end];
            let text = match memchr::memrchr(b'\t', record) {
                Some(tab) => &record[tab + 1..],
                None => record,
            };

            match std::str::from_utf8(text) {
                Ok(text) if !text.trim().is_empty() => return Ok(Some(text.to_string())),
                Ok(_) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, "skipping record without text");
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, error = %e, "skipping record with invalid UTF-8");
                }
            }
        }
    }

    /// Up to `max` documents
    pub fn next_batch(&mut self, max: usize) -> Result<Vec<String>> {
        let mut docs = Vec::with_capacity(max.min(1 << 16));
        while docs.len() < max {
            match self.next_document()? {
                Some(doc) => docs.push(doc),
                None => break,
            }
        }
        Ok(docs)
    }
}

/// A batch of documents with its pre-assigned docID range
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    pub start_doc: DocId,
    pub docs: Vec<String>,
}

impl Batch {
    pub fn doc_range(&self) -> Range<DocId> {
        self.start_doc..self.start_doc + self.docs.len() as DocId
    }
}

/// What one run-builder worker hands back to the coordinator
#[derive(Debug)]
pub struct RunOutput {
    pub run: RunSummary,
    pub doc_lengths: Vec<(DocId, u32)>,
}

/// Tokenize a batch and write it as one sorted run
pub fn build_run(batch: &Batch, tokenizer: &dyn Tokenizer, out: &Path) -> Result<RunOutput> {
    let mut postings: FxHashMap<String, Vec<Posting>> = FxHashMap::default();
    let mut doc_lengths = Vec::with_capacity(batch.docs.len());
    let mut counts: FxHashMap<String, u32> = FxHashMap::default();

    // Documents are visited in docID order, so every term's list stays sorted
    for (doc_id, text) in batch.doc_range().zip(&batch.docs) {
        let tokens = tokenizer.tokenize(text);
        doc_lengths.push((doc_id, u32::try_from(tokens.len()).unwrap_or(u32::MAX)));

        counts.clear();
        for token in tokens {
            *counts.entry(token).or_insert(0) += 1;
        }
        for (term, freq) in counts.drain() {
            postings
                .entry(term)
                .or_default()
                .push(Posting::new(doc_id, freq));
        }
    }

    let mut terms: Vec<(String, Vec<Posting>)> = postings.into_iter().collect();
    terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let mut writer = RunWriter::create(out)?;
    for (term, list) in &terms {
        writer.write_term(term, list)?;
    }
    let run = writer.finish()?;

    debug!(
        batch = batch.index,
        docs = batch.docs.len(),
        terms = run.terms,
        postings = run.postings,
        path = %run.path.display(),
        "run written"
    );
    Ok(RunOutput { run, doc_lengths })
}

/// Output of the run-building phase
#[derive(Debug)]
pub struct RunBuild {
    pub runs: Vec<PathBuf>,
    pub doc_lengths: DocLengthTable,
    pub skipped: u64,
}

/// Thread pool sized by `worker_count`
pub(crate) fn worker_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| IndexError::InvalidConfig(format!("cannot start {workers} workers: {e}")))
}

/// Reserve the docID range for the next `len` documents. DocIDs are u32 and
/// the document count must fit one too, so at most `DocId::MAX` documents
/// are accepted.
fn reserve_range(next_doc: &mut u64, len: usize) -> Result<DocId> {
    let end = *next_doc + len as u64;
    if end > DocId::MAX as u64 {
        return Err(IndexError::InvalidConfig(
            "corpus exceeds the 32-bit docID space".into(),
        ));
    }
    let start = *next_doc as DocId;
    *next_doc = end;
    Ok(start)
}

/// Remove meta.json so a directory being rebuilt is no longer a published index
pub fn unpublish(paths: &IndexPaths) -> Result<()> {
    let meta = paths.meta();
    if meta.exists() {
        std::fs::remove_file(&meta)?;
        info!(path = %meta.display(), "index unpublished");
    }
    Ok(())
}

/// Build sorted runs from a corpus and persist the doc-length table.
///
/// Batches are dispatched `worker_count` at a time so only that many batches
/// are held in memory. Any worker failure aborts the whole phase: the
/// doc-length table is not written and the runs are never marked complete.
/// A published index in the same directory is unpublished first, since its
/// doc-length table is about to be replaced.
pub fn build_runs(
    corpus: &Path,
    paths: &IndexPaths,
    config: &IndexConfig,
    tokenizer: &dyn Tokenizer,
    silent: bool,
) -> Result<RunBuild> {
    config.validate()?;
    let start = Instant::now();
    unpublish(paths)?;
    let runs_dir = paths.runs_dir();
    if runs_dir.exists() {
        std::fs::remove_dir_all(&runs_dir)?;
    }
    std::fs::create_dir_all(&runs_dir)?;

    let pool = worker_pool(config.worker_count)?;
    let mut reader = CorpusReader::open(corpus)?;
    let mut next_doc: u64 = 0;
    let mut next_batch = 0usize;
    let mut runs = Vec::new();
    let mut lengths: Vec<(DocId, u32)> = Vec::new();

    let pb = counted_bar(0, "Building runs...", silent);

    loop {
        // Range assignment happens here, before the wave's workers start
        let mut wave = Vec::with_capacity(config.worker_count);
        while wave.len() < config.worker_count {
            let docs = reader.next_batch(config.batch_size)?;
            if docs.is_empty() {
                break;
            }
            let start_doc = reserve_range(&mut next_doc, docs.len())?;
            wave.push(Batch {
                index: next_batch,
                start_doc,
                docs,
            });
            next_batch += 1;
        }
        if wave.is_empty() {
            break;
        }

        for batch in &wave {
            debug!(batch = batch.index, range = ?batch.doc_range(), "batch dispatched");
        }
        if let Some(pb) = &pb {
            pb.inc_length(wave.iter().map(|b| b.docs.len() as u64).sum());
        }

        let outputs = pool.install(|| {
            wave.par_iter()
                .map(|batch| {
                    let out = runs_dir.join(run_file_name(batch.index));
                    let output = build_run(batch, tokenizer, &out).map_err(|e| {
                        IndexError::WorkerFailed {
                            batch: batch.index,
                            source: Box::new(e),
                        }
                    })?;
                    if let Some(pb) = &pb {
                        pb.inc(batch.docs.len() as u64);
                    }
                    Ok(output)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        for output in outputs {
            runs.push(output.run.path);
            lengths.extend(output.doc_lengths);
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    // Single aggregation and persist, after every worker has joined
    let doc_lengths = DocLengthTable::from_pairs(lengths)?;
    doc_lengths.save(&paths.doc_lengths())?;
    merge::mark_complete(&runs_dir)?;

    info!(
        docs = doc_lengths.len(),
        runs = runs.len(),
        skipped = reader.skipped(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "run building complete"
    );

    Ok(RunBuild {
        runs,
        doc_lengths,
        skipped: reader.skipped(),
    })
}

/// Check that the doc-length table covers exactly the documents the final
/// merge wrote: keys are `[0, N)`, every posting's docID is below N and,
/// when no collision was coalesced, the lengths add up to the postings' tf.
pub fn check_doc_lengths(doc_lengths: &DocLengthTable, merged: &FinalMerge) -> Result<()> {
    if let Some(missing) = doc_lengths.first_missing() {
        return Err(IndexError::MissingDocLength(missing));
    }
    if let Some(max) = merged.max_doc_id {
        if max as u64 >= doc_lengths.len() as u64 {
            return Err(IndexError::MissingDocLength(max));
        }
    }
    if merged.collisions == 0 && merged.tokens != doc_lengths.total_length() {
        return Err(IndexError::DocLengthMismatch {
            table: doc_lengths.total_length(),
            postings: merged.tokens,
        });
    }
    Ok(())
}

/// Write meta.json, which marks the index as published. Refuses to publish
/// when the doc-length table does not match the postings.
pub fn publish(
    paths: &IndexPaths,
    config: &IndexConfig,
    doc_lengths: &DocLengthTable,
    merged: &FinalMerge,
    initial_runs: usize,
    final_runs: usize,
) -> Result<IndexMeta> {
    check_doc_lengths(doc_lengths, merged)?;
    let doc_count = u32::try_from(doc_lengths.len()).map_err(|_| {
        IndexError::InvalidConfig("document count exceeds the 32-bit docID space".into())
    })?;
    let meta = IndexMeta {
        version: FORMAT_VERSION,
        doc_count,
        term_count: merged.terms,
        posting_count: merged.postings,
        total_doc_length: doc_lengths.total_length(),
        avg_doc_len: doc_lengths.avg_len(),
        block_size: config.block_size,
        codec: config.codec,
        initial_runs,
        final_runs,
        created_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };
    meta.save(&paths.meta())?;
    Ok(meta)
}

/// Build a complete index: runs, layered merge, final merge, meta.json.
pub fn build_index(
    corpus: &Path,
    root: &Path,
    config: &IndexConfig,
    tokenizer: &dyn Tokenizer,
    silent: bool,
) -> Result<IndexMeta> {
    config.validate()?;
    let start = Instant::now();
    let paths = IndexPaths::new(root);
    std::fs::create_dir_all(root)?;

    // An existing meta.json would mark a half-rebuilt directory as published
    unpublish(&paths)?;

    let built = build_runs(corpus, &paths, config, tokenizer, silent)?;
    let initial_runs = built.runs.len();

    let layered = merge::merge_layered(built.runs, &paths, config, silent)?;
    let merged = merge::finalize(&layered, &paths, config, silent)?;
    let meta = publish(
        &paths,
        config,
        &built.doc_lengths,
        &merged,
        initial_runs,
        layered.len(),
    )?;

    if !config.keep_runs {
        std::fs::remove_dir_all(paths.runs_dir())?;
    }

    info!(
        docs = meta.doc_count,
        terms = meta.term_count,
        postings = meta.posting_count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "index published"
    );
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::run::RunReader;
    use crate::utils::SimpleTokenizer;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_corpus_reader_skips_malformed() {
        let mut input = b"1\tcat dog\n2\t   \n".to_vec();
        input.extend_from_slice(b"3\t\xff\xfe\n");
        input.extend_from_slice(b"plain text line\r\n4\tlast");
        let mut reader = CorpusReader::new(Cursor::new(input));

        let docs = reader.next_batch(10).unwrap();
        assert_eq!(docs, vec!["cat dog", "plain text line", "last"]);
        assert_eq!(reader.skipped(), 2);
        assert!(reader.next_document().unwrap().is_none());
    }

    #[test]
    fn test_build_run_sorted_with_lengths() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("r.run");
        let batch = Batch {
            index: 0,
            start_doc: 10,
            docs: vec!["dog cat dog".into(), "bird".into(), "!!!".into()],
        };

        let output = build_run(&batch, &SimpleTokenizer, &out).unwrap();
        assert_eq!(output.doc_lengths, vec![(10, 3), (11, 1), (12, 0)]);
        assert_eq!(output.run.terms, 3);

        let groups = RunReader::open(&out).unwrap().read_all().unwrap();
        let terms: Vec<&str> = groups.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["bird", "cat", "dog"]);
        assert_eq!(groups[2].1, vec![Posting::new(10, 2)]);
    }

    #[test]
    fn test_build_runs_assigns_disjoint_ranges() {
        let dir = tempdir().unwrap();
        let corpus = dir.path().join("corpus.txt");
        std::fs::write(&corpus, "a b\nb c\nc d\nd e\ne f\n").unwrap();
        let paths = IndexPaths::new(dir.path().join("idx"));
        let config = IndexConfig {
            batch_size: 2,
            worker_count: 2,
            ..IndexConfig::default()
        };

        let built = build_runs(&corpus, &paths, &config, &SimpleTokenizer, true).unwrap();
        assert_eq!(built.runs.len(), 3);
        assert_eq!(built.doc_lengths.contiguous_range(), Some(0..5));

        let third = RunReader::open(&built.runs[2]).unwrap().read_all().unwrap();
        assert_eq!(third[0], ("e".to_string(), vec![Posting::new(4, 1)]));

        let persisted = DocLengthTable::load(&paths.doc_lengths()).unwrap();
        assert_eq!(persisted, built.doc_lengths);
    }

    #[test]
    fn test_build_runs_marks_complete_and_unpublishes() {
        let dir = tempdir().unwrap();
        let corpus = dir.path().join("corpus.txt");
        std::fs::write(&corpus, "cat dog\ndog bird\n").unwrap();
        let root = dir.path().join("idx");
        build_index(&corpus, &root, &IndexConfig::default(), &SimpleTokenizer, true).unwrap();
        let paths = IndexPaths::new(&root);
        assert!(paths.meta().exists());

        build_runs(&corpus, &paths, &IndexConfig::default(), &SimpleTokenizer, true).unwrap();
        assert!(!paths.meta().exists());
        assert!(merge::is_complete(&paths.runs_dir()));
        assert_eq!(merge::latest_runs(&paths).unwrap().len(), 1);
    }

    #[test]
    fn test_reserve_range_limit() {
        let mut next_doc = DocId::MAX as u64 - 3;
        assert_eq!(reserve_range(&mut next_doc, 2).unwrap(), DocId::MAX - 3);
        assert_eq!(next_doc, DocId::MAX as u64 - 1);
        // The last docID below MAX still fits; the count would not
        assert_eq!(reserve_range(&mut next_doc, 1).unwrap(), DocId::MAX - 1);
        assert!(matches!(
            reserve_range(&mut next_doc, 1),
            Err(IndexError::InvalidConfig(_))
        ));
        assert_eq!(next_doc, DocId::MAX as u64);
    }

    fn final_merge(max_doc_id: Option<DocId>, tokens: u64) -> FinalMerge {
        FinalMerge {
            max_doc_id,
            tokens,
            ..FinalMerge::default()
        }
    }

    #[test]
    fn test_check_doc_lengths() {
        let table = DocLengthTable::from_pairs([(0, 2), (1, 0), (2, 3)]).unwrap();
        check_doc_lengths(&table, &final_merge(Some(2), 5)).unwrap();
        check_doc_lengths(&DocLengthTable::new(), &final_merge(None, 0)).unwrap();

        assert!(matches!(
            check_doc_lengths(&table, &final_merge(Some(3), 5)),
            Err(IndexError::MissingDocLength(3))
        ));
        assert!(matches!(
            check_doc_lengths(&table, &final_merge(Some(2), 9)),
            Err(IndexError::DocLengthMismatch { table: 5, postings: 9 })
        ));
        let gappy = DocLengthTable::from_pairs([(0, 2), (2, 3)]).unwrap();
        assert!(matches!(
            check_doc_lengths(&gappy, &final_merge(Some(2), 5)),
            Err(IndexError::MissingDocLength(1))
        ));

        // Coalesced collisions inflate tf, so only the docID bound applies
        let collided = FinalMerge {
            collisions: 1,
            ..final_merge(Some(2), 9)
        };
        check_doc_lengths(&table, &collided).unwrap();
    }

    #[test]
    fn test_publish_refuses_mismatched_lengths() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let table = DocLengthTable::from_pairs([(0, 1)]).unwrap();
        let err = publish(
            &paths,
            &IndexConfig::default(),
            &table,
            &final_merge(Some(4), 5),
            1,
            1,
        )
        .unwrap_err();
        assert!(err.is_consistency_error());
        assert!(!paths.meta().exists());
    }
}
