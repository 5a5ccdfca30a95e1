//! Two-phase external merge.
//!
//! Phase A reduces the run count by merging buckets of up to `fanin` runs in
//! parallel; each round's outputs feed the next round. Phase B is a single
//! global merge that writes the blocked postings file and the lexicon. Both
//! phases share [`KWayMerge`], a heap keyed by `(term, docID, source)`.

use crate::error::{IndexError, Result};
use crate::index::build::{unpublish, worker_pool};
use crate::index::lexicon::Lexicon;
use crate::index::run::{PostingSource, RunReader, RunSummary, RunWriter, run_file_name};
use crate::index::types::*;
use crate::index::writer::PostingsWriter;
use crate::utils::progress::{counted_bar, spinner};
use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Heap key; the source index makes ties between sources deterministic
type HeapKey = Reverse<(Arc<str>, DocId, usize)>;

/// K-way merge over sorted posting sources.
///
/// A `(term, docID)` pair present in more than one source is coalesced into
/// one posting with the frequencies summed, or rejected in strict mode.
pub struct KWayMerge<S> {
    sources: Vec<S>,
    heap: BinaryHeap<HeapKey>,
    strict: bool,
    collisions: u64,
}

impl<S: PostingSource> KWayMerge<S> {
    pub fn new(sources: Vec<S>, strict: bool) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            if let Some((term, posting)) = source.current() {
                heap.push(Reverse((term.clone(), posting.doc_id, i)));
            }
        }
        Self {
            sources,
            heap,
            strict,
            collisions: 0,
        }
    }

    /// Number of coalesced `(term, docID)` collisions so far
    pub fn collisions(&self) -> u64 {
        self.collisions
    }

    /// Term of the next posting, without consuming it
    pub fn peek_term(&self) -> Option<&Arc<str>> {
        self.heap.peek().map(|Reverse((term, _, _))| term)
    }

    /// Take the current posting of `source` and push its next head
    fn take(&mut self, source: usize) -> Result<u32> {
        let src = &mut self.sources[source];
        let freq = src.current().map(|(_, p)| p.freq).unwrap_or(0);
        src.advance()?;
        if let Some((term, posting)) = src.current() {
            self.heap.push(Reverse((term.clone(), posting.doc_id, source)));
        }
        Ok(freq)
    }

    /// Globally smallest `(term, posting)`, with collisions coalesced
    pub fn next_posting(&mut self) -> Result<Option<(Arc<str>, Posting)>> {
        let Some(Reverse((term, doc_id, source))) = self.heap.pop() else {
            return Ok(None);
        };
        let mut freq = self.take(source)?;

        while let Some(Reverse((next_term, next_doc, _))) = self.heap.peek() {
            if *next_doc != doc_id || **next_term != *term {
                break;
            }
            let Some(Reverse((_, _, other))) = self.heap.pop() else {
                break;
            };
            if self.strict {
                return Err(IndexError::DocIdCollision {
                    term: term.to_string(),
                    doc_id,
                });
            }
            self.collisions += 1;
            freq = freq.saturating_add(self.take(other)?);
        }

        Ok(Some((term, Posting::new(doc_id, freq))))
    }

    /// Complete postings list of the next term
    pub fn next_term(&mut self) -> Result<Option<(Arc<str>, Vec<Posting>)>> {
        let Some((term, first)) = self.next_posting()? else {
            return Ok(None);
        };
        let mut postings = vec![first];
        while self.peek_term().is_some_and(|next| *next == term) {
            if let Some((_, posting)) = self.next_posting()? {
                postings.push(posting);
            }
        }
        Ok(Some((term, postings)))
    }
}

fn open_runs(inputs: &[PathBuf]) -> Result<Vec<RunReader>> {
    inputs.iter().map(|p| RunReader::open(p)).collect()
}

/// Merge a set of runs into one new run
pub fn merge_runs(inputs: &[PathBuf], output: &Path, strict: bool) -> Result<(RunSummary, u64)> {
    let mut merge = KWayMerge::new(open_runs(inputs)?, strict);
    let mut writer = RunWriter::create(output)?;
    while let Some((term, postings)) = merge.next_term()? {
        writer.write_term(&term, &postings)?;
    }
    let summary = writer.finish()?;
    debug!(
        inputs = inputs.len(),
        terms = summary.terms,
        postings = summary.postings,
        path = %output.display(),
        "runs merged"
    );
    Ok((summary, merge.collisions()))
}

/// Numbers of the `round_NNNN` directories under the runs directory
fn round_numbers(paths: &IndexPaths) -> Result<Vec<usize>> {
    let runs_dir = paths.runs_dir();
    if !runs_dir.exists() {
        return Ok(Vec::new());
    }
    let mut rounds = Vec::new();
    for entry in std::fs::read_dir(&runs_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(n) = name
            .to_str()
            .and_then(|n| n.strip_prefix("round_"))
            .and_then(|n| n.parse().ok())
        {
            rounds.push(n);
        }
    }
    rounds.sort_unstable();
    Ok(rounds)
}

/// Run files directly inside `dir`, sorted by name
pub fn list_runs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut runs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "run") {
            runs.push(path);
        }
    }
    runs.sort();
    Ok(runs)
}

/// Marker written into a run directory once every run in it is complete
const COMPLETE_MARKER: &str = "DONE";

/// Mark a run directory as holding a complete run set
pub fn mark_complete(dir: &Path) -> Result<()> {
    std::fs::write(dir.join(COMPLETE_MARKER), b"")?;
    Ok(())
}

pub fn is_complete(dir: &Path) -> bool {
    dir.join(COMPLETE_MARKER).is_file()
}

/// Remove the output of a round that did not finish
fn discard_round(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "cannot remove incomplete merge round");
    }
}

/// The most merged complete set of runs: the newest completed round that
/// holds runs, or the run builder's output if no round has completed.
/// Directories without a completion marker are ignored.
pub fn latest_runs(paths: &IndexPaths) -> Result<Vec<PathBuf>> {
    for round in round_numbers(paths)?.into_iter().rev() {
        let dir = paths.round_dir(round);
        if !is_complete(&dir) {
            debug!(dir = %dir.display(), "skipping incomplete merge round");
            continue;
        }
        let runs = list_runs(&dir)?;
        if !runs.is_empty() {
            return Ok(runs);
        }
    }
    let runs_dir = paths.runs_dir();
    if is_complete(&runs_dir) {
        list_runs(&runs_dir)
    } else {
        Ok(Vec::new())
    }
}

/// Phase A: layered parallel merge.
///
/// Each round merges buckets of up to `fanin` runs in parallel. Rounds stop
/// once at most `fanin` runs remain, or after `merge_rounds` rounds if set.
/// Round directories continue after any left by an earlier merge. A round
/// is marked complete only after every bucket succeeded; a failed round's
/// directory is removed before the error is returned. Intermediate rounds'
/// outputs are deleted once consumed unless `keep_runs`.
pub fn merge_layered(
    inputs: Vec<PathBuf>,
    paths: &IndexPaths,
    config: &IndexConfig,
    silent: bool,
) -> Result<Vec<PathBuf>> {
    config.validate()?;
    let pool = worker_pool(config.worker_count)?;
    let mut current = inputs;
    let first_dir = round_numbers(paths)?.last().map_or(0, |r| r + 1);
    let mut round = 0usize;
    let mut collisions = 0u64;

    while current.len() > config.fanin && config.merge_rounds.is_none_or(|max| round < max) {
        let start = Instant::now();
        let dir = paths.round_dir(first_dir + round);
        std::fs::create_dir_all(&dir)?;

        let buckets: Vec<&[PathBuf]> = current.chunks(config.fanin).collect();
        let pb = counted_bar(buckets.len() as u64, "Merging runs...", silent);

        let outputs = pool
            .install(|| {
                buckets
                    .par_iter()
                    .enumerate()
                    .map(|(i, bucket)| {
                        let out = dir.join(run_file_name(i));
                        let result = merge_runs(bucket, &out, config.strict_collisions);
                        if let Some(pb) = &pb {
                            pb.inc(1);
                        }
                        result
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .and_then(|outputs| {
                mark_complete(&dir)?;
                Ok(outputs)
            });
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        let outputs = match outputs {
            Ok(outputs) => outputs,
            Err(e) => {
                discard_round(&dir);
                return Err(e);
            }
        };

        let round_collisions: u64 = outputs.iter().map(|(_, c)| c).sum();
        collisions += round_collisions;
        info!(
            round = first_dir + round,
            inputs = current.len(),
            outputs = outputs.len(),
            collisions = round_collisions,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "merge round complete"
        );

        if round > 0 && !config.keep_runs {
            for path in &current {
                std::fs::remove_file(path)?;
            }
        }

        current = outputs.into_iter().map(|(summary, _)| summary.path).collect();
        round += 1;
    }

    if collisions > 0 {
        warn!(collisions, "duplicate (term, docID) postings were summed during merge");
    }
    Ok(current)
}

/// Totals from the final merge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FinalMerge {
    pub terms: u64,
    pub postings: u64,
    pub bytes: u64,
    pub collisions: u64,
    /// Largest docID written to the postings file
    pub max_doc_id: Option<DocId>,
    /// Sum of every posting's term frequency
    pub tokens: u64,
}

/// Phase B: merge every remaining run into the postings file and lexicon.
///
/// Strictly sequential: one writer owns the postings file offset and terms
/// are flushed in global order as soon as the next term appears at the top
/// of the heap. Any published meta.json is removed before the postings file
/// is rewritten.
pub fn finalize(
    runs: &[PathBuf],
    paths: &IndexPaths,
    config: &IndexConfig,
    silent: bool,
) -> Result<FinalMerge> {
    let start = Instant::now();
    unpublish(paths)?;
    let mut merge = KWayMerge::new(open_runs(runs)?, config.strict_collisions);
    let mut writer = PostingsWriter::create(&paths.postings(), config.block_size, config.codec)?;
    let mut lexicon = Lexicon::new();
    let mut max_doc_id: Option<DocId> = None;
    let mut tokens = 0u64;

    let sp = spinner("Writing postings...", silent);
    while let Some((term, postings)) = merge.next_term()? {
        tokens += postings.iter().map(|p| p.freq as u64).sum::<u64>();
        if let Some(last) = postings.last() {
            max_doc_id = max_doc_id.max(Some(last.doc_id));
        }
        let entry = writer.add_term(&term, &postings)?;
        lexicon.insert(term.to_string(), entry);
        if let Some(sp) = &sp {
            sp.inc(1);
        }
    }
    if let Some(sp) = sp {
        sp.finish_and_clear();
    }

    let postings = writer.postings_written();
    let bytes = writer.finish()?;
    lexicon.save(&paths.lexicon())?;

    if merge.collisions() > 0 {
        warn!(
            collisions = merge.collisions(),
            "duplicate (term, docID) postings were summed in the final merge"
        );
    }
    info!(
        runs = runs.len(),
        terms = lexicon.len(),
        postings,
        bytes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "final merge complete"
    );

    Ok(FinalMerge {
        terms: lexicon.len() as u64,
        postings,
        bytes,
        collisions: merge.collisions(),
        max_doc_id,
        tokens,
    })
}
