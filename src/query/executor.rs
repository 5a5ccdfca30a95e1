//! Document-at-a-time query evaluation.
//!
//! AND aligns every cursor on the same docID, cheapest (lowest df) cursor
//! first. OR walks the union: a two-pointer merge for two terms, a min-heap
//! of cursor heads for three or more. Both hand each matching document with
//! its per-term frequencies to a visitor, which either scores it into a
//! top-k heap or collects the docID.

use crate::error::Result;
use crate::index::reader::IndexReader;
use crate::index::types::DocId;
use crate::query::cursor::PostingsCursor;
use crate::query::parser::{BoolMode, DEFAULT_TOP_K, Query};
use crate::query::scorer::{Bm25, Bm25Params};
use crate::query::topk::{ScoredDoc, TopKHeap};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::ops::ControlFlow;
use tracing::debug;

/// One term's contribution to a matching document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermMatch {
    pub df: u64,
    pub tf: u32,
    /// The cursor's weight, computed once when the cursor was opened
    pub weight: f32,
}

/// A query result. Boolean queries carry no score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: Option<f32>,
}

impl From<ScoredDoc> for SearchHit {
    fn from(doc: ScoredDoc) -> Self {
        Self {
            doc_id: doc.doc_id,
            score: Some(doc.score),
        }
    }
}

fn term_match(cursor: &PostingsCursor<'_>) -> TermMatch {
    TermMatch {
        df: cursor.df(),
        tf: cursor.freq().unwrap_or(0),
        weight: cursor.weight(),
    }
}

/// DAAT intersection. Cursors are reordered by ascending df.
pub fn intersect<F>(cursors: &mut [PostingsCursor<'_>], mut visit: F) -> Result<()>
where
    F: FnMut(DocId, &[TermMatch]) -> Result<ControlFlow<()>>,
{
    if cursors.is_empty() {
        return Ok(());
    }
    cursors.sort_by_key(|c| c.df());
    let mut matches = Vec::with_capacity(cursors.len());

    'align: loop {
        let Some(target) = cursors[0].doc_id() else {
            return Ok(());
        };
        for i in 1..cursors.len() {
            cursors[i].advance_to(target)?;
            match cursors[i].doc_id() {
                None => return Ok(()),
                Some(doc) if doc > target => {
                    cursors[0].advance_to(doc)?;
                    continue 'align;
                }
                Some(_) => {}
            }
        }

        matches.clear();
        matches.extend(cursors.iter().map(term_match));
        if visit(target, &matches)?.is_break() {
            return Ok(());
        }
        for cursor in cursors.iter_mut() {
            cursor.advance()?;
        }
    }
}

/// DAAT union. A document present in several lists is visited once with
/// every matching term.
pub fn union<F>(cursors: &mut [PostingsCursor<'_>], mut visit: F) -> Result<()>
where
    F: FnMut(DocId, &[TermMatch]) -> Result<ControlFlow<()>>,
{
    match cursors.len() {
        0 => Ok(()),
        2 => {
            let (a, b) = cursors.split_at_mut(1);
            union_pair(&mut a[0], &mut b[0], visit)
        }
        _ => {
            let mut heap: BinaryHeap<Reverse<(DocId, usize)>> = cursors
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.doc_id().map(|d| Reverse((d, i))))
                .collect();
            let mut matched: Vec<usize> = Vec::with_capacity(cursors.len());
            let mut matches = Vec::with_capacity(cursors.len());

            while let Some(Reverse((doc, first))) = heap.pop() {
                matched.clear();
                matched.push(first);
                while let Some(&Reverse((next, i))) = heap.peek() {
                    if next != doc {
                        break;
                    }
                    heap.pop();
                    matched.push(i);
                }

                matches.clear();
                matches.extend(matched.iter().map(|&i| term_match(&cursors[i])));
                if visit(doc, &matches)?.is_break() {
                    return Ok(());
                }

                for &i in &matched {
                    cursors[i].advance()?;
                    if let Some(d) = cursors[i].doc_id() {
                        heap.push(Reverse((d, i)));
                    }
                }
            }
            Ok(())
        }
    }
}

fn union_pair<F>(a: &mut PostingsCursor<'_>, b: &mut PostingsCursor<'_>, mut visit: F) -> Result<()>
where
    F: FnMut(DocId, &[TermMatch]) -> Result<ControlFlow<()>>,
{
    loop {
        let flow = match (a.doc_id(), b.doc_id()) {
            (None, None) => return Ok(()),
            (Some(x), None) => {
                let flow = visit(x, &[term_match(a)])?;
                a.advance()?;
                flow
            }
            (None, Some(y)) => {
                let flow = visit(y, &[term_match(b)])?;
                b.advance()?;
                flow
            }
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Less => {
                    let flow = visit(x, &[term_match(a)])?;
                    a.advance()?;
                    flow
                }
                Ordering::Greater => {
                    let flow = visit(y, &[term_match(b)])?;
                    b.advance()?;
                    flow
                }
                Ordering::Equal => {
                    let flow = visit(x, &[term_match(a), term_match(b)])?;
                    a.advance()?;
                    b.advance()?;
                    flow
                }
            },
        };
        if flow.is_break() {
            return Ok(());
        }
    }
}

/// Evaluates queries against an open index.
///
/// Holds only shared, read-only state; every call builds its own cursors, so
/// one searcher can serve many threads at once.
pub struct Searcher<'a> {
    index: &'a IndexReader,
    bm25: Bm25,
}

impl<'a> Searcher<'a> {
    pub fn new(index: &'a IndexReader, params: Bm25Params) -> Self {
        let meta = index.meta();
        Self {
            index,
            bm25: Bm25::new(params, meta.doc_count, meta.avg_doc_len),
        }
    }

    pub fn bm25(&self) -> &Bm25 {
        &self.bm25
    }

    /// Open a cursor per query term. For AND, any absent term means no
    /// document can match, signalled by `None`; for OR absent terms are
    /// dropped.
    fn open_cursors<'q>(&'q self, query: &'q Query) -> Result<Option<Vec<PostingsCursor<'q>>>> {
        let lexicon = self.index.lexicon();
        let mut cursors = Vec::with_capacity(query.terms.len());
        for term in &query.terms {
            match lexicon.get(term) {
                Some(entry) => {
                    let cursor = PostingsCursor::open(term, entry, self.index.postings())?;
                    cursors.push(cursor.with_weight(self.bm25.idf(entry.df)));
                }
                None if query.mode == BoolMode::And => {
                    debug!(term = term.as_str(), "term not indexed, AND short-circuits");
                    return Ok(None);
                }
                None => debug!(term = term.as_str(), "term not indexed"),
            }
        }
        Ok(Some(cursors))
    }

    fn evaluate<F>(&self, mode: BoolMode, cursors: &mut [PostingsCursor<'_>], visit: F) -> Result<()>
    where
        F: FnMut(DocId, &[TermMatch]) -> Result<ControlFlow<()>>,
    {
        match mode {
            BoolMode::And => intersect(cursors, visit),
            BoolMode::Or => union(cursors, visit),
        }
    }

    /// Run a query.
    ///
    /// Ranked queries return the top k by BM25 score (descending, ties by
    /// ascending docID). Boolean queries return matching docIDs ascending,
    /// truncated to the limit if one is set. A matching docID without a doc
    /// length fails the query with `MissingDocLength`.
    pub fn search(&self, query: &Query) -> Result<Vec<SearchHit>> {
        let Some(mut cursors) = self.open_cursors(query)? else {
            return Ok(Vec::new());
        };
        if cursors.is_empty() {
            return Ok(Vec::new());
        }
        let doc_lengths = self.index.doc_lengths();

        if query.ranked {
            let mut top = TopKHeap::new(query.limit.unwrap_or(DEFAULT_TOP_K));
            let mut scored = 0u64;
            self.evaluate(query.mode, &mut cursors, |doc, matches| {
                let len = doc_lengths.require(doc)?;
                let score: f32 = matches
                    .iter()
                    .map(|m| self.bm25.term_score(m.weight, m.tf, len))
                    .sum();
                top.try_insert(ScoredDoc { doc_id: doc, score });
                scored += 1;
                Ok(ControlFlow::Continue(()))
            })?;
            debug!(terms = query.terms.len(), mode = %query.mode, scored, "ranked query evaluated");
            Ok(top.into_sorted_vec().into_iter().map(SearchHit::from).collect())
        } else {
            let limit = query.limit.unwrap_or(usize::MAX);
            let mut hits = Vec::new();
            if limit == 0 {
                return Ok(hits);
            }
            self.evaluate(query.mode, &mut cursors, |doc, _| {
                doc_lengths.require(doc)?;
                hits.push(SearchHit { doc_id: doc, score: None });
                Ok(if hits.len() >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })?;
            Ok(hits)
        }
    }
}
