//! # trawl - disk-resident inverted index
//!
//! trawl builds an inverted index over a document collection too large for
//! memory and answers Boolean and BM25-ranked queries against it.
//!
//! ## Architecture
//!
//! - [`index`] - the build pipeline and the on-disk formats: run building,
//!   the two-phase external merge, the blocked postings store, the lexicon
//!   and the doc-length table
//! - [`query`] - document-at-a-time cursors, Boolean AND/OR and BM25 top-k
//! - [`output`] - terminal formatting for the CLI
//! - [`utils`] - varbyte encoding, tokenizer, progress bars
//!
//! ## Quick Start
//!
//! ```ignore
//! use trawl::index::{build_index, IndexConfig, IndexReader};
//! use trawl::query::{Bm25Params, BoolMode, Query, Searcher};
//! use trawl::utils::SimpleTokenizer;
//! use std::path::Path;
//!
//! let config = IndexConfig::default();
//! build_index(Path::new("corpus.tsv"), Path::new("index"), &config, &SimpleTokenizer, true)?;
//!
//! let reader = IndexReader::open(Path::new("index"))?;
//! let searcher = Searcher::new(&reader, Bm25Params::default());
//! let query = Query::parse("dog bird", BoolMode::And, &SimpleTokenizer).with_limit(10);
//! for hit in searcher.search(&query)? {
//!     println!("{} {:?}", hit.doc_id, hit.score);
//! }
//! ```
//!
//! ## Build pipeline
//!
//! 1. **Run building** - batches with pre-assigned docID ranges are tokenized
//!    in parallel, each into one sorted run
//! 2. **Layered merge** - buckets of up to `fanin` runs are merged in
//!    parallel, round after round
//! 3. **Final merge** - a single writer streams the remaining runs into
//!    blocked postings and the lexicon
//!
//! Only `postings.bin`, `lexicon.bin`, `doclen.bin` and `meta.json` outlive
//! a build; they are never modified afterwards, so any number of queries can
//! read them concurrently without locking.

pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod utils;

pub use error::{IndexError, Result};
