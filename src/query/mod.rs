pub mod cursor;
pub mod executor;
pub mod parser;
pub mod scorer;
pub mod topk;

pub use cursor::PostingsCursor;
pub use executor::{SearchHit, Searcher, TermMatch};
pub use parser::{BoolMode, DEFAULT_TOP_K, Query};
pub use scorer::{Bm25, Bm25Params};
pub use topk::{ScoredDoc, TopKHeap};
