pub mod build;
pub mod codec;
pub mod doclen;
pub mod lexicon;
pub mod merge;
pub mod reader;
pub mod run;
pub mod stats;
pub mod types;
pub mod verify;
pub mod writer;

pub use build::build_index;
pub use doclen::DocLengthTable;
pub use lexicon::Lexicon;
pub use reader::{IndexReader, PostingsReader};
pub use types::*;
pub use verify::{VerifyReport, verify_index};
pub use writer::PostingsWriter;
