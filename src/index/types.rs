use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Globally unique, monotonically assigned document identifier
pub type DocId = u32;

/// Current on-disk format version for lexicon, doc-length table and meta.json
pub const FORMAT_VERSION: u32 = 1;

/// A (docID, term frequency) pair in one term's postings list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Posting {
    pub doc_id: DocId,
    pub freq: u32,
}

impl Posting {
    pub fn new(doc_id: DocId, freq: u32) -> Self {
        Self { doc_id, freq }
    }
}

/// Encoding of a block's docID and frequency segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Codec {
    /// Fixed 4-byte little-endian values
    Raw = 0,
    /// Varbyte gaps for docIDs, varbyte values for frequencies
    #[default]
    Varbyte = 1,
}

impl Codec {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Codec::Raw),
            1 => Some(Codec::Varbyte),
            _ => None,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Raw => write!(f, "raw"),
            Codec::Varbyte => write!(f, "varbyte"),
        }
    }
}

impl FromStr for Codec {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Codec::Raw),
            "varbyte" | "vb" => Ok(Codec::Varbyte),
            other => Err(IndexError::InvalidConfig(format!("unknown codec '{other}'"))),
        }
    }
}

/// Directory entry for one block of a term's postings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    /// Absolute offset of the block in the postings file
    pub offset: u64,
    /// Largest docID stored in the block
    pub last_doc_id: DocId,
    /// Encoded length of the docID segment
    pub doc_bytes: u32,
    /// Encoded length of the frequency segment
    pub freq_bytes: u32,
    pub codec: Codec,
}

impl BlockMeta {
    /// Total encoded size of the block
    pub fn encoded_len(&self) -> u64 {
        self.doc_bytes as u64 + self.freq_bytes as u64
    }
}

/// Lexicon metadata for one term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconEntry {
    /// Offset of the first block
    pub offset: u64,
    /// Document frequency (number of postings stored)
    pub df: u64,
    pub blocks: Vec<BlockMeta>,
}

impl LexiconEntry {
    pub fn nblocks(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Gap base for a block: the previous block's last docID, 0 for the first
    pub fn block_base(&self, block: usize) -> DocId {
        if block == 0 {
            0
        } else {
            self.blocks[block - 1].last_doc_id
        }
    }

    pub fn last_doc_id(&self) -> Option<DocId> {
        self.blocks.last().map(|b| b.last_doc_id)
    }
}

/// Build-time configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Documents handed to one run-builder worker
    pub batch_size: usize,
    /// Maximum number of runs merged by one Phase-A job
    pub fanin: usize,
    /// Parallel workers for run building and Phase-A merging
    pub worker_count: usize,
    /// Maximum postings per block
    pub block_size: usize,
    pub codec: Codec,
    /// Upper bound on Phase-A rounds; None merges until runs <= fanin
    pub merge_rounds: Option<usize>,
    /// Keep intermediate runs after the final merge
    pub keep_runs: bool,
    /// Treat a (term, docID) collision between merge inputs as an error
    pub strict_collisions: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: 50_000,
            fanin: 12,
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            block_size: 128,
            codec: Codec::Varbyte,
            merge_rounds: None,
            keep_runs: false,
            strict_collisions: false,
        }
    }
}

impl IndexConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: IndexConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IndexError::InvalidConfig("batch_size must be >= 1".into()));
        }
        if self.fanin < 2 {
            return Err(IndexError::InvalidConfig("fanin must be >= 2".into()));
        }
        if self.worker_count == 0 {
            return Err(IndexError::InvalidConfig("worker_count must be >= 1".into()));
        }
        if self.block_size == 0 {
            return Err(IndexError::InvalidConfig("block_size must be >= 1".into()));
        }
        Ok(())
    }
}

/// Index metadata stored in meta.json. Written last; its presence marks a
/// complete index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub doc_count: u32,
    pub term_count: u64,
    pub posting_count: u64,
    pub total_doc_length: u64,
    pub avg_doc_len: f64,
    pub block_size: usize,
    pub codec: Codec,
    pub initial_runs: usize,
    pub final_runs: usize,
    pub created_at: u64,
}

impl IndexMeta {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let meta: IndexMeta = serde_json::from_reader(file)?;
        if meta.version != FORMAT_VERSION {
            return Err(IndexError::BadHeader {
                path: path.to_path_buf(),
                reason: format!("unsupported version {}", meta.version),
            });
        }
        Ok(meta)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// File layout of an index directory
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn postings(&self) -> PathBuf {
        self.root.join("postings.bin")
    }

    pub fn lexicon(&self) -> PathBuf {
        self.root.join("lexicon.bin")
    }

    pub fn doc_lengths(&self) -> PathBuf {
        self.root.join("doclen.bin")
    }

    pub fn meta(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    /// Transient runs from the run builder
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    /// Transient output of one layered-merge round
    pub fn round_dir(&self, round: usize) -> PathBuf {
        self.runs_dir().join(format!("round_{round:04}"))
    }
}
