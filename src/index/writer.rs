use crate::error::{IndexError, Result};
use crate::index::codec::encode_block;
use crate::index::types::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Single-writer builder for the blocked postings file.
///
/// Terms must be appended in ascending order; each call returns the lexicon
/// entry describing where that term's blocks landed.
pub struct PostingsWriter {
    path: PathBuf,
    file: BufWriter<File>,
    block_size: usize,
    codec: Codec,
    /// Next write position, monotonically increasing
    offset: u64,
    terms_written: u64,
    postings_written: u64,
}

impl PostingsWriter {
    /// Create (truncate) a postings file
    pub fn create(path: &Path, block_size: usize, codec: Codec) -> Result<Self> {
        if block_size == 0 {
            return Err(IndexError::InvalidConfig("block_size must be >= 1".into()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(File::create(path)?),
            block_size,
            codec,
            offset: 0,
            terms_written: 0,
            postings_written: 0,
        })
    }

    /// Append one term's postings (ascending, unique docIDs) as a run of blocks
    pub fn add_term(&mut self, term: &str, postings: &[Posting]) -> Result<LexiconEntry> {
        if postings.is_empty() {
            return Err(IndexError::InvalidConfig(format!(
                "term '{term}' has no postings"
            )));
        }
        if let Some(i) = postings.windows(2).position(|w| w[0].doc_id >= w[1].doc_id) {
            return Err(IndexError::InvalidConfig(format!(
                "postings for '{term}' not strictly ascending at position {}",
                i + 1
            )));
        }

        let start_offset = self.offset;
        let mut blocks = Vec::with_capacity(postings.len().div_ceil(self.block_size));
        let mut base: DocId = 0;

        for chunk in postings.chunks(self.block_size) {
            let encoded = encode_block(self.codec, chunk, base);
            let last_doc_id = chunk[chunk.len() - 1].doc_id;

            self.file.write_all(&encoded.docs)?;
            self.file.write_all(&encoded.freqs)?;

            blocks.push(BlockMeta {
                offset: self.offset,
                last_doc_id,
                doc_bytes: encoded.docs.len() as u32,
                freq_bytes: encoded.freqs.len() as u32,
                codec: self.codec,
            });

            self.offset += (encoded.docs.len() + encoded.freqs.len()) as u64;
            base = last_doc_id;
        }

        self.terms_written += 1;
        self.postings_written += postings.len() as u64;

        Ok(LexiconEntry {
            offset: start_offset,
            df: postings.len() as u64,
            blocks,
        })
    }

    /// Bytes written so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn postings_written(&self) -> u64 {
        self.postings_written
    }

    /// Flush and sync the postings file
    pub fn finish(mut self) -> Result<u64> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        debug!(
            path = %self.path.display(),
            bytes = self.offset,
            terms = self.terms_written,
            postings = self.postings_written,
            "postings file written"
        );
        Ok(self.offset)
    }
}
