//! Block codecs for postings.
//!
//! A block holds at most `block_size` consecutive postings of one term and is
//! stored as a docID segment followed by a frequency segment:
//!
//! - `Raw`: every docID and frequency as a 4-byte little-endian value
//! - `Varbyte`: docIDs as gaps, frequencies as plain values, both varint-coded
//!
//! Varbyte gaps start from the previous block's `last_doc_id` (0 for the first
//! block), which the block directory stores, so a single block decodes without
//! touching its neighbours.

use crate::index::types::{Codec, DocId, Posting};
use crate::utils::{decode_varints, gap_decode, gap_encode, encode_varint, u32_at};
use thiserror::Error;

/// Why a block failed to decode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockDecodeError {
    #[error("raw segment of {0} bytes is not a multiple of 4")]
    MisalignedRaw(usize),

    #[error("malformed varbyte integer")]
    BadVarint,

    #[error("{docs} docIDs but {freqs} frequencies")]
    CountMismatch { docs: usize, freqs: usize },

    #[error("empty block")]
    Empty,

    #[error("docIDs not strictly increasing at position {0}")]
    NotIncreasing(usize),

    #[error("last docID {found} does not match directory ({expected})")]
    LastDocMismatch { expected: DocId, found: DocId },
}

/// Encoded segments of one block
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    pub docs: Vec<u8>,
    pub freqs: Vec<u8>,
}

/// Decoded contents of one block, stored column-wise for in-block searching
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockPostings {
    pub doc_ids: Vec<DocId>,
    pub freqs: Vec<u32>,
}

impl BlockPostings {
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn last_doc_id(&self) -> Option<DocId> {
        self.doc_ids.last().copied()
    }

    /// Index of the first posting with docID >= target, searching from `from`
    pub fn lower_bound(&self, target: DocId, from: usize) -> usize {
        from + self.doc_ids[from..].partition_point(|&d| d < target)
    }

    pub fn postings(&self) -> impl Iterator<Item = Posting> + '_ {
        self.doc_ids
            .iter()
            .zip(&self.freqs)
            .map(|(&doc_id, &freq)| Posting { doc_id, freq })
    }
}

/// Encode one block of postings. `base` is the previous block's last docID.
pub fn encode_block(codec: Codec, postings: &[Posting], base: DocId) -> EncodedBlock {
    let mut block = EncodedBlock {
        docs: Vec::with_capacity(postings.len() * 4),
        freqs: Vec::with_capacity(postings.len() * 4),
    };

    match codec {
        Codec::Raw => {
            for p in postings {
                block.docs.extend_from_slice(&p.doc_id.to_le_bytes());
                block.freqs.extend_from_slice(&p.freq.to_le_bytes());
            }
        }
        Codec::Varbyte => {
            let doc_ids: Vec<DocId> = postings.iter().map(|p| p.doc_id).collect();
            gap_encode(&doc_ids, base, &mut block.docs);
            for p in postings {
                encode_varint(p.freq, &mut block.freqs);
            }
        }
    }

    block
}

/// Decode and validate one block.
///
/// `prev_last` is the previous block's last docID (None for the first block),
/// `expected_last` is the directory's `last_doc_id` for this block.
pub fn decode_block(
    codec: Codec,
    docs: &[u8],
    freqs: &[u8],
    prev_last: Option<DocId>,
    expected_last: DocId,
) -> Result<BlockPostings, BlockDecodeError> {
    let (doc_ids, freq_values) = match codec {
        Codec::Raw => (decode_raw(docs)?, decode_raw(freqs)?),
        Codec::Varbyte => {
            let doc_ids =
                gap_decode(docs, prev_last.unwrap_or(0)).ok_or(BlockDecodeError::BadVarint)?;
            let freq_values = decode_varints(freqs).ok_or(BlockDecodeError::BadVarint)?;
            (doc_ids, freq_values)
        }
    };

    if doc_ids.len() != freq_values.len() {
        return Err(BlockDecodeError::CountMismatch {
            docs: doc_ids.len(),
            freqs: freq_values.len(),
        });
    }
    if doc_ids.is_empty() {
        return Err(BlockDecodeError::Empty);
    }

    let mut prev = prev_last;
    for (i, &doc) in doc_ids.iter().enumerate() {
        if prev.is_some_and(|p| doc <= p) {
            return Err(BlockDecodeError::NotIncreasing(i));
        }
        prev = Some(doc);
    }

    let found = doc_ids[doc_ids.len() - 1];
    if found != expected_last {
        return Err(BlockDecodeError::LastDocMismatch {
            expected: expected_last,
            found,
        });
    }

    Ok(BlockPostings {
        doc_ids,
        freqs: freq_values,
    })
}

fn decode_raw(buf: &[u8]) -> Result<Vec<u32>, BlockDecodeError> {
    if buf.len() % 4 != 0 {
        return Err(BlockDecodeError::MisalignedRaw(buf.len()));
    }
    Ok((0..buf.len()).step_by(4).map(|pos| u32_at(buf, pos)).collect())
}
