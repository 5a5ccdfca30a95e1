use crate::error::{IndexError, Result};
use crate::index::codec::{BlockPostings, decode_block};
use crate::index::doclen::DocLengthTable;
use crate::index::lexicon::Lexicon;
use crate::index::types::*;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read-only view of the blocked postings file.
///
/// Blocks are addressed only through lexicon entries; the file itself has no
/// header. An empty postings file (an index without terms) maps to `None`.
pub struct PostingsReader {
    path: PathBuf,
    mmap: Option<Mmap>,
}

impl PostingsReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // The file is written once by the final merge and never mutated afterwards
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Size of the postings file in bytes
    pub fn file_len(&self) -> u64 {
        self.bytes().len() as u64
    }

    /// Decode block `block` of a term's list
    pub fn read_block(
        &self,
        term: &str,
        entry: &LexiconEntry,
        block: usize,
    ) -> Result<BlockPostings> {
        let meta = entry.blocks.get(block).ok_or_else(|| {
            IndexError::corrupt_block(term, block, format!("only {} blocks", entry.nblocks()))
        })?;

        let data = self.bytes();
        let start = meta.offset;
        let end = start + meta.encoded_len();
        if end > data.len() as u64 {
            return Err(IndexError::corrupt_block(
                term,
                block,
                format!(
                    "bytes {start}..{end} outside postings file of {} bytes",
                    data.len()
                ),
            ));
        }

        let start = start as usize;
        let split = start + meta.doc_bytes as usize;
        let docs = &data[start..split];
        let freqs = &data[split..end as usize];
        let prev_last = (block > 0).then(|| entry.block_base(block));

        decode_block(meta.codec, docs, freqs, prev_last, meta.last_doc_id)
            .map_err(|e| IndexError::corrupt_block(term, block, e.to_string()))
    }

    /// Decode every block of a term in order
    pub fn read_full(&self, term: &str, entry: &LexiconEntry) -> Result<Vec<Posting>> {
        let mut postings = Vec::with_capacity(entry.df as usize);
        for block in 0..entry.blocks.len() {
            postings.extend(self.read_block(term, entry, block)?.postings());
        }
        if postings.len() as u64 != entry.df {
            return Err(IndexError::corrupt_block(
                term,
                entry.blocks.len().saturating_sub(1),
                format!("decoded {} postings, lexicon says df={}", postings.len(), entry.df),
            ));
        }
        Ok(postings)
    }

    /// Decode only the first block whose `last_doc_id >= target`.
    ///
    /// Returns the block index with its contents, or None when every docID of
    /// the term is below `target`.
    pub fn seek_block(
        &self,
        term: &str,
        entry: &LexiconEntry,
        target: DocId,
    ) -> Result<Option<(usize, BlockPostings)>> {
        match find_block(entry, target, 0) {
            Some(block) => Ok(Some((block, self.read_block(term, entry, block)?))),
            None => Ok(None),
        }
    }
}

/// Binary search of the block directory, starting at block `from`
pub fn find_block(entry: &LexiconEntry, target: DocId, from: usize) -> Option<usize> {
    let from = from.min(entry.blocks.len());
    let block = from + entry.blocks[from..].partition_point(|b| b.last_doc_id < target);
    (block < entry.blocks.len()).then_some(block)
}

/// A published index opened for querying: metadata, lexicon, doc lengths and
/// the mapped postings file. Immutable and shareable across threads.
pub struct IndexReader {
    paths: IndexPaths,
    meta: IndexMeta,
    lexicon: Lexicon,
    doc_lengths: DocLengthTable,
    postings: PostingsReader,
}

impl IndexReader {
    /// Open an index directory. meta.json must exist; it is written last, so
    /// a directory without it holds no complete index.
    pub fn open(root: &Path) -> Result<Self> {
        let paths = IndexPaths::new(root);
        let meta = IndexMeta::load(&paths.meta())?;
        let lexicon = Lexicon::load(&paths.lexicon())?;
        let doc_lengths = DocLengthTable::load(&paths.doc_lengths())?;
        let postings = PostingsReader::open(&paths.postings())?;

        debug!(
            root = %root.display(),
            docs = meta.doc_count,
            terms = lexicon.len(),
            "index opened"
        );

        Ok(Self {
            paths,
            meta,
            lexicon,
            doc_lengths,
            postings,
        })
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn doc_lengths(&self) -> &DocLengthTable {
        &self.doc_lengths
    }

    pub fn postings(&self) -> &PostingsReader {
        &self.postings
    }

    /// Number of documents in the collection (N for IDF)
    pub fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }

    /// Full postings of a term; None if the term is not in the lexicon
    pub fn read_term(&self, term: &str) -> Result<Option<Vec<Posting>>> {
        match self.lexicon.get(term) {
            Some(entry) => Ok(Some(self.postings.read_full(term, entry)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::PostingsWriter;
    use tempfile::tempdir;

    fn write_term(
        dir: &Path,
        block_size: usize,
        codec: Codec,
        list: &[Posting],
    ) -> (PostingsReader, LexiconEntry) {
        let path = dir.join("postings.bin");
        let mut writer = PostingsWriter::create(&path, block_size, codec).unwrap();
        let entry = writer.add_term("t", list).unwrap();
        writer.finish().unwrap();
        (PostingsReader::open(&path).unwrap(), entry)
    }

    fn five() -> Vec<Posting> {
        [2, 5, 9, 14, 20]
            .iter()
            .enumerate()
            .map(|(i, &d)| Posting::new(d, i as u32 + 1))
            .collect()
    }

    #[test]
    fn test_read_full_both_codecs() {
        for codec in [Codec::Raw, Codec::Varbyte] {
            let dir = tempdir().unwrap();
            let (reader, entry) = write_term(dir.path(), 2, codec, &five());
            assert_eq!(reader.read_full("t", &entry).unwrap(), five());
        }
    }

    #[test]
    fn test_seek_decodes_single_block() {
        let dir = tempdir().unwrap();
        let (reader, entry) = write_term(dir.path(), 2, Codec::Varbyte, &five());
        assert_eq!(entry.nblocks(), 3);

        // docID 9 is the third posting, so it lives in the second block
        let (block, contents) = reader.seek_block("t", &entry, 9).unwrap().unwrap();
        assert_eq!(block, 1);
        assert_eq!(contents.doc_ids, vec![9, 14]);
        assert!(!contents.doc_ids.contains(&2));

        let (block, contents) = reader.seek_block("t", &entry, 15).unwrap().unwrap();
        assert_eq!(block, 2);
        assert_eq!(contents.doc_ids, vec![20]);

        assert!(reader.seek_block("t", &entry, 21).unwrap().is_none());
    }

    #[test]
    fn test_find_block_from() {
        let dir = tempdir().unwrap();
        let (_, entry) = write_term(dir.path(), 2, Codec::Raw, &five());
        assert_eq!(find_block(&entry, 0, 0), Some(0));
        assert_eq!(find_block(&entry, 3, 1), Some(1));
        assert_eq!(find_block(&entry, 20, 0), Some(2));
        assert_eq!(find_block(&entry, 3, 5), None);
    }

    #[test]
    fn test_corrupt_block_reported() {
        let dir = tempdir().unwrap();
        let (_, entry) = write_term(dir.path(), 2, Codec::Raw, &five());
        let path = dir.path().join("postings.bin");

        // Overwrite the second block's first docID with a value below the first block
        let mut bytes = std::fs::read(&path).unwrap();
        let offset = entry.blocks[1].offset as usize;
        bytes[offset..offset + 4].copy_from_slice(&1u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let reader = PostingsReader::open(&path).unwrap();
        assert!(reader.read_block("t", &entry, 0).is_ok());
        match reader.read_full("t", &entry) {
            Err(IndexError::CorruptBlock { term, block, .. }) => {
                assert_eq!(term, "t");
                assert_eq!(block, 1);
            }
            other => panic!("expected corrupt block, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_file_reported() {
        let dir = tempdir().unwrap();
        let (_, entry) = write_term(dir.path(), 4, Codec::Varbyte, &five());
        let path = dir.path().join("postings.bin");
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();

        let reader = PostingsReader::open(&path).unwrap();
        assert!(matches!(
            reader.read_block("t", &entry, 1),
            Err(IndexError::CorruptBlock { block: 1, .. })
        ));
    }

    #[test]
    fn test_empty_postings_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        PostingsWriter::create(&path, 8, Codec::Raw)
            .unwrap()
            .finish()
            .unwrap();
        let reader = PostingsReader::open(&path).unwrap();
        assert_eq!(reader.file_len(), 0);
    }
}
