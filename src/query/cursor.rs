use crate::error::Result;
use crate::index::codec::BlockPostings;
use crate::index::reader::{PostingsReader, find_block};
use crate::index::types::{DocId, LexiconEntry, Posting};

/// DAAT cursor over one term's postings.
///
/// Holds one decoded block at a time. `advance_to` skips whole blocks through
/// the block directory, so blocks that cannot contain the target are never
/// decoded.
pub struct PostingsCursor<'a> {
    term: &'a str,
    entry: &'a LexiconEntry,
    reader: &'a PostingsReader,
    block_idx: usize,
    block: BlockPostings,
    pos: usize,
    exhausted: bool,
    weight: f32,
}

impl<'a> PostingsCursor<'a> {
    /// Position a cursor on the term's first posting
    pub fn open(term: &'a str, entry: &'a LexiconEntry, reader: &'a PostingsReader) -> Result<Self> {
        let mut cursor = Self {
            term,
            entry,
            reader,
            block_idx: 0,
            block: BlockPostings::default(),
            pos: 0,
            exhausted: entry.blocks.is_empty(),
            weight: 1.0,
        };
        if !cursor.exhausted {
            cursor.load_block(0)?;
        }
        Ok(cursor)
    }

    fn load_block(&mut self, block: usize) -> Result<()> {
        self.block = self.reader.read_block(self.term, self.entry, block)?;
        self.block_idx = block;
        self.pos = 0;
        Ok(())
    }

    pub fn term(&self) -> &'a str {
        self.term
    }

    pub fn df(&self) -> u64 {
        self.entry.df
    }

    /// Attach a per-term weight (the term's IDF for ranked queries)
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Current posting, None once the cursor is past the end
    #[inline]
    pub fn current(&self) -> Option<Posting> {
        if self.exhausted {
            return None;
        }
        Some(Posting::new(self.block.doc_ids[self.pos], self.block.freqs[self.pos]))
    }

    #[inline]
    pub fn doc_id(&self) -> Option<DocId> {
        self.current().map(|p| p.doc_id)
    }

    #[inline]
    pub fn freq(&self) -> Option<u32> {
        self.current().map(|p| p.freq)
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Index of the decoded block
    pub fn block_index(&self) -> usize {
        self.block_idx
    }

    /// Move to the next posting
    pub fn advance(&mut self) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }
        self.pos += 1;
        if self.pos >= self.block.len() {
            if self.block_idx + 1 < self.entry.blocks.len() {
                self.load_block(self.block_idx + 1)?;
            } else {
                self.exhausted = true;
            }
        }
        Ok(())
    }

    /// Move to the first posting with docID >= target. Never moves backwards.
    pub fn advance_to(&mut self, target: DocId) -> Result<()> {
        let Some(current) = self.doc_id() else {
            return Ok(());
        };
        if current >= target {
            return Ok(());
        }

        if self.block.last_doc_id().is_some_and(|last| last >= target) {
            self.pos = self.block.lower_bound(target, self.pos);
            return Ok(());
        }

        match find_block(self.entry, target, self.block_idx + 1) {
            Some(block) => {
                self.load_block(block)?;
                self.pos = self.block.lower_bound(target, 0);
            }
            None => self.exhausted = true,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::Codec;
    use crate::index::writer::PostingsWriter;
    use tempfile::tempdir;

    fn setup(docs: &[DocId], block_size: usize) -> (tempfile::TempDir, PostingsReader, LexiconEntry) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        let list: Vec<Posting> = docs.iter().map(|&d| Posting::new(d, d + 1)).collect();
        let mut writer = PostingsWriter::create(&path, block_size, Codec::Varbyte).unwrap();
        let entry = writer.add_term("t", &list).unwrap();
        writer.finish().unwrap();
        let reader = PostingsReader::open(&path).unwrap();
        (dir, reader, entry)
    }

    #[test]
    fn test_advance_walks_all_blocks() {
        let docs = [1, 3, 5, 7, 9];
        let (_dir, reader, entry) = setup(&docs, 2);
        let mut cursor = PostingsCursor::open("t", &entry, &reader).unwrap();

        let mut seen = Vec::new();
        while let Some(p) = cursor.current() {
            assert_eq!(p.freq, p.doc_id + 1);
            seen.push(p.doc_id);
            cursor.advance().unwrap();
        }
        assert_eq!(seen, docs);
        assert!(cursor.is_exhausted());
        cursor.advance().unwrap();
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_advance_to_skips_blocks() {
        let (_dir, reader, entry) = setup(&[1, 3, 5, 7, 9, 11, 13], 2);
        let mut cursor = PostingsCursor::open("t", &entry, &reader).unwrap();

        cursor.advance_to(8).unwrap();
        assert_eq!(cursor.doc_id(), Some(9));
        assert_eq!(cursor.block_index(), 2);

        // Within the current block
        cursor.advance_to(11).unwrap();
        assert_eq!(cursor.doc_id(), Some(11));

        // Never backwards
        cursor.advance_to(2).unwrap();
        assert_eq!(cursor.doc_id(), Some(11));

        cursor.advance_to(13).unwrap();
        assert_eq!(cursor.doc_id(), Some(13));
        cursor.advance_to(14).unwrap();
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.freq(), None);
    }

    #[test]
    fn test_advance_to_last_in_block() {
        let (_dir, reader, entry) = setup(&[2, 4, 6, 8], 2);
        let mut cursor = PostingsCursor::open("t", &entry, &reader).unwrap();
        cursor.advance_to(4).unwrap();
        assert_eq!(cursor.doc_id(), Some(4));
        assert_eq!(cursor.block_index(), 0);
        cursor.advance().unwrap();
        assert_eq!(cursor.doc_id(), Some(6));
        assert_eq!(cursor.block_index(), 1);
    }

    #[test]
    fn test_weight_defaults_to_one() {
        let (_dir, reader, entry) = setup(&[4, 9], 2);
        let cursor = PostingsCursor::open("t", &entry, &reader).unwrap();
        assert_eq!(cursor.weight(), 1.0);
        assert_eq!(cursor.with_weight(0.25).weight(), 0.25);
    }
}
