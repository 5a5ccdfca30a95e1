use crate::error::{IndexError, Result};
use crate::index::types::*;
use crate::utils::{read_u8, read_u32_le, read_u64_le, write_u32_le, write_u64_le};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

const LEXICON_MAGIC: &[u8; 4] = b"LEX1";

/// Persistent exact-match map from term to postings metadata
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Lexicon {
    entries: BTreeMap<String, LexiconEntry>,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a term's entry as it is flushed by the final merge
    pub fn insert(&mut self, term: String, entry: LexiconEntry) {
        self.entries.insert(term, entry);
    }

    /// Look up a term. `None` means the term is not indexed.
    pub fn get(&self, term: &str) -> Option<&LexiconEntry> {
        self.entries.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.entries.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Terms in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LexiconEntry)> {
        self.entries.iter().map(|(t, e)| (t.as_str(), e))
    }

    pub fn total_blocks(&self) -> u64 {
        self.entries.values().map(|e| e.blocks.len() as u64).sum()
    }

    pub fn total_postings(&self) -> u64 {
        self.entries.values().map(|e| e.df).sum()
    }

    /// Serialize the lexicon
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);

        file.write_all(LEXICON_MAGIC)?;
        write_u32_le(&mut file, FORMAT_VERSION)?;
        write_u64_le(&mut file, self.entries.len() as u64)?;

        for (term, entry) in &self.entries {
            let bytes = term.as_bytes();
            write_u32_le(&mut file, bytes.len() as u32)?;
            file.write_all(bytes)?;
            write_u64_le(&mut file, entry.offset)?;
            write_u64_le(&mut file, entry.df)?;
            write_u32_le(&mut file, entry.nblocks())?;

            for block in &entry.blocks {
                write_u64_le(&mut file, block.offset)?;
                write_u32_le(&mut file, block.last_doc_id)?;
                write_u32_le(&mut file, block.doc_bytes)?;
                write_u32_le(&mut file, block.freq_bytes)?;
                file.write_all(&[block.codec.tag()])?;
            }
        }

        file.flush()?;
        file.get_ref().sync_all()?;
        info!(terms = self.entries.len(), path = %path.display(), "lexicon saved");
        Ok(())
    }

    /// Load a lexicon written by [`Lexicon::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let bad = |reason: String| IndexError::BadHeader {
            path: path.to_path_buf(),
            reason,
        };

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).map_err(|e| bad(e.to_string()))?;
        if &magic != LEXICON_MAGIC {
            return Err(bad("not a lexicon file".into()));
        }
        let version = read_u32_le(&mut file).map_err(|e| bad(e.to_string()))?;
        if version != FORMAT_VERSION {
            return Err(bad(format!("unsupported version {version}")));
        }

        let entries = read_entries(&mut file).map_err(|e| bad(e.to_string()))?;
        info!(terms = entries.len(), path = %path.display(), "lexicon loaded");
        Ok(Self { entries })
    }
}

fn read_entries<R: Read>(file: &mut R) -> io::Result<BTreeMap<String, LexiconEntry>> {
    let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);

    let count = read_u64_le(file)?;
    let mut entries = BTreeMap::new();
    let mut prev: Option<String> = None;

    for _ in 0..count {
        let len = read_u32_le(file)? as usize;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)?;
        let term = String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?;
        if prev.as_deref().is_some_and(|p| p >= term.as_str()) {
            return Err(invalid(format!("terms out of order at '{term}'")));
        }

        let offset = read_u64_le(file)?;
        let df = read_u64_le(file)?;
        let nblocks = read_u32_le(file)?;

        let mut blocks = Vec::with_capacity(nblocks.min(1 << 16) as usize);
        for _ in 0..nblocks {
            let block_offset = read_u64_le(file)?;
            let last_doc_id = read_u32_le(file)?;
            let doc_bytes = read_u32_le(file)?;
            let freq_bytes = read_u32_le(file)?;
            let tag = read_u8(file)?;
            let codec = Codec::from_tag(tag)
                .ok_or_else(|| invalid(format!("unknown codec tag {tag} for '{term}'")))?;
            blocks.push(BlockMeta {
                offset: block_offset,
                last_doc_id,
                doc_bytes,
                freq_bytes,
                codec,
            });
        }

        prev = Some(term.clone());
        entries.insert(term, LexiconEntry { offset, df, blocks });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(offset: u64, lasts: &[DocId], codec: Codec) -> LexiconEntry {
        LexiconEntry {
            offset,
            df: lasts.len() as u64 * 2,
            blocks: lasts
                .iter()
                .enumerate()
                .map(|(i, &last_doc_id)| BlockMeta {
                    offset: offset + i as u64 * 16,
                    last_doc_id,
                    doc_bytes: 8,
                    freq_bytes: 8,
                    codec,
                })
                .collect(),
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lexicon.bin");

        let mut lex = Lexicon::new();
        lex.insert("bird".into(), entry(0, &[3, 9], Codec::Raw));
        lex.insert("cat".into(), entry(32, &[2], Codec::Varbyte));
        lex.save(&path).unwrap();

        let loaded = Lexicon::load(&path).unwrap();
        assert_eq!(loaded, lex);
        assert_eq!(loaded.total_blocks(), 3);
        let terms: Vec<&str> = loaded.iter().map(|(t, _)| t).collect();
        assert_eq!(terms, vec!["bird", "cat"]);
    }

    #[test]
    fn test_missing_term_is_none() {
        let mut lex = Lexicon::new();
        lex.insert("dog".into(), entry(0, &[1], Codec::Raw));
        assert!(lex.get("dog").is_some());
        assert!(lex.get("cow").is_none());
        assert!(!lex.contains("cow"));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lexicon.bin");
        std::fs::write(&path, b"NOPE\x01\x00\x00\x00").unwrap();
        assert!(matches!(
            Lexicon::load(&path),
            Err(IndexError::BadHeader { .. })
        ));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lexicon.bin");
        let mut lex = Lexicon::new();
        lex.insert("cat".into(), entry(0, &[1, 2], Codec::Raw));
        lex.save(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(Lexicon::load(&path).is_err());
    }
}
