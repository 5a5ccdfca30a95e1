//! Sorted intermediate runs.
//!
//! A run file is the magic `RUN1` followed by term groups in ascending term
//! order:
//!
//! ```text
//! [termLength:u32][termBytes][count:u32][docID x count][freq x count]
//! ```
//!
//! All integers are little-endian u32. Runs are transient: they are produced
//! by the run builder and the layered merge and consumed by the next merge.

use crate::error::{IndexError, Result};
use crate::index::types::{DocId, Posting};
use crate::utils::write_u32_le;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const RUN_MAGIC: &[u8; 4] = b"RUN1";

/// File name for the n-th run in a directory
pub fn run_file_name(index: usize) -> String {
    format!("run_{index:06}.run")
}

/// What a finished run contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub path: PathBuf,
    pub terms: u64,
    pub postings: u64,
}

/// Writes one sorted run, one term group at a time
pub struct RunWriter {
    path: PathBuf,
    file: BufWriter<File>,
    last_term: Option<String>,
    terms: u64,
    postings: u64,
}

impl RunWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(RUN_MAGIC)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            last_term: None,
            terms: 0,
            postings: 0,
        })
    }

    /// Append a term group. Terms must arrive in strictly ascending order and
    /// postings must be non-empty with strictly ascending docIDs.
    pub fn write_term(&mut self, term: &str, postings: &[Posting]) -> Result<()> {
        if self.last_term.as_deref().is_some_and(|last| last >= term) {
            return Err(IndexError::InvalidConfig(format!(
                "run terms out of order: '{term}' after '{}'",
                self.last_term.as_deref().unwrap_or_default()
            )));
        }
        debug_assert!(!postings.is_empty());
        debug_assert!(postings.windows(2).all(|w| w[0].doc_id < w[1].doc_id));

        let bytes = term.as_bytes();
        write_u32_le(&mut self.file, bytes.len() as u32)?;
        self.file.write_all(bytes)?;
        write_u32_le(&mut self.file, postings.len() as u32)?;
        for p in postings {
            write_u32_le(&mut self.file, p.doc_id)?;
        }
        for p in postings {
            write_u32_le(&mut self.file, p.freq)?;
        }

        self.last_term = Some(term.to_string());
        self.terms += 1;
        self.postings += postings.len() as u64;
        Ok(())
    }

    pub fn finish(mut self) -> Result<RunSummary> {
        self.file.flush()?;
        Ok(RunSummary {
            path: self.path,
            terms: self.terms,
            postings: self.postings,
        })
    }
}

/// A sorted stream of (term, posting) entries, ordered by (term, docID).
///
/// This is the uniform cursor the k-way merges consume.
pub trait PostingSource {
    /// Current entry, or None once the source is exhausted
    fn current(&self) -> Option<(&Arc<str>, Posting)>;

    /// Move to the next entry
    fn advance(&mut self) -> Result<()>;

    fn is_exhausted(&self) -> bool {
        self.current().is_none()
    }
}

/// Sequential, validating reader over one run file
pub struct RunReader {
    path: PathBuf,
    file: BufReader<File>,
    file_len: u64,
    /// Bytes consumed so far
    offset: u64,
    term: Option<Arc<str>>,
    doc_ids: Vec<DocId>,
    freqs: Vec<u32>,
    pos: usize,
}

impl RunReader {
    /// Open a run and position it on its first entry
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            file_len,
            offset: 0,
            term: None,
            doc_ids: Vec::new(),
            freqs: Vec::new(),
            pos: 0,
        };

        let mut magic = [0u8; 4];
        reader.read_bytes(&mut magic, "magic")?;
        if &magic != RUN_MAGIC {
            return Err(reader.corrupt(0, "bad magic"));
        }
        reader.load_group()?;
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, offset: u64, reason: impl Into<String>) -> IndexError {
        IndexError::CorruptRun {
            path: self.path.clone(),
            offset,
            reason: reason.into(),
        }
    }

    fn read_bytes(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        let at = self.offset;
        self.file.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                self.corrupt(at, format!("truncated {what}"))
            } else {
                IndexError::Io(e)
            }
        })?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf, what)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn ensure_remaining(&self, needed: u64, what: &str) -> Result<()> {
        if self.offset + needed > self.file_len {
            return Err(self.corrupt(
                self.offset,
                format!("{what} needs {needed} bytes, only {} left", self.file_len - self.offset),
            ));
        }
        Ok(())
    }

    /// Read the next term group, or mark the reader exhausted at a clean EOF
    fn load_group(&mut self) -> Result<()> {
        self.pos = 0;
        self.doc_ids.clear();
        self.freqs.clear();

        if self.file.fill_buf()?.is_empty() {
            self.term = None;
            return Ok(());
        }

        let group_start = self.offset;
        let term_len = self.read_u32("term length")? as u64;
        self.ensure_remaining(term_len, "term")?;
        let mut term_bytes = vec![0u8; term_len as usize];
        self.read_bytes(&mut term_bytes, "term")?;
        let term = String::from_utf8(term_bytes)
            .map_err(|_| self.corrupt(group_start, "term is not valid UTF-8"))?;

        if let Some(prev) = &self.term {
            if prev.as_ref() >= term.as_str() {
                return Err(self.corrupt(
                    group_start,
                    format!("term '{term}' does not follow '{prev}'"),
                ));
            }
        }

        let count_at = self.offset;
        let count = self.read_u32("posting count")? as u64;
        if count == 0 {
            return Err(self.corrupt(count_at, format!("empty group for '{term}'")));
        }
        self.ensure_remaining(count * 8, "postings")?;

        let mut raw = vec![0u8; (count * 8) as usize];
        self.read_bytes(&mut raw, "postings")?;
        let (docs, freqs) = raw.split_at(count as usize * 4);

        let mut prev: Option<DocId> = None;
        for (i, chunk) in docs.chunks_exact(4).enumerate() {
            let doc = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if prev.is_some_and(|p| doc <= p) {
                return Err(self.corrupt(
                    count_at + 4 + i as u64 * 4,
                    format!("docIDs not ascending in '{term}'"),
                ));
            }
            prev = Some(doc);
            self.doc_ids.push(doc);
        }
        for (i, chunk) in freqs.chunks_exact(4).enumerate() {
            let freq = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if freq == 0 {
                return Err(self.corrupt(
                    count_at + 4 + (count + i as u64) * 4,
                    format!("zero frequency in '{term}'"),
                ));
            }
            self.freqs.push(freq);
        }

        self.term = Some(Arc::from(term));
        Ok(())
    }

    /// Read the rest of the current group and all remaining groups.
    /// Mostly useful for tools and tests.
    pub fn read_all(mut self) -> Result<Vec<(String, Vec<Posting>)>> {
        let mut groups: Vec<(String, Vec<Posting>)> = Vec::new();
        while let Some((term, posting)) = self.current() {
            match groups.last_mut() {
                Some((t, list)) if t.as_str() == term.as_ref() => list.push(posting),
                _ => groups.push((term.to_string(), vec![posting])),
            }
            self.advance()?;
        }
        Ok(groups)
    }
}

impl PostingSource for RunReader {
    fn current(&self) -> Option<(&Arc<str>, Posting)> {
        let term = self.term.as_ref()?;
        let doc_id = *self.doc_ids.get(self.pos)?;
        Some((term, Posting::new(doc_id, self.freqs[self.pos])))
    }

    fn advance(&mut self) -> Result<()> {
        if self.term.is_none() {
            return Ok(());
        }
        self.pos += 1;
        if self.pos >= self.doc_ids.len() {
            self.load_group()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_sample(path: &Path) -> RunSummary {
        let mut writer = RunWriter::create(path).unwrap();
        writer
            .write_term("bird", &[Posting::new(1, 1), Posting::new(2, 1)])
            .unwrap();
        writer.write_term("cat", &[Posting::new(0, 2)]).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(run_file_name(0));
        let summary = write_sample(&path);
        assert_eq!(summary.terms, 2);
        assert_eq!(summary.postings, 3);

        let groups = RunReader::open(&path).unwrap().read_all().unwrap();
        assert_eq!(
            groups,
            vec![
                ("bird".to_string(), vec![Posting::new(1, 1), Posting::new(2, 1)]),
                ("cat".to_string(), vec![Posting::new(0, 2)]),
            ]
        );
    }

    #[test]
    fn test_layout_matches_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.run");
        let mut writer = RunWriter::create(&path).unwrap();
        writer
            .write_term("ab", &[Posting::new(7, 3), Posting::new(9, 1)])
            .unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let mut expected = b"RUN1".to_vec();
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"ab");
        for v in [2u32, 7, 9, 3, 1] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_empty_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.run");
        RunWriter::create(&path).unwrap().finish().unwrap();
        let reader = RunReader::open(&path).unwrap();
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_writer_rejects_unordered_terms() {
        let dir = tempdir().unwrap();
        let mut writer = RunWriter::create(&dir.path().join("r.run")).unwrap();
        writer.write_term("dog", &[Posting::new(0, 1)]).unwrap();
        assert!(writer.write_term("cat", &[Posting::new(1, 1)]).is_err());
    }

    #[test]
    fn test_truncated_run_reports_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.run");
        write_sample(&path);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        let mut reader = RunReader::open(&path).unwrap();
        let err = loop {
            match reader.advance() {
                Ok(()) if reader.is_exhausted() => panic!("truncation not detected"),
                Ok(()) => continue,
                Err(e) => break e,
            }
        };
        match err {
            IndexError::CorruptRun { path: p, offset, .. } => {
                assert_eq!(p, path);
                // magic + "bird" group + cat's length, term and count
                assert_eq!(offset, 4 + 28 + 11);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.run");
        std::fs::write(&path, b"RUNX").unwrap();
        assert!(matches!(
            RunReader::open(&path),
            Err(IndexError::CorruptRun { offset: 0, .. })
        ));
    }
}
