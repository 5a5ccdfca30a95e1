use crate::index::reader::IndexReader;
use crate::index::types::Codec;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Summary of a published index
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub version: u32,
    pub doc_count: u32,
    pub term_count: usize,
    pub posting_count: u64,
    pub block_count: u64,
    pub block_size: usize,
    pub codec: Codec,
    /// Mean postings per block
    pub avg_block_fill: f64,
    pub avg_doc_len: f64,
    pub postings_bytes: u64,
    pub lexicon_bytes: u64,
    pub doclen_bytes: u64,
    pub initial_runs: usize,
    pub final_runs: usize,
    pub created_at: u64,
}

impl IndexStats {
    pub fn collect(reader: &IndexReader) -> Result<Self> {
        let meta = reader.meta();
        let lexicon = reader.lexicon();
        let paths = reader.paths();
        let file_len = |p: &Path| -> Result<u64> {
            Ok(std::fs::metadata(p)
                .with_context(|| format!("cannot stat {}", p.display()))?
                .len())
        };

        let block_count = lexicon.total_blocks();
        let posting_count = lexicon.total_postings();
        Ok(Self {
            version: meta.version,
            doc_count: meta.doc_count,
            term_count: lexicon.len(),
            posting_count,
            block_count,
            block_size: meta.block_size,
            codec: meta.codec,
            avg_block_fill: if block_count == 0 {
                0.0
            } else {
                posting_count as f64 / block_count as f64
            },
            avg_doc_len: meta.avg_doc_len,
            postings_bytes: reader.postings().file_len(),
            lexicon_bytes: file_len(&paths.lexicon())?,
            doclen_bytes: file_len(&paths.doc_lengths())?,
            initial_runs: meta.initial_runs,
            final_runs: meta.final_runs,
            created_at: meta.created_at,
        })
    }
}

/// Display index statistics
pub fn show_stats(root: &Path, json: bool) -> Result<()> {
    let reader = IndexReader::open(root)
        .with_context(|| format!("cannot open index at {}", root.display()))?;
    let stats = IndexStats::collect(&reader)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Index location:   {}", root.display());
    println!("Format version:   {}", stats.version);
    println!("Documents:        {}", stats.doc_count);
    println!("Terms:            {}", stats.term_count);
    println!("Postings:         {}", stats.posting_count);
    println!("Avg doc length:   {:.2}", stats.avg_doc_len);
    println!();
    println!("Codec:            {}", stats.codec);
    println!("Block size:       {}", stats.block_size);
    println!("Blocks:           {}", stats.block_count);
    println!("Avg block fill:   {:.2}", stats.avg_block_fill);
    println!("Runs merged:      {} -> {}", stats.initial_runs, stats.final_runs);
    println!();
    println!("postings.bin:     {}", format_size(stats.postings_bytes));
    println!("lexicon.bin:      {}", format_size(stats.lexicon_bytes));
    println!("doclen.bin:       {}", format_size(stats.doclen_bytes));
    if stats.posting_count > 0 {
        println!(
            "Bytes/posting:    {:.2}",
            stats.postings_bytes as f64 / stats.posting_count as f64
        );
    }
    println!();
    println!("Created:          {}", format_timestamp(stats.created_at));

    Ok(())
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format unix timestamp
fn format_timestamp(ts: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    let datetime = UNIX_EPOCH + Duration::from_secs(ts);
    format!("{:?}", datetime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
