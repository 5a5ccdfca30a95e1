//! Terminal output for search results, postings dumps and verify reports

use crate::index::types::{LexiconEntry, Posting};
use crate::index::verify::VerifyReport;
use crate::query::SearchHit;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print hits as `rank  docID  score`; Boolean hits print the docID only
pub fn print_hits(hits: &[SearchHit], color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    for (rank, hit) in hits.iter().enumerate() {
        match hit.score {
            Some(score) => {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                write!(out, "{:>4}", rank + 1)?;
                out.reset()?;
                write!(out, "  ")?;
                out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
                write!(out, "{:>10}", hit.doc_id)?;
                out.reset()?;
                writeln!(out, "  {score:.4}")?;
            }
            None => {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
                write!(out, "{}", hit.doc_id)?;
                out.reset()?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

/// Print a term's block directory followed by its postings
pub fn print_postings(
    term: &str,
    entry: &LexiconEntry,
    postings: &[Posting],
    show_blocks: bool,
    color: bool,
) -> io::Result<()> {
    let mut out = stdout(color);
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
    write!(out, "{term}")?;
    out.reset()?;
    writeln!(
        out,
        "  df={} blocks={} offset={}",
        entry.df,
        entry.nblocks(),
        entry.offset
    )?;

    if show_blocks {
        for (i, block) in entry.blocks.iter().enumerate() {
            writeln!(
                out,
                "  block {i:>4}: offset={} last={} docBytes={} freqBytes={} codec={}",
                block.offset, block.last_doc_id, block.doc_bytes, block.freq_bytes, block.codec
            )?;
        }
    }

    for p in postings {
        writeln!(out, "{}\t{}", p.doc_id, p.freq)?;
    }
    Ok(())
}

fn problem(out: &mut StandardStream, line: String) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
    writeln!(out, "{line}")?;
    out.reset()
}

/// Print a verify report; problems are highlighted in red
pub fn print_verify_report(report: &VerifyReport, color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    writeln!(out, "Documents (meta):      {}", report.doc_count)?;
    writeln!(out, "Doc-length entries:    {}", report.table_entries)?;
    writeln!(out, "Docs in postings:      {}", report.docs_in_postings)?;
    writeln!(out, "Terms checked:         {}", report.terms_checked)?;
    writeln!(out, "Postings checked:      {}", report.postings_checked)?;

    if !report.contiguous {
        problem(
            &mut out,
            format!("doc-length keys are not exactly [0, {})", report.doc_count),
        )?;
    }
    if !report.posting_count_matches {
        problem(&mut out, "lexicon df total differs from meta.json".to_string())?;
    }
    if report.missing_length_count > 0 {
        problem(
            &mut out,
            format!(
                "{} docIDs in postings have no length, e.g. {:?}",
                report.missing_length_count, report.missing_lengths
            ),
        )?;
    }
    for m in &report.length_mismatches {
        problem(
            &mut out,
            format!("doc {}: stored length {} but tf sum {}", m.doc_id, m.stored, m.tf_sum),
        )?;
    }
    if report.length_mismatch_count > report.length_mismatches.len() as u64 {
        problem(
            &mut out,
            format!("... {} length mismatches in total", report.length_mismatch_count),
        )?;
    }
    for c in &report.corrupt_terms {
        problem(&mut out, format!("term '{}': {}", c.term, c.error))?;
    }

    if report.is_ok() {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
        writeln!(out, "OK")?;
        out.reset()?;
    }
    Ok(())
}
