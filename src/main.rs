use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use trawl::index::build::{build_index, build_runs, publish, unpublish};
use trawl::index::merge::{finalize, latest_runs, list_runs, merge_layered};
use trawl::index::stats::show_stats;
use trawl::index::{Codec, DocLengthTable, IndexConfig, IndexPaths, IndexReader, verify_index};
use trawl::output::{print_hits, print_postings, print_verify_report};
use trawl::query::{Bm25Params, BoolMode, Query, Searcher};
use trawl::utils::SimpleTokenizer;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "trawl")]
#[command(about = "Disk-resident inverted index with Boolean and BM25 search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Index directory
    #[arg(short, long, global = true, default_value = "index")]
    index: PathBuf,

    /// Only log warnings and errors, hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

/// Build settings; flags override the JSON config file
#[derive(Args)]
struct BuildArgs {
    /// JSON file with build settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Documents per run-builder batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum runs merged by one merge job
    #[arg(long)]
    fanin: Option<usize>,

    /// Parallel workers
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Maximum postings per block
    #[arg(long)]
    block_size: Option<usize>,

    /// Block codec: raw or varbyte
    #[arg(long)]
    codec: Option<Codec>,

    /// Stop the layered merge after this many rounds
    #[arg(long)]
    merge_rounds: Option<usize>,

    /// Keep intermediate runs after the final merge
    #[arg(long)]
    keep_runs: bool,

    /// Fail on a duplicate (term, docID) instead of summing frequencies
    #[arg(long)]
    strict_collisions: bool,
}

impl BuildArgs {
    fn resolve(&self) -> Result<IndexConfig> {
        let mut config = match &self.config {
            Some(path) => IndexConfig::from_file(path)
                .with_context(|| format!("cannot load config {}", path.display()))?,
            None => IndexConfig::default(),
        };
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.fanin {
            config.fanin = v;
        }
        if let Some(v) = self.workers {
            config.worker_count = v;
        }
        if let Some(v) = self.block_size {
            config.block_size = v;
        }
        if let Some(v) = self.codec {
            config.codec = v;
        }
        if self.merge_rounds.is_some() {
            config.merge_rounds = self.merge_rounds;
        }
        config.keep_runs |= self.keep_runs;
        config.strict_collisions |= self.strict_collisions;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a complete index from a corpus (one document per line)
    Build {
        /// Corpus file; the document text is the last tab-separated column
        corpus: PathBuf,

        #[command(flatten)]
        build: BuildArgs,
    },
    /// Build sorted runs and the doc-length table only
    Runs {
        corpus: PathBuf,

        #[command(flatten)]
        build: BuildArgs,
    },
    /// Run the layered parallel merge over the latest runs
    Merge {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Final merge: write postings, lexicon and meta.json from the latest runs
    Finalize {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Search the index
    Search {
        /// Query text
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,

        /// How terms combine: and, or
        #[arg(short, long, default_value = "or")]
        mode: BoolMode,

        /// Return matching docIDs in ascending order instead of ranking
        #[arg(long)]
        boolean: bool,

        /// Number of results
        #[arg(short)]
        k: Option<usize>,

        /// BM25 k1
        #[arg(long, default_value_t = 1.2)]
        k1: f32,

        /// BM25 b
        #[arg(long, default_value_t = 0.75)]
        b: f32,
    },
    /// Print a term's postings
    Postings {
        term: String,

        /// Also print the block directory
        #[arg(long)]
        blocks: bool,

        /// Maximum postings to print
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show index statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check postings against the doc-length table
    Verify {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute the doc-length table from the latest runs
    RebuildDoclens,
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);
    let paths = IndexPaths::new(&cli.index);
    let color = !cli.no_color;

    match cli.command {
        Commands::Build { corpus, build } => {
            let config = build.resolve()?;
            let meta = build_index(&corpus, &cli.index, &config, &SimpleTokenizer, cli.quiet)
                .with_context(|| format!("failed to build index from {}", corpus.display()))?;
            if !cli.quiet {
                println!(
                    "Indexed {} documents, {} terms, {} postings into {}",
                    meta.doc_count,
                    meta.term_count,
                    meta.posting_count,
                    cli.index.display()
                );
            }
        }
        Commands::Runs { corpus, build } => {
            let config = build.resolve()?;
            std::fs::create_dir_all(&cli.index)?;
            let built = build_runs(&corpus, &paths, &config, &SimpleTokenizer, cli.quiet)
                .with_context(|| format!("failed to build runs from {}", corpus.display()))?;
            println!(
                "{} runs, {} documents ({} records skipped)",
                built.runs.len(),
                built.doc_lengths.len(),
                built.skipped
            );
        }
        Commands::Merge { build } => {
            let config = build.resolve()?;
            let inputs = existing_runs(&paths)?;
            // Merging starts a rebuild of this directory
            unpublish(&paths)?;
            let before = inputs.len();
            let merged = merge_layered(inputs, &paths, &config, cli.quiet)?;
            println!("Merged {} runs into {}", before, merged.len());
        }
        Commands::Finalize { build } => {
            let config = build.resolve()?;
            finalize_index(&paths, &config, cli.quiet)?;
        }
        Commands::Search {
            query,
            mode,
            boolean,
            k,
            k1,
            b,
        } => {
            let params = Bm25Params { k1, b };
            params.validate()?;
            let reader = open_index(&cli.index)?;
            let searcher = Searcher::new(&reader, params);

            let mut query = Query::parse(&query.join(" "), mode, &SimpleTokenizer);
            if boolean {
                query = query.boolean();
            }
            if let Some(k) = k {
                query = query.with_limit(k);
            }
            if query.is_empty() {
                bail!("query has no indexable terms");
            }

            let hits = searcher.search(&query)?;
            print_hits(&hits, color)?;
        }
        Commands::Postings {
            term,
            blocks,
            limit,
        } => {
            let reader = open_index(&cli.index)?;
            let Some(entry) = reader.lexicon().get(&term) else {
                bail!("term '{}' is not in the index", term);
            };
            let mut postings = reader.postings().read_full(&term, entry)?;
            if let Some(limit) = limit {
                postings.truncate(limit);
            }
            print_postings(&term, entry, &postings, blocks, color)?;
        }
        Commands::Stats { json } => {
            show_stats(&cli.index, json)?;
        }
        Commands::Verify { json } => {
            let report = verify_index(&cli.index)
                .with_context(|| format!("cannot open index at {}", cli.index.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_verify_report(&report, color)?;
            }
            if !report.is_ok() {
                bail!("index at {} is inconsistent", cli.index.display());
            }
        }
        Commands::RebuildDoclens => {
            let runs = existing_runs(&paths)?;
            let table = DocLengthTable::rebuild_from_runs(&runs)?;
            table.save(&paths.doc_lengths())?;
            println!(
                "Rebuilt lengths for {} documents from {} runs",
                table.len(),
                runs.len()
            );
        }
    }

    Ok(())
}

fn open_index(root: &Path) -> Result<IndexReader> {
    IndexReader::open(root).with_context(|| format!("cannot open index at {}", root.display()))
}

fn existing_runs(paths: &IndexPaths) -> Result<Vec<PathBuf>> {
    let runs = latest_runs(paths)?;
    if runs.is_empty() {
        bail!("no runs under {}", paths.runs_dir().display());
    }
    Ok(runs)
}

/// Final merge of the latest runs, then publish meta.json
fn finalize_index(paths: &IndexPaths, config: &IndexConfig, quiet: bool) -> Result<()> {
    let runs = existing_runs(paths)?;
    let initial_runs = list_runs(&paths.runs_dir())?.len();
    let doc_lengths = DocLengthTable::load(&paths.doc_lengths())
        .context("doc-length table missing; run `trawl runs` or `trawl rebuild-doclens`")?;

    let merged = finalize(&runs, paths, config, quiet)?;
    let meta = publish(paths, config, &doc_lengths, &merged, initial_runs, runs.len())?;
    if !config.keep_runs {
        std::fs::remove_dir_all(paths.runs_dir())?;
    }
    println!(
        "Wrote {} terms, {} postings ({} bytes) for {} documents",
        meta.term_count, meta.posting_count, merged.bytes, meta.doc_count
    );
    Ok(())
}
