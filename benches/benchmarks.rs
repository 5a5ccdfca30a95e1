//! Performance benchmarks for trawl
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use trawl::index::codec::{decode_block, encode_block};
use trawl::index::{Codec, IndexConfig, IndexReader, Posting, build_index};
use trawl::query::{Bm25Params, BoolMode, Query, Searcher};
use trawl::utils::SimpleTokenizer;

const VOCAB: [&str; 12] = [
    "river", "stone", "bridge", "lantern", "harbor", "field", "north", "copper", "signal",
    "garden", "winter", "engine",
];

/// Build an index over a synthetic corpus for benchmarking
fn create_benchmark_index() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let corpus = temp_dir.path().join("corpus.tsv");

    let mut text = String::new();
    for i in 0..20_000usize {
        let words: Vec<&str> = (0..8)
            .map(|j| VOCAB[(i * 7 + j * j * 3 + i / 5) % VOCAB.len()])
            .collect();
        text.push_str(&format!("doc{i}\t{}\n", words.join(" ")));
    }
    fs::write(&corpus, text).expect("Failed to write corpus");

    let root = temp_dir.path().join("index");
    let config = IndexConfig {
        batch_size: 2_000,
        fanin: 4,
        ..IndexConfig::default()
    };
    build_index(&corpus, &root, &config, &SimpleTokenizer, true).expect("Failed to build index");

    (temp_dir, root)
}

fn dense_block(len: u32) -> Vec<Posting> {
    (0..len).map(|i| Posting::new(1_000 + i * 3, i % 7 + 1)).collect()
}

fn bench_block_codecs(c: &mut Criterion) {
    let postings = dense_block(128);
    let mut group = c.benchmark_group("block_codec");

    for codec in [Codec::Raw, Codec::Varbyte] {
        group.bench_with_input(BenchmarkId::new("encode", codec), &codec, |b, &codec| {
            b.iter(|| encode_block(codec, black_box(&postings), 997))
        });

        let encoded = encode_block(codec, &postings, 997);
        let last = postings[postings.len() - 1].doc_id;
        group.bench_with_input(BenchmarkId::new("decode", codec), &codec, |b, &codec| {
            b.iter(|| {
                decode_block(
                    codec,
                    black_box(&encoded.docs),
                    black_box(&encoded.freqs),
                    Some(997),
                    last,
                )
            })
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let (_temp_dir, root) = create_benchmark_index();
    let reader = IndexReader::open(&root).expect("Failed to open index");
    let searcher = Searcher::new(&reader, Bm25Params::default());

    let mut group = c.benchmark_group("search");

    group.bench_function("ranked_single", |b| {
        let query = Query::parse("lantern", BoolMode::Or, &SimpleTokenizer);
        b.iter(|| searcher.search(black_box(&query)))
    });

    group.bench_function("ranked_and", |b| {
        let query = Query::parse("river bridge copper", BoolMode::And, &SimpleTokenizer);
        b.iter(|| searcher.search(black_box(&query)))
    });

    group.bench_function("ranked_or", |b| {
        let query = Query::parse("river bridge copper winter", BoolMode::Or, &SimpleTokenizer);
        b.iter(|| searcher.search(black_box(&query)))
    });

    group.bench_function("boolean_and", |b| {
        let query = Query::parse("harbor signal", BoolMode::And, &SimpleTokenizer).boolean();
        b.iter(|| searcher.search(black_box(&query)))
    });

    group.finish();
}

fn bench_index_reading(c: &mut Criterion) {
    let (_temp_dir, root) = create_benchmark_index();

    c.bench_function("index_open", |b| {
        b.iter(|| IndexReader::open(black_box(&root)))
    });
}

criterion_group!(benches, bench_block_codecs, bench_search, bench_index_reading);

criterion_main!(benches);
