//! Tests that drive the `trawl` binary.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;
use trawl::index::{DocLengthTable, IndexPaths};

fn trawl(index: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_trawl"))
        .arg("--index")
        .arg(index)
        .arg("--no-color")
        .arg("--quiet")
        .args(args)
        .output()
        .expect("failed to execute trawl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn write_corpus(dir: &Path) -> String {
    let corpus = dir.join("corpus.tsv");
    std::fs::write(&corpus, "a\tcat dog\nb\tdog bird\nc\tcat bird dog\n").unwrap();
    corpus.to_string_lossy().to_string()
}

#[test]
fn test_build_and_search() {
    let dir = tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let index = dir.path().join("idx");

    let out = trawl(&index, &["build", &corpus]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = trawl(&index, &["search", "--boolean", "-m", "and", "dog", "bird"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "1\n2\n");

    let out = trawl(&index, &["search", "-k", "1", "cat", "bird"]);
    assert!(out.status.success());
    let first = stdout(&out);
    let fields: Vec<&str> = first.split_whitespace().collect();
    assert_eq!(fields[..2], ["1", "2"]);
}

#[test]
fn test_staged_build_matches_one_shot() {
    let dir = tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let staged = dir.path().join("staged");
    let oneshot = dir.path().join("oneshot");

    let flags = ["--batch-size", "1", "--fanin", "2"];
    let run = |index: &Path, cmd: &[&str]| {
        let mut args = cmd.to_vec();
        args.extend_from_slice(&flags);
        let out = trawl(index, &args);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    };
    run(&staged, &["runs", &corpus]);
    run(&staged, &["merge"]);
    run(&staged, &["finalize"]);
    run(&oneshot, &["build", &corpus]);

    for term in ["cat", "dog", "bird"] {
        let a = trawl(&staged, &["postings", term]);
        let b = trawl(&oneshot, &["postings", term]);
        assert!(a.status.success());
        assert_eq!(stdout(&a), stdout(&b), "postings differ for {term}");
    }
    assert!(!staged.join("runs").exists());
}

#[test]
fn test_verify_and_stats_json() {
    let dir = tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let index = dir.path().join("idx");
    assert!(trawl(&index, &["build", &corpus]).status.success());

    let out = trawl(&index, &["verify", "--json"]);
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["postings_checked"], 7);

    let out = trawl(&index, &["stats", "--json"]);
    assert!(out.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(stats["doc_count"], 3);
    assert_eq!(stats["term_count"], 3);
}

#[test]
fn test_missing_index_fails() {
    let dir = tempdir().unwrap();
    let out = trawl(&dir.path().join("nothing"), &["search", "cat"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("cannot open index"));
}

#[test]
fn test_unknown_term_postings_fails() {
    let dir = tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let index = dir.path().join("idx");
    assert!(trawl(&index, &["build", &corpus]).status.success());

    let out = trawl(&index, &["postings", "fish"]);
    assert!(!out.status.success());
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_failed_merge_round_never_publishes() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.tsv");
    std::fs::write(&corpus, "cat dog\ndog bird\ncat bird\nbird fish\n").unwrap();
    let corpus = corpus.to_string_lossy().to_string();
    let index = dir.path().join("idx");
    let paths = IndexPaths::new(&index);

    let out = trawl(&index, &["runs", &corpus, "--batch-size", "1"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let last_run = paths.runs_dir().join("run_000003.run");
    std::fs::write(&last_run, b"RUN1\x05\x00\x00\x00ab").unwrap();

    let out = trawl(&index, &["merge", "--fanin", "2"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Corrupt run"));
    assert!(!paths.round_dir(0).exists());

    // Finalize falls back to the complete run set and hits the same corruption
    let out = trawl(&index, &["finalize"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Corrupt run"));
    assert!(!paths.meta().exists());

    let out = trawl(&index, &["search", "dog"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cannot open index"));
}

#[test]
fn test_runs_over_published_index_unpublishes_it() {
    let dir = tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let index = dir.path().join("idx");
    assert!(trawl(&index, &["build", &corpus]).status.success());
    assert!(trawl(&index, &["search", "dog"]).status.success());

    let smaller = dir.path().join("smaller.tsv");
    std::fs::write(&smaller, "z\tdog\n").unwrap();
    let out = trawl(&index, &["runs", &smaller.to_string_lossy()]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(!IndexPaths::new(&index).meta().exists());

    let out = trawl(&index, &["search", "dog"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cannot open index"));

    // Finishing the staged build publishes the new corpus only
    let out = trawl(&index, &["finalize"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let out = trawl(&index, &["search", "--boolean", "dog"]);
    assert_eq!(stdout(&out), "0\n");
}

#[test]
fn test_finalize_rejects_mismatched_doc_lengths() {
    let dir = tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let index = dir.path().join("idx");
    let paths = IndexPaths::new(&index);

    assert!(trawl(&index, &["runs", &corpus]).status.success());
    DocLengthTable::from_pairs([(0, 2)])
        .unwrap()
        .save(&paths.doc_lengths())
        .unwrap();

    let out = trawl(&index, &["finalize"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Index inconsistency"), "{}", stderr(&out));
    assert!(!paths.meta().exists());

    // Lengths recomputed from the runs make the same runs publishable
    assert!(trawl(&index, &["rebuild-doclens"]).status.success());
    let out = trawl(&index, &["finalize"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let out = trawl(&index, &["verify"]);
    assert!(out.status.success(), "{}", stderr(&out));
}
