//! CLI contract tests for `qeval`.
#![cfg(feature = "cli")]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use qeval::index::Index;
use std::fs;
use std::path::Path;

fn qeval() -> assert_cmd::Command {
    cargo_bin_cmd!("qeval")
}

fn write_index(path: &Path) {
    let mut b = Index::builder();
    b.add_document("GX-AAA", &[("body", &["cheap", "flights", "cheap"][..])]);
    b.add_document("GX-BBB", &[("body", &["cheap", "hotels"][..])]);
    b.add_document("GX-CCC", &[("body", &["expensive", "flights"][..])]);
    b.build().save(path).expect("save index");
}

fn write_params(dir: &Path, extra: &str) -> std::path::PathBuf {
    let params = dir.join("params.txt");
    fs::write(
        &params,
        format!(
            "indexPath = {}\n\
             queryFilePath = {}\n\
             trecEvalOutputPath = {}\n\
             {extra}",
            dir.join("index.qix").display(),
            dir.join("queries.txt").display(),
            dir.join("output.teIn").display(),
        ),
    )
    .expect("write params");
    params
}

#[test]
fn ranked_boolean_run_writes_six_column_records_in_query_order() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path();
    write_index(&dir.join("index.qix"));
    fs::write(
        dir.join("queries.txt"),
        "2:flights\n1:cheap\n",
    )
    .expect("write queries");
    let params = write_params(dir, "retrievalAlgorithm = rankedboolean\n");

    qeval().arg(&params).assert().success();

    let output = fs::read_to_string(dir.join("output.teIn")).expect("read output");
    let lines: Vec<&str> = output.lines().collect();
    // Query 2 first (input order), each line six columns.
    assert!(lines[0].starts_with("2 Q0 "));
    assert!(lines.iter().all(|l| l.split_whitespace().count() == 6));
    // Query 1: GX-AAA holds cheap twice and outranks GX-BBB.
    let q1: Vec<&str> = lines.iter().filter(|l| l.starts_with("1 ")).copied().collect();
    assert!(q1[0].contains("GX-AAA 1 2"));
    assert!(q1[1].contains("GX-BBB 2 1"));
}

#[test]
fn unparsable_query_emits_placeholder_and_continues() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path();
    write_index(&dir.join("index.qix"));
    fs::write(dir.join("queries.txt"), "7:#and ( cheap\n8:hotels\n").expect("write queries");
    let params = write_params(dir, "retrievalAlgorithm = unrankedboolean\n");

    qeval()
        .arg(&params)
        .assert()
        .success()
        .stderr(predicate::str::contains("query 7 failed"));

    let output = fs::read_to_string(dir.join("output.teIn")).expect("read output");
    assert!(output.contains("7 Q0 dummyRecord 1 0 ?"));
    assert!(output.contains("8 Q0 GX-BBB 1 1 ?"));
}

#[test]
fn missing_required_parameter_fails_the_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let params = tmp.path().join("params.txt");
    fs::write(&params, "indexPath = /tmp/nowhere\n").expect("write params");

    qeval()
        .arg(&params)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required parameter"));
}

#[test]
fn unreachable_index_fails_the_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path();
    fs::write(dir.join("queries.txt"), "1:cheap\n").expect("write queries");
    let params = write_params(dir, "retrievalAlgorithm = bm25\n");

    qeval()
        .arg(&params)
        .assert()
        .failure()
        .stderr(predicate::str::contains("index unavailable"));
}

#[test]
fn output_length_truncates_each_query() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path();
    write_index(&dir.join("index.qix"));
    fs::write(dir.join("queries.txt"), "1:cheap flights hotels\n").expect("write queries");
    let params = write_params(
        dir,
        "retrievalAlgorithm = rankedboolean\ntrecEvalOutputLength = 1\n",
    );

    qeval().arg(&params).assert().success();
    let output = fs::read_to_string(dir.join("output.teIn")).expect("read output");
    assert_eq!(output.lines().count(), 1);
}

#[test]
fn prf_run_writes_expansion_queries_and_reranks() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path();
    write_index(&dir.join("index.qix"));
    fs::write(dir.join("queries.txt"), "1:cheap\n").expect("write queries");
    let params = write_params(
        dir,
        &format!(
            "retrievalAlgorithm = indri\nIndri:mu = 1000\nIndri:lambda = 0.4\n\
             prf = true\nprf:numDocs = 2\nprf:numTerms = 3\nprf:Indri:mu = 20\n\
             prf:Indri:origWeight = 0.5\nprf:expansionQueryFile = {}\n",
            dir.join("expansion.txt").display()
        ),
    );

    qeval().arg(&params).assert().success();

    let expansion = fs::read_to_string(dir.join("expansion.txt")).expect("read expansion");
    assert!(expansion.starts_with("1: #wand ( 0.5 #and ( cheap )"));
    let output = fs::read_to_string(dir.join("output.teIn")).expect("read output");
    assert!(!output.is_empty());
}

#[test]
fn diversified_run_reorders_from_an_initial_ranking_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path();
    write_index(&dir.join("index.qix"));
    fs::write(dir.join("queries.txt"), "5:flights\n").expect("write queries");
    // Baseline favors GX-AAA; intent 1 is covered by GX-AAA, intent 2 only
    // by GX-CCC, so xQuAD picks GX-CCC second.
    fs::write(
        dir.join("ranking.teIn"),
        "5 Q0 GX-AAA 1 0.5 run\n5 Q0 GX-BBB 2 0.4 run\n5 Q0 GX-CCC 3 0.3 run\n\
         5.1 Q0 GX-AAA 1 0.9 run\n5.1 Q0 GX-BBB 2 0.1 run\n\
         5.2 Q0 GX-CCC 1 0.8 run\n5.2 Q0 GX-BBB 2 0.2 run\n",
    )
    .expect("write ranking");
    let params = write_params(
        dir,
        &format!(
            "retrievalAlgorithm = indri\ndiversity = true\ndiversity:algorithm = xQuAD\n\
             diversity:lambda = 0.5\ndiversity:maxResultRankingLength = 2\n\
             diversity:initialRankingFile = {}\n",
            dir.join("ranking.teIn").display()
        ),
    );

    qeval().arg(&params).assert().success();

    let output = fs::read_to_string(dir.join("output.teIn")).expect("read output");
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("GX-AAA 1 "));
    assert!(lines[1].contains("GX-CCC 2 "));
}

#[test]
fn ltr_run_emits_feature_vectors_for_training_and_candidates() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path();
    write_index(&dir.join("index.qix"));
    fs::write(dir.join("queries.txt"), "9:cheap flights\n").expect("write queries");
    fs::write(dir.join("train-queries.txt"), "4:cheap hotels\n").expect("write training queries");
    fs::write(dir.join("qrels.txt"), "4 0 GX-BBB 2\n4 0 GX-CCC 0\n").expect("write qrels");
    let params = write_params(
        dir,
        &format!(
            "retrievalAlgorithm = ltr\n\
             ltr:trainingQueryFile = {}\n\
             ltr:trainingQrelsFile = {}\n\
             ltr:trainingFeatureVectorsFile = {}\n\
             ltr:testingFeatureVectorsFile = {}\n",
            dir.join("train-queries.txt").display(),
            dir.join("qrels.txt").display(),
            dir.join("train-vectors.txt").display(),
            dir.join("test-vectors.txt").display(),
        ),
    );

    qeval().arg(&params).assert().success();

    let train = fs::read_to_string(dir.join("train-vectors.txt")).expect("read training vectors");
    assert!(train.lines().count() == 2);
    assert!(train.starts_with("2 qid:4 "));
    assert!(train.contains("# GX-BBB"));

    let test = fs::read_to_string(dir.join("test-vectors.txt")).expect("read test vectors");
    assert!(test.lines().all(|l| l.starts_with("0 qid:9 ")));
    // The emitted ranking is the BM25 first pass.
    let output = fs::read_to_string(dir.join("output.teIn")).expect("read output");
    assert!(output.lines().next().unwrap().starts_with("9 Q0 "));
}
