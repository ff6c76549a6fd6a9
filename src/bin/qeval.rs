//! `qeval` CLI: evaluate a query file against an index per a parameter file.
//!
//! Exit status is non-zero for run-fatal failures (missing required
//! parameters, unreachable index, unwritable output); per-query failures
//! log one stderr line and emit the placeholder record.

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use qeval::diversify::{diversify, DiversityParams};
#[cfg(feature = "cli")]
use qeval::eval::{process_query, ScoreList};
#[cfg(feature = "cli")]
use qeval::index::Index;
#[cfg(feature = "cli")]
use qeval::ltr::{extract_features, read_qrels, FeatureVectorLine, LtrModels};
#[cfg(feature = "cli")]
use qeval::model::RetrievalModel;
#[cfg(feature = "cli")]
use qeval::params::Params;
#[cfg(feature = "cli")]
use qeval::prf::{expanded_query, expansion_terms, PrfParams};
#[cfg(feature = "cli")]
use qeval::trec;
#[cfg(feature = "cli")]
use qeval::Error;
#[cfg(feature = "cli")]
use std::collections::BTreeMap;
#[cfg(feature = "cli")]
use std::collections::BTreeSet;
#[cfg(feature = "cli")]
use std::fs::File;
#[cfg(feature = "cli")]
use std::io::Write;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
type RankingFile = BTreeMap<String, Vec<(String, f64)>>;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(author, version, about = "Structured-query retrieval evaluator", long_about = None)]
struct Args {
    /// Parameter file (line-oriented `key = value`).
    params: PathBuf,
}

#[cfg(feature = "cli")]
fn query_lines(params: &Params) -> Result<Vec<(String, String)>, Error> {
    let text = std::fs::read_to_string(params.require("queryFilePath")?)?;
    let mut queries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((qid, qtext)) = line.split_once(':') else {
            eprintln!("skipping malformed query line: {line}");
            continue;
        };
        queries.push((qid.trim().to_string(), qtext.trim().to_string()));
    }
    Ok(queries)
}

/// Failures that abort one query rather than the run.
#[cfg(feature = "cli")]
fn query_fatal(error: &Error) -> bool {
    matches!(
        error,
        Error::QueryParse(_)
            | Error::UnsupportedOperator { .. }
            | Error::ScoringInvariantViolated { .. }
            | Error::UnknownField(_)
    )
}

#[cfg(feature = "cli")]
fn emit<W: Write>(
    out: &mut W,
    index: &Index,
    qid: &str,
    outcome: Result<ScoreList, Error>,
) -> Result<(), Error> {
    let written = match outcome {
        Ok(results) => trec::write_ranking(out, qid, &results, index, trec::DEFAULT_RUN_ID),
        Err(error) if query_fatal(&error) => {
            eprintln!("query {qid} failed: {error}");
            trec::write_ranking(out, qid, &ScoreList::new(), index, trec::DEFAULT_RUN_ID)
        }
        Err(error) => return Err(error),
    };
    // A failed record write loses one query, not the run.
    if let Err(error) = written {
        eprintln!("failed to write results for query {qid}: {error}");
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn ranking_from_rows(index: &Index, rows: &[(String, f64)]) -> ScoreList {
    let mut list = ScoreList::new();
    for (external, score) in rows {
        match index.internal_docid(external) {
            Ok(docid) => list.add(docid, *score),
            Err(_) => log::warn!("initial ranking references unknown document {external}"),
        }
    }
    list
}

#[cfg(feature = "cli")]
fn run_plain<W: Write>(
    params: &Params,
    index: &Index,
    out: &mut W,
    output_len: usize,
    model: &RetrievalModel,
) -> Result<(), Error> {
    for (qid, qtext) in query_lines(params)? {
        log::debug!("query {qid}: {qtext}");
        emit(out, index, &qid, process_query(index, &qtext, output_len, model))?;
    }
    Ok(())
}

#[cfg(feature = "cli")]
#[allow(clippy::too_many_arguments)]
fn prf_query(
    index: &Index,
    qid: &str,
    qtext: &str,
    output_len: usize,
    model: &RetrievalModel,
    prf: &PrfParams,
    initial: Option<&RankingFile>,
    expansion_out: Option<&mut File>,
) -> Result<ScoreList, Error> {
    let ranking = match initial.and_then(|m| m.get(qid)) {
        Some(rows) => ranking_from_rows(index, rows),
        None => process_query(index, qtext, prf.num_docs, model)?,
    };
    let terms = expansion_terms(index, &ranking, prf)?;
    let expanded = expanded_query(qtext, &terms, model, prf.orig_weight);
    log::debug!("query {qid} expanded: {expanded}");
    if let Some(file) = expansion_out {
        writeln!(file, "{qid}: {expanded}")?;
    }
    process_query(index, &expanded, output_len, model)
}

#[cfg(feature = "cli")]
fn run_prf<W: Write>(
    params: &Params,
    index: &Index,
    out: &mut W,
    output_len: usize,
    model: &RetrievalModel,
    prf: &PrfParams,
) -> Result<(), Error> {
    let initial = params
        .get("prf:initialRankingFile")
        .map(trec::read_ranking_file)
        .transpose()?;
    let mut expansion_out = params
        .get("prf:expansionQueryFile")
        .map(File::create)
        .transpose()?;
    for (qid, qtext) in query_lines(params)? {
        let outcome = prf_query(
            index,
            &qid,
            &qtext,
            output_len,
            model,
            prf,
            initial.as_ref(),
            expansion_out.as_mut(),
        );
        emit(out, index, &qid, outcome)?;
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn diversity_query(
    index: &Index,
    qid: &str,
    qtext: &str,
    model: &RetrievalModel,
    dp: &DiversityParams,
    initial: Option<&RankingFile>,
    intents_by_query: Option<&BTreeMap<String, Vec<(u32, String)>>>,
) -> Result<(ScoreList, Vec<ScoreList>), Error> {
    match initial {
        Some(map) => {
            let baseline = map
                .get(qid)
                .map(|rows| ranking_from_rows(index, rows))
                .unwrap_or_default();
            let mut numbered: Vec<(u32, ScoreList)> = map
                .iter()
                .filter_map(|(key, rows)| {
                    let (base, intent) = trec::split_intent_id(key)?;
                    (base == qid).then(|| (intent, ranking_from_rows(index, rows)))
                })
                .collect();
            numbered.sort_by_key(|&(intent, _)| intent);
            Ok((baseline, numbered.into_iter().map(|(_, l)| l).collect()))
        }
        None => {
            let take = dp.max_input_rankings_length;
            let baseline = process_query(index, qtext, take, model)?;
            let mut intents = Vec::new();
            if let Some(texts) = intents_by_query.and_then(|m| m.get(qid)) {
                for (_, intent_text) in texts {
                    intents.push(process_query(index, intent_text, take, model)?);
                }
            }
            Ok((baseline, intents))
        }
    }
}

#[cfg(feature = "cli")]
fn run_diversity<W: Write>(
    params: &Params,
    index: &Index,
    out: &mut W,
    output_len: usize,
    model: &RetrievalModel,
    dp: &DiversityParams,
) -> Result<(), Error> {
    let initial = params
        .get("diversity:initialRankingFile")
        .map(trec::read_ranking_file)
        .transpose()?;
    let intents_by_query = match &initial {
        Some(_) => None,
        None => Some(trec::read_intents_file(
            params.require("diversity:intentsFile")?,
        )?),
    };
    for (qid, qtext) in query_lines(params)? {
        let outcome = diversity_query(
            index,
            &qid,
            &qtext,
            model,
            dp,
            initial.as_ref(),
            intents_by_query.as_ref(),
        )
        .map(|(baseline, intents)| {
            let mut diversified = diversify(&baseline, &intents, dp);
            diversified.truncate(output_len);
            diversified
        });
        emit(out, index, &qid, outcome)?;
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn ltr_disabled_features(params: &Params) -> Result<BTreeSet<usize>, Error> {
    let Some(raw) = params.get("ltr:featureDisable") else {
        return Ok(BTreeSet::new());
    };
    raw.split(',')
        .map(|n| {
            n.trim().parse::<usize>().map_err(|_| Error::ParameterMalformed {
                key: "ltr:featureDisable".to_string(),
                value: raw.to_string(),
            })
        })
        .collect()
}

#[cfg(feature = "cli")]
fn write_feature_line(
    file: &mut File,
    index: &Index,
    models: &LtrModels,
    stems: &[String],
    relevance: i32,
    qid: &str,
    docid: u32,
    for_svm: bool,
    disabled: &BTreeSet<usize>,
) -> Result<(), Error> {
    let line = FeatureVectorLine {
        relevance,
        query_id: qid.to_string(),
        external_docid: index.external_docid(docid)?.to_string(),
        features: extract_features(index, stems, docid, models)?,
    };
    writeln!(file, "{}", line.render(for_svm, disabled))?;
    Ok(())
}

#[cfg(feature = "cli")]
fn run_ltr<W: Write>(
    params: &Params,
    index: &Index,
    out: &mut W,
    output_len: usize,
) -> Result<(), Error> {
    let models = LtrModels {
        k1: params.get_or("BM25:k_1", 1.2)?,
        b: params.get_or("BM25:b", 0.75)?,
        k3: params.get_or("BM25:k_3", 0.0)?,
        mu: params.get_or("Indri:mu", 2500.0)?,
        lambda: params.get_or("Indri:lambda", 0.4)?,
    };
    let disabled = ltr_disabled_features(params)?;
    let for_svm = params.get("ltr:svmRankLearnPath").is_some();

    // Training vectors pair qrels judgments with the training queries.
    if let (Some(query_path), Some(qrels_path), Some(vectors_path)) = (
        params.get("ltr:trainingQueryFile"),
        params.get("ltr:trainingQrelsFile"),
        params.get("ltr:trainingFeatureVectorsFile"),
    ) {
        let qrels = read_qrels(qrels_path)?;
        let mut vectors = File::create(vectors_path)?;
        for line in std::fs::read_to_string(query_path)?.lines() {
            let Some((qid, qtext)) = line.trim().split_once(':') else {
                continue;
            };
            let stems: Vec<String> = qtext.split_whitespace().map(str::to_string).collect();
            let Some(judgments) = qrels.get(qid.trim()) else {
                continue;
            };
            for (external, relevance) in judgments {
                match index.internal_docid(external) {
                    Ok(docid) => write_feature_line(
                        &mut vectors,
                        index,
                        &models,
                        &stems,
                        *relevance,
                        qid.trim(),
                        docid,
                        for_svm,
                        &disabled,
                    )?,
                    Err(_) => log::warn!("qrels reference unknown document {external}"),
                }
            }
        }
    }

    // Candidate vectors come from a BM25 first pass over the test queries;
    // that first pass is also the emitted ranking (the external learner's
    // re-scoring is out of scope).
    let bm25 = RetrievalModel::Bm25 {
        k1: models.k1,
        b: models.b,
        k3: models.k3,
    };
    let mut test_vectors = params
        .get("ltr:testingFeatureVectorsFile")
        .map(File::create)
        .transpose()?;
    for (qid, qtext) in query_lines(params)? {
        let outcome = process_query(index, &qtext, output_len, &bm25);
        if let (Ok(ranking), Some(vectors)) = (&outcome, test_vectors.as_mut()) {
            let stems: Vec<String> = qtext.split_whitespace().map(str::to_string).collect();
            for entry in ranking.entries() {
                write_feature_line(
                    vectors, index, &models, &stems, 0, &qid, entry.docid, for_svm, &disabled,
                )?;
            }
        }
        emit(out, index, &qid, outcome)?;
    }
    log::info!("feature vectors written; learner invocation is external");
    Ok(())
}

#[cfg(feature = "cli")]
fn run(args: &Args) -> Result<(), Error> {
    let params = Params::from_file(&args.params)?;
    let index = Index::open(params.require("indexPath")?)?;
    let output_len: usize = params.get_or("trecEvalOutputLength", 100)?;
    let mut out = File::create(params.require("trecEvalOutputPath")?)?;

    if params.algorithm()? == "ltr" {
        return run_ltr(&params, &index, &mut out, output_len);
    }
    let model = params.retrieval_model()?;
    if let Some(dp) = params.diversity_params()? {
        run_diversity(&params, &index, &mut out, output_len, &model, &dp)
    } else if let Some(prf) = params.prf_params()? {
        run_prf(&params, &index, &mut out, output_len, &model, &prf)
    } else {
        run_plain(&params, &index, &mut out, output_len, &model)
    }
}

fn main() {
    #[cfg(feature = "cli")]
    {
        env_logger::init();
        let args = Args::parse();
        if let Err(error) = run(&args) {
            eprintln!("{error}");
            std::process::exit(1);
        }
    }

    #[cfg(not(feature = "cli"))]
    println!("CLI feature is disabled. Build with --features cli to enable.");
}
