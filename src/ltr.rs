//! Learning-to-rank feature extraction.
//!
//! For each (query, document) pair: four attribute features (spam score,
//! URL depth, Wikipedia indicator, PageRank) and, per retrieval field
//! (`body`, `title`, `url`, `inlink`), a BM25 score, an Indri score and a
//! query-term overlap ratio. Features a document cannot produce (missing
//! field or attribute) stay absent. Vectors render as svm_rank/RankLib
//! lines; running the external learners is out of scope.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::Path;

use crate::index::Index;
use crate::model::{bm25_rsj, bm25_tf_weight, bm25_user_weight, collection_prior, indri_smoothed_p};
use crate::Error;

/// Highest feature number.
pub const LAST_FEATURE: usize = 16;

/// Retrieval fields scored per document, in feature order.
pub const FEATURE_FIELDS: [&str; 4] = ["body", "title", "url", "inlink"];

/// Model parameters for the per-field score features.
#[derive(Debug, Clone, Copy)]
pub struct LtrModels {
    /// BM25 k1.
    pub k1: f64,
    /// BM25 b.
    pub b: f64,
    /// BM25 k3.
    pub k3: f64,
    /// Indri mu.
    pub mu: f64,
    /// Indri lambda.
    pub lambda: f64,
}

/// One (query, document) feature vector; slots are 1-based.
#[derive(Debug, Clone, Default)]
pub struct FeatureVector {
    values: [Option<f64>; LAST_FEATURE],
}

impl FeatureVector {
    /// Set feature `number` (1-based).
    pub fn set(&mut self, number: usize, value: f64) {
        self.values[number - 1] = Some(value);
    }

    /// Get feature `number` (1-based).
    pub fn get(&self, number: usize) -> Option<f64> {
        self.values[number - 1]
    }
}

/// A rendered line of a feature-vector file.
#[derive(Debug, Clone)]
pub struct FeatureVectorLine {
    /// Relevance judgment (0 for unjudged candidates).
    pub relevance: i32,
    /// Query id.
    pub query_id: String,
    /// External document id (trailing comment field).
    pub external_docid: String,
    /// The features.
    pub features: FeatureVector,
}

impl FeatureVectorLine {
    /// Render as `rel qid:QID n:value … # externalDocid`.
    ///
    /// svm_rank omits absent features; RankLib expects every slot, with
    /// absent features written as 0.
    pub fn render(&self, for_svm: bool, disabled: &BTreeSet<usize>) -> String {
        let mut line = format!("{} qid:{} ", self.relevance, self.query_id);
        for number in 1..=LAST_FEATURE {
            if disabled.contains(&number) {
                continue;
            }
            match self.features.get(number) {
                Some(value) => {
                    let _ = write!(line, "{number}:{value} ");
                }
                None if !for_svm => {
                    let _ = write!(line, "{number}:0 ");
                }
                None => {}
            }
        }
        let _ = write!(line, "# {}", self.external_docid);
        line
    }
}

/// Extract the feature vector for `(query_stems, docid)`.
pub fn extract_features(
    index: &Index,
    query_stems: &[String],
    docid: u32,
    models: &LtrModels,
) -> Result<FeatureVector, Error> {
    let mut fv = FeatureVector::default();

    if let Some(spam) = index.attribute("spamScore", docid) {
        if let Ok(value) = spam.parse::<f64>() {
            fv.set(1, value);
        }
    }
    if let Some(url) = index.attribute("rawUrl", docid) {
        fv.set(2, url.matches('/').count() as f64);
        fv.set(3, if url.contains("wikipedia.org") { 1.0 } else { 0.0 });
    }
    if let Some(rank) = index.attribute("PageRank", docid) {
        if let Ok(value) = rank.parse::<f64>() {
            fv.set(4, value);
        }
    }

    for (slot, field) in FEATURE_FIELDS.iter().enumerate() {
        let base = 5 + slot * 3;
        // A document without the field produces no scores for it.
        if !index_has_field_doc(index, field, docid)? {
            continue;
        }
        let (bm25, indri, overlap) = field_scores(index, query_stems, docid, field, models)?;
        fv.set(base, bm25);
        fv.set(base + 1, indri);
        fv.set(base + 2, overlap);
    }
    Ok(fv)
}

fn index_has_field_doc(index: &Index, field: &str, docid: u32) -> Result<bool, Error> {
    match index.field_length(field, docid) {
        Ok(len) => Ok(len > 0),
        Err(Error::UnknownField(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

fn field_scores(
    index: &Index,
    query_stems: &[String],
    docid: u32,
    field: &str,
    models: &LtrModels,
) -> Result<(f64, f64, f64), Error> {
    let num_docs = index.num_docs() as f64;
    let doc_count = index.doc_count(field)? as f64;
    let total_len = index.sum_of_field_lengths(field)?;
    let avg_len = if doc_count > 0.0 {
        total_len as f64 / doc_count
    } else {
        0.0
    };
    let doc_len = index.field_length(field, docid)? as f64;

    let mut bm25 = 0.0;
    let mut indri = 1.0;
    let mut matched = 0usize;
    let exponent = 1.0 / query_stems.len().max(1) as f64;

    for stem in query_stems {
        let list = index.postings(field, stem)?;
        let tf = list.posting_for(docid).map_or(0, |p| p.tf()) as f64;
        if tf > 0.0 {
            matched += 1;
            bm25 += bm25_rsj(num_docs, list.df() as f64)
                * bm25_tf_weight(tf, doc_len, avg_len, models.k1, models.b)
                * bm25_user_weight(models.k3, 1.0);
        }
        let p_mle = collection_prior(list.ctf(), total_len);
        indri *= indri_smoothed_p(tf, doc_len, models.mu, models.lambda, p_mle).powf(exponent);
    }

    // The Indri feature is zero when the document matches no query stem.
    if matched == 0 {
        indri = 0.0;
    }
    let overlap = matched as f64 / query_stems.len().max(1) as f64;
    Ok((bm25, indri, overlap))
}

/// Read relevance judgments: `queryId 0 externalDocid relevance` per line.
/// Returns query id -> `(externalDocid, relevance)` in file order.
pub fn read_qrels(
    path: impl AsRef<Path>,
) -> Result<HashMap<String, Vec<(String, i32)>>, Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let mut by_query: HashMap<String, Vec<(String, i32)>> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let malformed = || Error::ParameterMalformed {
            key: path.display().to_string(),
            value: line.to_string(),
        };
        if fields.len() < 4 {
            return Err(malformed());
        }
        let relevance: i32 = fields[3].parse().map_err(|_| malformed())?;
        by_query
            .entry(fields[0].to_string())
            .or_default()
            .push((fields[2].to_string(), relevance));
    }
    Ok(by_query)
}
