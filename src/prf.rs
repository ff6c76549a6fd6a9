//! Pseudo-relevance-feedback query expansion.
//!
//! From the top-k documents of an initial ranking, score candidate
//! expansion terms Indri-style and rebuild the query as a weighted-AND
//! combination of the original query and the expansion terms.
//!
//! The per-term score is
//! `Σᵢ sᵢ · idf(t) · (tfᵢ + μ·pTC(t)) / (Lᵢ + μ)`,
//! including a smoothed zero-tf contribution from documents the term does
//! not occur in. That sum splits into a per-term tf part plus the
//! term-independent background sum `Σᵢ μ·sᵢ/(Lᵢ+μ)` scaled by `pTC(t)`,
//! which is what the accumulator below tracks.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::eval::ScoreList;
use crate::index::Index;
use crate::model::RetrievalModel;
use crate::Error;

/// Expansion configuration.
#[derive(Debug, Clone)]
pub struct PrfParams {
    /// Number of top documents to mine.
    pub num_docs: usize,
    /// Number of expansion terms to keep.
    pub num_terms: usize,
    /// Dirichlet prior for the expansion model.
    pub mu: f64,
    /// Weight of the original query in the expanded query.
    pub orig_weight: f64,
    /// Field the term vectors are drawn from.
    pub expansion_field: String,
}

impl Default for PrfParams {
    fn default() -> Self {
        Self {
            num_docs: 10,
            num_terms: 10,
            mu: 0.0,
            orig_weight: 0.5,
            expansion_field: "body".to_string(),
        }
    }
}

/// One candidate expansion term.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionTerm {
    /// The stem.
    pub term: String,
    /// Its accumulated expansion score.
    pub score: f64,
}

/// Expansion terms, finalized to score descending with ties broken by term
/// ascending.
#[derive(Debug, Clone, Default)]
pub struct ExpansionTermList {
    terms: Vec<ExpansionTerm>,
}

impl ExpansionTermList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a term.
    pub fn add(&mut self, term: String, score: f64) {
        self.terms.push(ExpansionTerm { term, score });
    }

    /// Sort by score descending, ties by term ascending.
    pub fn sort(&mut self) {
        self.terms
            .sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.term.cmp(&b.term)));
    }

    /// Keep the first `n` terms.
    pub fn truncate(&mut self, n: usize) {
        self.terms.truncate(n);
    }

    /// The terms in their current order.
    pub fn terms(&self) -> &[ExpansionTerm] {
        &self.terms
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Score expansion terms from the top documents of `ranking`.
///
/// Terms containing `.` or `,` or non-ASCII bytes are skipped (they do not
/// survive a round-trip through the query syntax).
pub fn expansion_terms(
    index: &Index,
    ranking: &ScoreList,
    params: &PrfParams,
) -> Result<ExpansionTermList, Error> {
    let field = &params.expansion_field;
    let total_len = index.sum_of_field_lengths(field)?;

    struct Acc {
        tf_part: f64,
        ctf: u64,
    }
    let mut acc: HashMap<String, Acc> = HashMap::new();
    // Σᵢ μ·sᵢ/(Lᵢ+μ): the zero-tf contribution every term receives.
    let mut background_sum = 0.0;

    for entry in ranking.entries().iter().take(params.num_docs) {
        let doc_len = index.field_length(field, entry.docid)? as f64;
        let denom = doc_len + params.mu;
        if denom <= 0.0 {
            continue;
        }
        let doc_weight = entry.score / denom;
        background_sum += params.mu * doc_weight;

        let term_vector = index.term_vector(entry.docid, field)?;
        for (stem, tf, ctf) in term_vector.iter() {
            if stem.contains('.') || stem.contains(',') || !stem.is_ascii() {
                continue;
            }
            acc.entry(stem.to_string())
                .or_insert(Acc { tf_part: 0.0, ctf })
                .tf_part += doc_weight * tf as f64;
        }
    }

    let mut list = ExpansionTermList::new();
    let corpus_len = total_len as f64;
    for (term, a) in acc {
        let p_tc = a.ctf as f64 / corpus_len;
        let idf = (corpus_len / a.ctf as f64).ln();
        list.add(term, (a.tf_part + background_sum * p_tc) * idf);
    }
    list.sort();
    list.truncate(params.num_terms);
    Ok(list)
}

/// Combine the original query and the expansion terms:
/// `#wand ( w defaultOp( original ) 1-w #wand ( s₁ t₁ s₂ t₂ … ) )`.
pub fn expanded_query(
    original: &str,
    terms: &ExpansionTermList,
    model: &RetrievalModel,
    orig_weight: f64,
) -> String {
    let mut expansion = String::from("#wand (");
    for t in terms.terms() {
        let _ = write!(expansion, " {:.10} {}", t.score, t.term);
    }
    expansion.push_str(" )");
    format!(
        "#wand ( {} {} ( {} ) {} {} )",
        orig_weight,
        model.default_qry_sop_name(),
        original,
        1.0 - orig_weight,
        expansion
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    // d0: alpha×3 in 5 tokens; d1: beta only. F = 10.
    fn index() -> Index {
        let mut b = Index::builder();
        b.add_document(
            "d0",
            &[("body", &["alpha", "alpha", "alpha", "beta", "x"][..])],
        );
        b.add_document("d1", &[("body", &["beta", "beta", "y", "u.s", "x"][..])]);
        b.build()
    }

    fn ranking() -> ScoreList {
        let mut r = ScoreList::new();
        r.add(0, 0.1);
        r.add(1, 0.05);
        r
    }

    #[test]
    fn accumulator_matches_the_per_document_sum() {
        let ix = index();
        let params = PrfParams {
            num_docs: 2,
            num_terms: 10,
            mu: 10.0,
            ..PrfParams::default()
        };
        let terms = expansion_terms(&ix, &ranking(), &params).unwrap();

        // alpha occurs only in d0: tf part from d0, background from both.
        let f = 10.0;
        let p_tc = 3.0 / f;
        let idf = (f / 3.0_f64).ln();
        let w0 = 0.1 / (5.0 + 10.0);
        let w1 = 0.05 / (5.0 + 10.0);
        let expected = (w0 * 3.0 + p_tc * (10.0 * w0 + 10.0 * w1)) * idf;
        let alpha = terms.terms().iter().find(|t| t.term == "alpha").unwrap();
        assert!((alpha.score - expected).abs() < 1e-12);
    }

    #[test]
    fn terms_with_punctuation_or_non_ascii_are_filtered() {
        let ix = index();
        let terms = expansion_terms(&ix, &ranking(), &PrfParams::default()).unwrap();
        assert!(terms.terms().iter().all(|t| t.term != "u.s"));
    }

    #[test]
    fn list_sorts_by_score_then_term() {
        let mut list = ExpansionTermList::new();
        list.add("b".to_string(), 0.5);
        list.add("a".to_string(), 0.5);
        list.add("c".to_string(), 0.9);
        list.sort();
        let order: Vec<&str> = list.terms().iter().map(|t| t.term.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn expanded_query_nests_the_original_under_the_default_op() {
        let mut terms = ExpansionTermList::new();
        terms.add("alpha".to_string(), 0.25);
        let model = RetrievalModel::Indri {
            mu: 2500.0,
            lambda: 0.4,
        };
        let q = expanded_query("dog cat", &terms, &model, 0.5);
        assert_eq!(
            q,
            "#wand ( 0.5 #and ( dog cat ) 0.5 #wand ( 0.2500000000 alpha ) )"
        );
        // The expanded query round-trips through the parser.
        assert!(crate::parse::parse_query(&q).is_ok());
    }
}
