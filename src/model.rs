//! Retrieval models and their scoring kernels.
//!
//! The model is a value object carried by reference through the operator
//! tree; every scoring operator branches exhaustively over it. The kernels
//! are index-free math so operators and the feature extractor share one
//! implementation.

/// Retrieval model selection, with model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetrievalModel {
    /// Every matching document scores 1.0.
    UnrankedBoolean,
    /// Boolean matching, scored by raw term frequencies.
    RankedBoolean,
    /// Okapi BM25.
    Bm25 {
        /// Term-frequency saturation.
        k1: f64,
        /// Length normalization.
        b: f64,
        /// Query-term-frequency saturation (user weight).
        k3: f64,
    },
    /// Indri two-level language model (Dirichlet + Jelinek-Mercer mix).
    Indri {
        /// Dirichlet prior strength.
        mu: f64,
        /// Collection interpolation weight.
        lambda: f64,
    },
}

impl RetrievalModel {
    /// The implicit operator wrapped around a bare query string.
    pub fn default_qry_sop_name(&self) -> &'static str {
        match self {
            RetrievalModel::Indri { .. } => "#and",
            RetrievalModel::Bm25 { .. } => "#sum",
            RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => "#or",
        }
    }

    /// Model name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            RetrievalModel::UnrankedBoolean => "UnrankedBoolean",
            RetrievalModel::RankedBoolean => "RankedBoolean",
            RetrievalModel::Bm25 { .. } => "BM25",
            RetrievalModel::Indri { .. } => "Indri",
        }
    }
}

/// Robertson-Sparck Jones idf weight, clamped at zero:
/// `max(0, ln((N - df + 0.5) / (df + 0.5)))`.
pub fn bm25_rsj(num_docs: f64, df: f64) -> f64 {
    ((num_docs - df + 0.5) / (df + 0.5)).ln().max(0.0)
}

/// BM25 term-frequency weight: `tf / (tf + k1·((1-b) + b·L/avgL))`.
pub fn bm25_tf_weight(tf: f64, doc_len: f64, avg_doc_len: f64, k1: f64, b: f64) -> f64 {
    if tf <= 0.0 {
        return 0.0;
    }
    let avg = avg_doc_len.max(1e-9);
    tf / (tf + k1 * ((1.0 - b) + b * doc_len / avg))
}

/// BM25 user weight: `(k3 + 1)·qtf / (k3 + qtf)`.
pub fn bm25_user_weight(k3: f64, qtf: f64) -> f64 {
    (k3 + 1.0) * qtf / (k3 + qtf)
}

/// Collection probability `ctf / F`, with the zero-ctf convention `0.5 / F`.
pub fn collection_prior(ctf: u64, total_field_len: u64) -> f64 {
    if total_field_len == 0 {
        return 0.0;
    }
    let numer = if ctf == 0 { 0.5 } else { ctf as f64 };
    numer / total_field_len as f64
}

/// Two-level smoothed probability:
/// `(1-λ)·(tf + μ·pMLE)/(L + μ) + λ·pMLE`.
pub fn indri_smoothed_p(tf: f64, doc_len: f64, mu: f64, lambda: f64, p_mle: f64) -> f64 {
    (1.0 - lambda) * (tf + mu * p_mle) / (doc_len + mu) + lambda * p_mle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_operator_tracks_model() {
        assert_eq!(
            RetrievalModel::Indri { mu: 2500.0, lambda: 0.4 }.default_qry_sop_name(),
            "#and"
        );
        assert_eq!(
            RetrievalModel::Bm25 { k1: 1.2, b: 0.75, k3: 0.0 }.default_qry_sop_name(),
            "#sum"
        );
        assert_eq!(RetrievalModel::RankedBoolean.default_qry_sop_name(), "#or");
    }

    #[test]
    fn rsj_clamps_frequent_terms_at_zero() {
        // df > N/2 drives the log negative; the clamp holds it at 0.
        assert_eq!(bm25_rsj(10.0, 9.0), 0.0);
        assert!(bm25_rsj(10.0, 1.0) > 0.0);
    }

    #[test]
    fn user_weight_is_one_for_unit_qtf_k3_zero() {
        assert_eq!(bm25_user_weight(0.0, 1.0), 1.0);
    }

    #[test]
    fn zero_ctf_prior_uses_half_count() {
        assert_eq!(collection_prior(0, 1_000_000), 0.5 / 1_000_000.0);
        assert_eq!(collection_prior(10, 1_000_000), 10.0 / 1_000_000.0);
    }

    #[test]
    fn smoothed_p_is_positive_at_zero_tf() {
        let p_mle = collection_prior(4, 1_000_000);
        let p = indri_smoothed_p(0.0, 100.0, 2500.0, 0.4, p_mle);
        assert!(p > 0.0);
    }
}
